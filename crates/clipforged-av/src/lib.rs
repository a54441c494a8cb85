//! # clipforged-av
//!
//! ffmpeg and ffprobe integration for the clipforged compression engine.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support and line-streamed stderr.
//! - **Workspace management** ([`Workspace`]) -- per-job scratch directories.
//! - **Probing** ([`FfprobeProber`]) -- container duration via ffprobe.
//! - **Encoding** ([`encode_to_target`]) -- target-size H.264/AAC encode with
//!   progress reporting.

pub mod command;
pub mod encode;
pub mod probe;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use encode::{build_args, encode_to_target, EncodeProgress, ProgressParser};
pub use probe::FfprobeProber;
pub use tools::{ToolInfo, ToolRegistry};
pub use workspace::Workspace;
