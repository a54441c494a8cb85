//! Unified error type for clipforged.
//!
//! Every crate in the workspace funnels its failures into [`Error`]. Only
//! [`Error::EngineInit`] is fatal to a session; everything else is recorded
//! against the job that produced it.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Unified error type covering all failure modes in clipforged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The encoding engine could not be loaded. Blocks all job processing.
    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    /// A zero, negative or non-finite duration was supplied.
    #[error("Invalid duration: {0} seconds")]
    InvalidDuration(f64),

    /// Duration probing did not finish within the configured timeout.
    #[error("Probe timed out after {timeout:?}: {}", path.display())]
    ProbeTimeout {
        /// The file that was being probed.
        path: PathBuf,
        /// The timeout that expired.
        timeout: Duration,
    },

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// The encoder rejected or failed to process the input.
    #[error("Encode error: {0}")]
    Encode(String),

    /// An external tool (ffmpeg, ffprobe) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Input or configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The operation is not allowed in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Whether this error ends the whole session rather than a single job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::EngineInit(_))
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
