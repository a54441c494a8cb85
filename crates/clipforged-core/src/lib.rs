//! clipforged-core: shared types, errors, configuration, size planning and
//! the event bus.
//!
//! This crate is the foundational dependency for the rest of the workspace.
//! [`plan`] holds the pure bitrate and resolution policy that everything
//! else is built around.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod plan;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use plan::{
    choose_resolution, plan_encode, target_bitrate_kbps, EncodeParams, ResolutionThresholds,
    ResolutionTier,
};
