//! Clipforged - target-size video compression
//!
//! This library crate exposes the engine, queue and output layers for the
//! binary and for integration testing.

pub mod config;
pub mod engine;
pub mod output;
pub mod probe;
pub mod queue;
