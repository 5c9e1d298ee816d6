//! Lyricap Common Utilities
//!
//! Shared infrastructure for all Lyricap crates:
//! - Error types and result aliases
//! - Clock, frame throttling, and drift utilities for layer synchronization
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
