//! Error types shared across Lyricap crates.

use std::path::PathBuf;

/// Top-level error type for Lyricap operations.
#[derive(Debug, thiserror::Error)]
pub enum LyricapError {
    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Preload error: {message}")]
    Preload { message: String },

    #[error("Mixer error: {message}")]
    Mixer { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Project error: {message}")]
    Project { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The export cannot start; nothing was allocated.
    #[error("Export precondition failed: {message}")]
    Precondition { message: String },

    #[error("Another export session is already active")]
    SessionActive,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using LyricapError.
pub type LyricapResult<T> = Result<T, LyricapError>;

impl LyricapError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn preload(msg: impl Into<String>) -> Self {
        Self::Preload {
            message: msg.into(),
        }
    }

    pub fn mixer(msg: impl Into<String>) -> Self {
        Self::Mixer {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn project(msg: impl Into<String>) -> Self {
        Self::Project {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error was raised before any session resource existed.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. } | Self::SessionActive)
    }
}
