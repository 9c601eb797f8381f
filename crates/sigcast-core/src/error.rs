//! Error types for sigcast-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown status code: {0}")]
    UnknownStatus(i32),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
