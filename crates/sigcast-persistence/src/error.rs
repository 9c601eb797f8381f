//! Persistence error types.

use sigcast_feed::FeedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session pool exhausted ({0} sessions in use)")]
    PoolExhausted(usize),

    #[error("Session pool is closed")]
    PoolClosed,

    #[error("Invalid persistence configuration: {0}")]
    InvalidConfig(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

impl From<PersistenceError> for FeedError {
    fn from(e: PersistenceError) -> Self {
        FeedError::Sink(e.to_string())
    }
}
