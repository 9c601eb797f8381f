//! Feed error types.

use sigcast_core::CoreError;
use sigcast_hub::HubError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid feed configuration: {0}")]
    InvalidConfig(String),

    #[error("Sample sink error: {0}")]
    Sink(String),

    #[error("Hub error: {0}")]
    Hub(#[from] HubError),

    #[error("Codec error: {0}")]
    Core(#[from] CoreError),
}

pub type FeedResult<T> = Result<T, FeedError>;
