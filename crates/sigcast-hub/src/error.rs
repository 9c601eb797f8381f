//! Hub error types.

use sigcast_core::{CommandType, CoreError};
use thiserror::Error;

use crate::connections::ConnId;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnId),

    #[error("Send queue of connection {0} is full")]
    QueueFull(ConnId),

    #[error("{0} is closed")]
    HubClosed(&'static str),

    #[error("{0} inbox is full")]
    InboxFull(&'static str),

    #[error("Response slot for command {0} dropped without a reply")]
    ResponseDropped(CommandType),

    #[error("Request {command} timed out after {timeout_ms}ms")]
    RequestTimeout { command: CommandType, timeout_ms: u64 },

    #[error("Peer error: {0}")]
    Peer(String),

    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Invalid hub configuration: {0}")]
    InvalidConfig(String),

    #[error("Codec error: {0}")]
    Core(#[from] CoreError),
}

pub type HubResult<T> = Result<T, HubError>;
