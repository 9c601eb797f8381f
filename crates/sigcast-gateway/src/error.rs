//! Gateway error types.

use sigcast_hub::HubError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid listen address {0}")]
    InvalidAddress(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("Hub error: {0}")]
    Hub(#[from] HubError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
