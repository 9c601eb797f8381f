//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hub error: {0}")]
    Hub(#[from] sigcast_hub::HubError),

    #[error("Feed error: {0}")]
    Feed(#[from] sigcast_feed::FeedError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] sigcast_gateway::GatewayError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sigcast_persistence::PersistenceError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sigcast_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
