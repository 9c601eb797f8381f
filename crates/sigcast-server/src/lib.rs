//! sigcast: real-time signal telemetry fan-out server.
//!
//! Orchestrates the routing core, the simulated signal feed, the sample
//! archive and the WebSocket gateway.

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, Services};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
