//! Prometheus metrics and structured logging for sigcast.
//!
//! - Prometheus metrics for connection churn, fan-out and request dispatch
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
