//! WebSocket gateway for sigcast.
//!
//! Upgrades `GET /ws` to a WebSocket, wraps it into a hub `Connection` and
//! runs its pumps. Also serves the client page at `/` and Prometheus metrics
//! at `/metrics`.

pub mod config;
pub mod error;
pub mod limiter;
pub mod server;
pub mod socket;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use limiter::{ConnectionGuard, ConnectionLimiter};
pub use server::{bind, create_router, serve, GatewayState};
pub use socket::split_socket;
