//! Sample archive for sigcast.
//!
//! Records every produced sample to daily JSON Lines files and the signal
//! catalogue to a one-shot JSON file at startup.

pub mod archive;
pub mod config;
pub mod error;
pub mod pool;

pub use archive::{write_catalogue, DailyWriter, JsonLinesSampleSink, WriterSession};
pub use config::PersistenceConfig;
pub use error::{PersistenceError, PersistenceResult};
pub use pool::{PooledSession, SessionPool};
