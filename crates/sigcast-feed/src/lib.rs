//! Simulated signal feed for sigcast.
//!
//! - `Ticker`: one signal's sample loop with a single-slot dirty flag
//! - `TickerHub`: ticker registry, catalogue requests and the periodic
//!   update-list broadcast
//! - `SampleSink`: collaborator receiving every produced sample (archive,
//!   per-sample push)

pub mod config;
pub mod error;
pub mod generator;
pub mod sink;
pub mod ticker;
pub mod ticker_hub;

pub use config::FeedConfig;
pub use error::{FeedError, FeedResult};
pub use generator::{sample_for, ValueGenerator};
pub use sink::{FanoutSink, NullSink, PushSink, SampleRecord, SampleSink};
pub use ticker::{spawn_tickers, Ticker};
pub use ticker_hub::{spawn_ticker_hub, TickerHubHandle, TickerHubMsg, TickerHubTask};
