//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod peer;
pub mod ws_client;

use std::time::Duration;

use sigcast_feed::FeedConfig;
use sigcast_hub::HubConfig;
use sigcast_server::Services;

/// Feed settings for tests; tickers are added by hand.
pub fn feed_config(aggregation_ms: u64) -> FeedConfig {
    FeedConfig {
        ticker_count: 0,
        aggregation_period_ms: aggregation_ms,
        ..Default::default()
    }
}

/// Start the three hubs with default hub settings.
pub async fn start_services(aggregation_ms: u64) -> Services {
    Services::start(&HubConfig::default(), &feed_config(aggregation_ms))
        .await
        .unwrap()
}

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);
