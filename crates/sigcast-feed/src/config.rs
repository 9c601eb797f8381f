//! Feed configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FeedError, FeedResult};

/// Ticker population and aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Number of simulated signals.
    #[serde(default = "default_ticker_count")]
    pub ticker_count: usize,
    /// Shortest sample period drawn for a ticker.
    #[serde(default = "default_period_min_ms")]
    pub period_min_ms: u64,
    /// Longest sample period drawn for a ticker.
    #[serde(default = "default_period_max_ms")]
    pub period_max_ms: u64,
    /// Cadence of the update-list broadcast.
    #[serde(default = "default_aggregation_period_ms")]
    pub aggregation_period_ms: u64,
    /// Push every sample to all clients as it is produced.
    #[serde(default)]
    pub per_sample_push: bool,
    /// Period of each ticker's statistics log.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_ticker_count() -> usize {
    1000
}

fn default_period_min_ms() -> u64 {
    100
}

fn default_period_max_ms() -> u64 {
    2_000
}

fn default_aggregation_period_ms() -> u64 {
    250
}

fn default_stats_interval_secs() -> u64 {
    30
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ticker_count: default_ticker_count(),
            period_min_ms: default_period_min_ms(),
            period_max_ms: default_period_max_ms(),
            aggregation_period_ms: default_aggregation_period_ms(),
            per_sample_push: false,
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl FeedConfig {
    pub fn validate(&self) -> FeedResult<()> {
        if self.period_min_ms == 0 {
            return Err(FeedError::InvalidConfig(
                "period_min_ms must be positive".to_string(),
            ));
        }
        if self.period_min_ms > self.period_max_ms {
            return Err(FeedError::InvalidConfig(format!(
                "period_min_ms ({}) exceeds period_max_ms ({})",
                self.period_min_ms, self.period_max_ms
            )));
        }
        if self.aggregation_period_ms == 0 {
            return Err(FeedError::InvalidConfig(
                "aggregation_period_ms must be positive".to_string(),
            ));
        }
        if self.stats_interval_secs == 0 {
            return Err(FeedError::InvalidConfig(
                "stats_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn aggregation_period(&self) -> Duration {
        Duration::from_millis(self.aggregation_period_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}
