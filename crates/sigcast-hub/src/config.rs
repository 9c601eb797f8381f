//! Hub configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};

/// Connection and dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Capacity of each connection's outbound queue.
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
    /// Largest accepted inbound frame.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Idle limit between heartbeat pongs.
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,
    /// Heartbeat ping period. Must be shorter than `pong_wait_secs`.
    #[serde(default = "default_ping_period_secs")]
    pub ping_period_secs: u64,
    /// Deadline for a single outbound write.
    #[serde(default = "default_write_wait_secs")]
    pub write_wait_secs: u64,
    /// Deadline for a handler to answer a request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Capacity of each hub's inbox.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
    /// Period of the connections hub statistics log.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_send_queue_capacity() -> usize {
    256
}

fn default_max_frame_bytes() -> usize {
    512
}

fn default_pong_wait_secs() -> u64 {
    60
}

fn default_ping_period_secs() -> u64 {
    54 // 0.9 * pong wait
}

fn default_write_wait_secs() -> u64 {
    10
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_inbox_capacity() -> usize {
    1024
}

fn default_stats_interval_secs() -> u64 {
    60
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: default_send_queue_capacity(),
            max_frame_bytes: default_max_frame_bytes(),
            pong_wait_secs: default_pong_wait_secs(),
            ping_period_secs: default_ping_period_secs(),
            write_wait_secs: default_write_wait_secs(),
            request_timeout_ms: default_request_timeout_ms(),
            inbox_capacity: default_inbox_capacity(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl HubConfig {
    /// Reject settings the pumps cannot run with.
    pub fn validate(&self) -> HubResult<()> {
        if self.send_queue_capacity == 0 {
            return Err(HubError::InvalidConfig(
                "send_queue_capacity must be positive".to_string(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(HubError::InvalidConfig(
                "max_frame_bytes must be positive".to_string(),
            ));
        }
        if self.inbox_capacity == 0 {
            return Err(HubError::InvalidConfig(
                "inbox_capacity must be positive".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(HubError::InvalidConfig(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.stats_interval_secs == 0 {
            return Err(HubError::InvalidConfig(
                "stats_interval_secs must be positive".to_string(),
            ));
        }
        if self.ping_period_secs == 0 || self.ping_period_secs >= self.pong_wait_secs {
            return Err(HubError::InvalidConfig(format!(
                "ping_period_secs ({}) must be positive and below pong_wait_secs ({})",
                self.ping_period_secs, self.pong_wait_secs
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    /// Timings handed to each connection's pumps.
    pub fn pump_settings(&self) -> PumpSettings {
        PumpSettings {
            max_frame_bytes: self.max_frame_bytes,
            pong_wait: Duration::from_secs(self.pong_wait_secs),
            ping_period: Duration::from_secs(self.ping_period_secs),
            write_wait: Duration::from_secs(self.write_wait_secs),
        }
    }
}

/// Per-connection pump timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpSettings {
    pub max_frame_bytes: usize,
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub write_wait: Duration,
}

impl Default for PumpSettings {
    fn default() -> Self {
        HubConfig::default().pump_settings()
    }
}
