//! Prometheus metrics for sigcast.
//!
//! Covers:
//! - Connection population and churn
//! - Broadcast/unicast fan-out and slow-consumer evictions
//! - Request dispatch outcomes
//! - Ticker activity and aggregation batch sizes
//! - Sample sink failures
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Currently registered duplex connections.
pub static CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sigcast_connections", "Currently registered connections").unwrap()
});

/// Broadcast iterations performed by the connections hub.
pub static BROADCASTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sigcast_broadcasts_total",
        "Broadcast iterations performed by the connections hub"
    )
    .unwrap()
});

/// Unicast attempts.
/// Labels: result (delivered/not_found/queue_full)
pub static UNICASTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sigcast_unicasts_total",
        "Unicast attempts by result",
        &["result"]
    )
    .unwrap()
});

/// Connections evicted by the hub.
/// Labels: reason (slow_consumer/closed)
pub static EVICTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sigcast_evictions_total",
        "Connections evicted during fan-out",
        &["reason"]
    )
    .unwrap()
});

/// Inbound requests.
/// Labels: command (integer code), status (response status name)
pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sigcast_requests_total",
        "Inbound requests by command and response status",
        &["command", "status"]
    )
    .unwrap()
});

/// Ticker ticks across all signals.
pub static TICKS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("sigcast_ticks_total", "Ticks produced by all tickers").unwrap()
});

/// Entries per aggregated update batch.
pub static UPDATE_BATCH_SIZE: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "sigcast_update_batch_size",
        "Entries per SIGNAL_UPDATE_LIST batch",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Sample sink failures.
pub static SINK_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("sigcast_sink_failures_total", "Sample sink failures").unwrap()
});

/// Per-sample pushes dropped because the hub inbox was full.
pub static PUSHES_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sigcast_pushes_dropped_total",
        "Per-sample pushes dropped on a full hub inbox"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Set the registered connection count.
    pub fn connections(count: usize) {
        CONNECTIONS.set(count as i64);
    }

    /// Record a broadcast iteration.
    pub fn broadcast() {
        BROADCASTS_TOTAL.inc();
    }

    /// Record a unicast outcome.
    pub fn unicast(result: &str) {
        UNICASTS_TOTAL.with_label_values(&[result]).inc();
    }

    /// Record an eviction.
    pub fn evicted(reason: &str) {
        EVICTIONS_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record an inbound request outcome.
    pub fn request(command: i32, status: &str) {
        REQUESTS_TOTAL
            .with_label_values(&[&command.to_string(), status])
            .inc();
    }

    /// Record a ticker tick.
    pub fn tick() {
        TICKS_TOTAL.inc();
    }

    /// Record the size of an aggregated batch.
    pub fn update_batch(size: usize) {
        UPDATE_BATCH_SIZE.observe(size as f64);
    }

    /// Record a sample sink failure.
    pub fn sink_failure() {
        SINK_FAILURES_TOTAL.inc();
    }

    /// Record a dropped per-sample push.
    pub fn push_dropped() {
        PUSHES_DROPPED_TOTAL.inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
