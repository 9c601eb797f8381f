//! Sample sinks.
//!
//! A ticker hands every sample it produces to a `SampleSink`. Sinks are called
//! on the ticker's loop and must not block; a failing sink is logged and
//! counted but never stops the ticker.

use std::sync::Arc;

use sigcast_core::{Frame, IndexedSample, SignalUpdateFrame};
use sigcast_hub::{ConnectionsHubHandle, HubError};
use sigcast_telemetry::Metrics;
use tracing::{trace, warn};

use crate::error::{FeedError, FeedResult};

/// One produced sample: signal index plus its dynamic data.
pub type SampleRecord = IndexedSample;

/// Receiver of every sample a ticker produces.
#[cfg_attr(test, mockall::automock)]
pub trait SampleSink: Send + Sync {
    /// Record one sample.
    fn record(&self, sample: &SampleRecord) -> FeedResult<()>;

    /// Flush buffered samples.
    fn flush(&self) -> FeedResult<()> {
        Ok(())
    }
}

/// Sink that discards every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl SampleSink for NullSink {
    fn record(&self, _sample: &SampleRecord) -> FeedResult<()> {
        Ok(())
    }
}

/// Sink that forwards every sample to several sinks.
///
/// Failures of individual sinks are logged and counted here; the remaining
/// sinks still receive the sample.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn SampleSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn SampleSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl SampleSink for FanoutSink {
    fn record(&self, sample: &SampleRecord) -> FeedResult<()> {
        for sink in &self.sinks {
            if let Err(e) = sink.record(sample) {
                Metrics::sink_failure();
                warn!(index = sample.index, error = %e, "Sample sink failed");
            }
        }
        Ok(())
    }

    fn flush(&self) -> FeedResult<()> {
        for sink in &self.sinks {
            if let Err(e) = sink.flush() {
                Metrics::sink_failure();
                warn!(error = %e, "Sample sink flush failed");
            }
        }
        Ok(())
    }
}

/// Sink that pushes every sample to all clients as a `SIGNAL_UPDATE` frame.
///
/// Uses the connections hub's non-blocking broadcast: when the hub inbox is
/// full the push is dropped and counted.
#[derive(Clone)]
pub struct PushSink {
    connections: ConnectionsHubHandle,
}

impl PushSink {
    pub fn new(connections: ConnectionsHubHandle) -> Self {
        Self { connections }
    }
}

impl SampleSink for PushSink {
    fn record(&self, sample: &SampleRecord) -> FeedResult<()> {
        let frame = SignalUpdateFrame::new(*sample).encode()?;
        match self.connections.try_broadcast(frame) {
            Ok(()) => Ok(()),
            Err(HubError::InboxFull(_)) => {
                Metrics::push_dropped();
                trace!(index = sample.index, "Hub inbox full, dropping push");
                Ok(())
            }
            Err(e) => Err(FeedError::Hub(e)),
        }
    }
}
