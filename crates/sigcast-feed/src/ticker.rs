//! Signal ticker.
//!
//! One ticker owns one signal. Its loop produces a sample every
//! `sample_period` and services snapshot requests by channel rendezvous, so
//! the dirty flag and the `updates` counter are always read together with the
//! sample they describe.
//!
//! The dirty flag is a single slot: the first tick after a take sets it and
//! resets `updates` to 1, later ticks only increment `updates`. A slow reader
//! sees one dirty edge no matter how many ticks elapsed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sigcast_core::{now_nanos, IndexedSample, SignalKind, SignalSample, SignalStatic};
use sigcast_telemetry::Metrics;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::FeedResult;
use crate::generator::ValueGenerator;
use crate::sink::SampleSink;

const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// TickerMsg
// ============================================================================

/// Requests serviced by a ticker's loop.
#[derive(Debug)]
enum TickerMsg {
    /// Current sample, unconditionally.
    Snapshot(oneshot::Sender<SignalSample>),
    /// Current sample if the dirty flag is set; clears the flag.
    TakeIfDirty(oneshot::Sender<Option<SignalSample>>),
}

// ============================================================================
// TickerTask
// ============================================================================

struct TickerTask {
    signal: Arc<SignalStatic>,
    rx: mpsc::Receiver<TickerMsg>,
    stop: CancellationToken,
    running: Arc<AtomicBool>,
    sink: Arc<dyn SampleSink>,
    generator: ValueGenerator,
    stats_interval: Duration,

    sample: SignalSample,
    dirty: bool,
    ticks: u64,
    reports: u64,
}

impl TickerTask {
    async fn run(mut self) {
        let index = self.signal.index;
        debug!(index, name = %self.signal.name, "Ticker started");

        let period = self.signal.sample_period;
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stats_tick = interval_at(Instant::now() + self.stats_interval, self.stats_interval);
        stats_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = tick.tick() => self.on_tick(),
                msg = self.rx.recv() => match msg {
                    Some(msg) => self.handle_message(msg),
                    None => break,
                },
                _ = stats_tick.tick() => {
                    debug!(index, ticks = self.ticks, reports = self.reports, "Ticker stats");
                    self.ticks = 0;
                    self.reports = 0;
                }
            }
        }

        self.running.store(false, Ordering::Release);
        debug!(index, "Ticker stopped");
    }

    fn handle_message(&mut self, msg: TickerMsg) {
        match msg {
            TickerMsg::Snapshot(reply) => {
                self.reports += 1;
                let _ = reply.send(self.sample);
            }
            TickerMsg::TakeIfDirty(reply) => {
                let taken = if self.dirty {
                    self.dirty = false;
                    self.reports += 1;
                    Some(self.sample)
                } else {
                    None
                };
                let _ = reply.send(taken);
            }
        }
    }

    fn on_tick(&mut self) {
        let (value, state) = self.generator.next_sample(self.signal.kind);
        self.sample.value = value;
        self.sample.state = state;
        self.sample.timestamp = now_nanos();

        if self.dirty {
            self.sample.updates = self.sample.updates.saturating_add(1);
        } else {
            self.dirty = true;
            self.sample.updates = 1;
        }

        self.ticks += 1;
        Metrics::tick();

        let record = IndexedSample {
            index: self.signal.index,
            sample: self.sample,
        };
        if let Err(e) = self.sink.record(&record) {
            Metrics::sink_failure();
            warn!(index = record.index, error = %e, "Sample sink failed");
        }
    }
}

// ============================================================================
// Ticker
// ============================================================================

/// Handle to one signal's ticker.
///
/// Clones share the same loop. The loop runs from `launch` until `stop` or
/// until the shutdown token it was created under is cancelled.
#[derive(Clone)]
pub struct Ticker {
    signal: Arc<SignalStatic>,
    tx: mpsc::Sender<TickerMsg>,
    stop: CancellationToken,
    running: Arc<AtomicBool>,
    /// Loop state until `launch` takes it.
    pending: Arc<Mutex<Option<TickerTask>>>,
}

impl Ticker {
    /// Create a stopped ticker for `signal`. Cancelling `shutdown` stops it.
    pub fn new(
        signal: SignalStatic,
        sink: Arc<dyn SampleSink>,
        shutdown: &CancellationToken,
    ) -> Self {
        let signal = Arc::new(signal);
        let (tx, rx) = mpsc::channel(16);
        let stop = shutdown.child_token();
        let running = Arc::new(AtomicBool::new(false));

        let task = TickerTask {
            signal: signal.clone(),
            rx,
            stop: stop.clone(),
            running: running.clone(),
            sink,
            generator: ValueGenerator::from_entropy(),
            stats_interval: DEFAULT_STATS_INTERVAL,
            sample: SignalSample {
                timestamp: now_nanos(),
                ..SignalSample::default()
            },
            dirty: false,
            ticks: 0,
            reports: 0,
        };

        Self {
            signal,
            tx,
            stop,
            running,
            pending: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Replace the random source. No effect once launched.
    #[must_use]
    pub fn with_generator(self, generator: ValueGenerator) -> Self {
        if let Some(task) = self.pending.lock().as_mut() {
            task.generator = generator;
        }
        self
    }

    /// Set the statistics log period. No effect once launched.
    #[must_use]
    pub fn with_stats_interval(self, interval: Duration) -> Self {
        if let Some(task) = self.pending.lock().as_mut() {
            task.stats_interval = interval;
        }
        self
    }

    /// Start the loop. Returns `None` if the ticker was already launched.
    pub fn launch(&self) -> Option<JoinHandle<()>> {
        let task = self.pending.lock().take()?;
        self.running.store(true, Ordering::Release);
        Some(tokio::spawn(task.run()))
    }

    /// Stop the loop cooperatively.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn signal(&self) -> &SignalStatic {
        &self.signal
    }

    pub fn index(&self) -> u32 {
        self.signal.index
    }

    /// Current sample. A ticker that is not running reports `InternalError`.
    pub async fn snapshot(&self) -> SignalSample {
        if !self.is_running() {
            return SignalSample::internal_error();
        }
        let (reply, rx) = oneshot::channel();
        if self.tx.send(TickerMsg::Snapshot(reply)).await.is_err() {
            return SignalSample::internal_error();
        }
        rx.await.unwrap_or_else(|_| SignalSample::internal_error())
    }

    /// Current sample if it changed since the last take, clearing the flag.
    pub async fn take_if_dirty(&self) -> Option<SignalSample> {
        if !self.is_running() {
            return None;
        }
        let (reply, rx) = oneshot::channel();
        self.tx.send(TickerMsg::TakeIfDirty(reply)).await.ok()?;
        rx.await.ok().flatten()
    }
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field("signal", &self.signal)
            .field("running", &self.is_running())
            .finish()
    }
}

// ============================================================================
// Spawn
// ============================================================================

/// Create and launch `config.ticker_count` tickers.
///
/// Signals are named `Signal <i>`, kinds cycle through analog, discrete and
/// digital, and periods are drawn uniformly from the configured range.
pub fn spawn_tickers(
    config: &FeedConfig,
    sink: Arc<dyn SampleSink>,
    shutdown: &CancellationToken,
) -> FeedResult<Vec<Ticker>> {
    config.validate()?;

    let mut rng = StdRng::from_entropy();
    let mut tickers = Vec::with_capacity(config.ticker_count);

    for i in 0..config.ticker_count {
        let period_ms = rng.gen_range(config.period_min_ms..=config.period_max_ms);
        let signal = SignalStatic::new(
            format!("Signal {i}"),
            i as u32,
            SignalKind::cycle(i),
            Duration::from_millis(period_ms),
        )?;

        let ticker = Ticker::new(signal, sink.clone(), shutdown)
            .with_stats_interval(config.stats_interval());
        ticker.launch();
        tickers.push(ticker);
    }

    info!(count = tickers.len(), "Tickers launched");
    Ok(tickers)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use sigcast_core::SignalState;

    use super::*;
    use crate::error::FeedError;
    use crate::sink::{MockSampleSink, NullSink};

    fn signal(index: u32, period_ms: u64) -> SignalStatic {
        SignalStatic::new(
            format!("Sig{index}"),
            index,
            SignalKind::Analog,
            Duration::from_millis(period_ms),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_before_launch_is_internal_error() {
        let ticker = Ticker::new(signal(0, 10), Arc::new(NullSink), &CancellationToken::new());
        assert!(!ticker.is_running());
        assert_eq!(ticker.snapshot().await.state, SignalState::InternalError);
        assert!(ticker.take_if_dirty().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_snapshot_is_never_updated() {
        let ticker = Ticker::new(signal(0, 10_000), Arc::new(NullSink), &CancellationToken::new());
        ticker.launch();

        let sample = ticker.snapshot().await;
        assert_eq!(sample.state, SignalState::NeverUpdated);
        assert_eq!(sample.updates, 0);
        assert!(sample.timestamp > 0);
        assert!(ticker.take_if_dirty().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dirty_flag_collapses_ticks() {
        let ticker = Ticker::new(signal(0, 10), Arc::new(NullSink), &CancellationToken::new());
        ticker.launch();

        tokio::time::sleep(Duration::from_millis(35)).await;
        let taken = ticker.take_if_dirty().await.unwrap();
        assert_eq!(taken.updates, 3);
        assert!(matches!(taken.state, SignalState::Ok | SignalState::Bad));

        // The flag is cleared by the take.
        assert!(ticker.take_if_dirty().await.is_none());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ticker.take_if_dirty().await.unwrap().updates, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_does_not_clear_dirty_flag() {
        let ticker = Ticker::new(signal(0, 10), Arc::new(NullSink), &CancellationToken::new());
        ticker.launch();

        tokio::time::sleep(Duration::from_millis(15)).await;
        let snapshot = ticker.snapshot().await;
        assert_eq!(snapshot.updates, 1);

        let taken = ticker.take_if_dirty().await.unwrap();
        assert_eq!(taken, snapshot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reports_internal_error() {
        let ticker = Ticker::new(signal(0, 10), Arc::new(NullSink), &CancellationToken::new());
        let join = ticker.launch().unwrap();
        assert!(ticker.launch().is_none());

        ticker.stop();
        join.await.unwrap();

        assert!(!ticker.is_running());
        assert_eq!(ticker.snapshot().await.state, SignalState::InternalError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_token_stops_ticker() {
        let shutdown = CancellationToken::new();
        let ticker = Ticker::new(signal(0, 10), Arc::new(NullSink), &shutdown);
        let join = ticker.launch().unwrap();

        shutdown.cancel();
        join.await.unwrap();
        assert!(!ticker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_tick_reaches_sink() {
        let recorded = Arc::new(AtomicUsize::new(0));
        let counter = recorded.clone();

        let mut sink = MockSampleSink::new();
        sink.expect_record()
            .withf(|s| s.index == 4 && s.sample.updates >= 1)
            .returning(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let ticker = Ticker::new(signal(4, 10), Arc::new(sink), &CancellationToken::new())
            .with_generator(ValueGenerator::seeded(1));
        ticker.launch();

        tokio::time::sleep(Duration::from_millis(55)).await;
        assert_eq!(recorded.load(Ordering::SeqCst), 5);
        ticker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_sink_does_not_stop_ticker() {
        let mut sink = MockSampleSink::new();
        sink.expect_record()
            .returning(|_| Err(FeedError::Sink("unavailable".to_string())));

        let ticker = Ticker::new(signal(0, 10), Arc::new(sink), &CancellationToken::new());
        ticker.launch();

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(ticker.is_running());
        assert_eq!(ticker.take_if_dirty().await.unwrap().updates, 2);
        ticker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_tickers_names_and_kinds() {
        let config = FeedConfig {
            ticker_count: 4,
            period_min_ms: 100,
            period_max_ms: 200,
            ..Default::default()
        };
        let shutdown = CancellationToken::new();
        let tickers = spawn_tickers(&config, Arc::new(NullSink), &shutdown).unwrap();

        assert_eq!(tickers.len(), 4);
        assert_eq!(tickers[0].signal().name, "Signal 0");
        assert_eq!(tickers[3].index(), 3);
        assert_eq!(tickers[1].signal().kind, SignalKind::Discrete);
        assert_eq!(tickers[2].signal().kind, SignalKind::Digital);
        for ticker in &tickers {
            let period = ticker.signal().sample_period;
            assert!(period >= Duration::from_millis(100) && period <= Duration::from_millis(200));
            assert!(ticker.is_running());
        }

        shutdown.cancel();
    }

    #[test]
    fn test_spawn_tickers_rejects_invalid_config() {
        let config = FeedConfig {
            period_min_ms: 0,
            ..Default::default()
        };
        let result = spawn_tickers(&config, Arc::new(NullSink), &CancellationToken::new());
        assert!(matches!(result, Err(FeedError::InvalidConfig(_))));
    }
}
