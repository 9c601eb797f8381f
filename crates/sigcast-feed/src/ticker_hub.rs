//! Ticker hub actor.
//!
//! Owns the ticker registry and serves the two signal views:
//! - Catalogue requests (`SIGNAL_LIST`), answered through the request's
//!   response slot with a snapshot of every ticker
//! - The aggregation tick, which collects the dirty tickers and broadcasts
//!   them as one `SIGNAL_UPDATE_LIST` frame
//!
//! The registry is touched only by the hub's loop. Subscribing or
//! unsubscribing does not start or stop a ticker.

use std::collections::BTreeMap;
use std::time::Duration;

use sigcast_core::{
    CommandType, Frame, IndexedSample, RawFrame, ResponseHeader, SignalEntry, SignalIndex,
    SignalListFrame, SignalUpdateListFrame,
};
use sigcast_hub::{handler, CommandRequest, ConnectionsHubHandle, HubError, HubResult, MessagesHubHandle};
use sigcast_telemetry::Metrics;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::ticker::Ticker;

const HUB_NAME: &str = "TickerHub";

// ============================================================================
// TickerHubMsg
// ============================================================================

/// Messages for the ticker hub actor.
#[derive(Debug)]
pub enum TickerHubMsg {
    /// Add a ticker, replacing any ticker with the same index.
    Subscribe(Ticker),

    /// Remove a ticker by index.
    Unsubscribe(SignalIndex),

    /// Answer a catalogue request.
    SignalList(CommandRequest),

    /// Number of registered tickers.
    TickerCount(oneshot::Sender<usize>),

    /// Graceful shutdown.
    Shutdown,
}

// ============================================================================
// TickerHubTask
// ============================================================================

/// Ticker hub actor task.
pub struct TickerHubTask {
    rx: mpsc::Receiver<TickerHubMsg>,
    tickers: BTreeMap<SignalIndex, Ticker>,
    connections: ConnectionsHubHandle,
    aggregation_period: Duration,
    shutdown: CancellationToken,
}

impl TickerHubTask {
    /// Run until Shutdown, cancellation, or every handle is dropped.
    pub async fn run(mut self) {
        info!(
            aggregation_ms = self.aggregation_period.as_millis() as u64,
            "TickerHub started"
        );

        let mut aggregate = interval_at(
            Instant::now() + self.aggregation_period,
            self.aggregation_period,
        );
        aggregate.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                msg = self.rx.recv() => match msg {
                    Some(TickerHubMsg::Shutdown) | None => break,
                    Some(msg) => self.handle_message(msg).await,
                },
                _ = aggregate.tick() => self.on_aggregate().await,
            }
        }

        info!(tickers = self.tickers.len(), "TickerHub stopped");
    }

    async fn handle_message(&mut self, msg: TickerHubMsg) {
        match msg {
            TickerHubMsg::Subscribe(ticker) => self.on_subscribe(ticker),
            TickerHubMsg::Unsubscribe(index) => self.on_unsubscribe(index),
            TickerHubMsg::SignalList(request) => self.on_signal_list(request).await,
            TickerHubMsg::TickerCount(reply) => {
                let _ = reply.send(self.tickers.len());
            }
            TickerHubMsg::Shutdown => unreachable!("Shutdown handled in run()"),
        }
    }

    fn on_subscribe(&mut self, ticker: Ticker) {
        let index = ticker.index();
        debug!(index, name = %ticker.signal().name, "Subscribing ticker");
        if self.tickers.insert(index, ticker).is_some() {
            warn!(index, "Replaced ticker with duplicate index");
        }
    }

    fn on_unsubscribe(&mut self, index: SignalIndex) {
        match self.tickers.remove(&index) {
            Some(_) => debug!(index, "Unsubscribed ticker"),
            None => debug!(index, "Unsubscribe for unknown ticker ignored"),
        }
    }

    async fn on_signal_list(&mut self, request: CommandRequest) {
        let mut entries = Vec::with_capacity(self.tickers.len());
        for ticker in self.tickers.values() {
            entries.push(SignalEntry {
                signal: ticker.signal().clone(),
                sample: ticker.snapshot().await,
            });
        }

        let count = entries.len();
        let frame = match SignalListFrame::new(entries).encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to encode signal list");
                ResponseHeader::internal_error(CommandType::SIGNAL_LIST, e).encode_or_fallback()
            }
        };

        trace!(
            count,
            origin = ?request.origin(),
            request_bytes = request.payload().len(),
            "Answering signal list"
        );
        request.respond(frame);
    }

    async fn on_aggregate(&mut self) {
        let mut updates = Vec::new();
        for (&index, ticker) in &self.tickers {
            if let Some(sample) = ticker.take_if_dirty().await {
                updates.push(IndexedSample { index, sample });
            }
        }

        if updates.is_empty() {
            return;
        }

        let count = updates.len();
        Metrics::update_batch(count);

        let frame = match SignalUpdateListFrame::new(updates).encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(count, error = %e, "Failed to encode update list, dropping batch");
                return;
            }
        };

        match self.connections.broadcast(frame).await {
            Ok(report) => trace!(
                count,
                delivered = report.delivered,
                evicted = report.evicted,
                "Update list broadcast"
            ),
            Err(e) => warn!(error = %e, "Update list broadcast failed"),
        }
    }
}

// ============================================================================
// TickerHubHandle
// ============================================================================

/// Handle for sending messages to the ticker hub.
#[derive(Clone)]
pub struct TickerHubHandle {
    tx: mpsc::Sender<TickerHubMsg>,
}

impl TickerHubHandle {
    pub async fn subscribe(&self, ticker: Ticker) -> HubResult<()> {
        self.send(TickerHubMsg::Subscribe(ticker)).await
    }

    pub async fn unsubscribe(&self, index: SignalIndex) -> HubResult<()> {
        self.send(TickerHubMsg::Unsubscribe(index)).await
    }

    /// Hand a catalogue request to the hub.
    pub async fn submit_signal_list(&self, request: CommandRequest) -> HubResult<()> {
        self.send(TickerHubMsg::SignalList(request)).await
    }

    /// Encoded catalogue of every registered ticker.
    pub async fn signal_list(&self) -> HubResult<RawFrame> {
        let (request, response) = CommandRequest::new(CommandType::SIGNAL_LIST, Vec::new());
        self.submit_signal_list(request).await?;
        response.recv().await
    }

    pub async fn ticker_count(&self) -> HubResult<usize> {
        let (reply, count) = oneshot::channel();
        self.send(TickerHubMsg::TickerCount(reply)).await?;
        count.await.map_err(|_| HubError::HubClosed(HUB_NAME))
    }

    /// Register this hub's request handlers with the messages hub.
    pub async fn register_handlers(&self, messages: &MessagesHubHandle) -> HubResult<()> {
        let hub = self.clone();
        messages
            .register_handler(
                CommandType::SIGNAL_LIST,
                handler(move |request| {
                    let hub = hub.clone();
                    async move { hub.submit_signal_list(request).await }
                }),
            )
            .await
    }

    /// Request graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(TickerHubMsg::Shutdown).await;
    }

    async fn send(&self, msg: TickerHubMsg) -> HubResult<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| HubError::HubClosed(HUB_NAME))
    }
}

// ============================================================================
// Spawn
// ============================================================================

/// Spawn the ticker hub.
///
/// Update lists are broadcast through `connections` every
/// `aggregation_period`. The hub stops when `shutdown` is cancelled.
#[must_use]
pub fn spawn_ticker_hub(
    connections: ConnectionsHubHandle,
    aggregation_period: Duration,
    inbox_capacity: usize,
    shutdown: CancellationToken,
) -> (TickerHubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(inbox_capacity);

    let task = TickerHubTask {
        rx,
        tickers: BTreeMap::new(),
        connections,
        aggregation_period,
        shutdown,
    };

    let join = tokio::spawn(task.run());
    (TickerHubHandle { tx }, join)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sigcast_core::{ServerFrame, SignalKind, SignalState, SignalStatic, Status};
    use sigcast_hub::spawn_connections_hub;

    use super::*;
    use crate::sink::NullSink;

    fn ticker(index: u32, kind: SignalKind, period: Duration, shutdown: &CancellationToken) -> Ticker {
        let signal = SignalStatic::new(format!("Sig{index}"), index, kind, period).unwrap();
        Ticker::new(signal, Arc::new(NullSink), shutdown)
    }

    fn frames(rx: &mut mpsc::Receiver<RawFrame>) -> Vec<ServerFrame> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(ServerFrame::parse(&frame).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_signal_list_contains_every_ticker() {
        let shutdown = CancellationToken::new();
        let (connections, _) = spawn_connections_hub(16, Duration::from_secs(60));
        let (hub, _) = spawn_ticker_hub(connections, Duration::from_secs(60), 16, shutdown.clone());

        let period = Duration::from_secs(10);
        for (index, kind) in [(0, SignalKind::Analog), (1, SignalKind::Digital)] {
            let t = ticker(index, kind, period, &shutdown);
            t.launch();
            hub.subscribe(t).await.unwrap();
        }
        assert_eq!(hub.ticker_count().await.unwrap(), 2);

        let frame = ServerFrame::parse(&hub.signal_list().await.unwrap()).unwrap();
        assert_eq!(frame.command, CommandType::SIGNAL_LIST);
        assert_eq!(frame.status, Status::Ok);

        let pids = frame.pids.unwrap();
        assert_eq!(pids.len(), 2);
        assert_eq!(pids[0]["name"], "Sig0");
        assert_eq!(pids[0]["type"], "analog");
        assert_eq!(pids[1]["type"], "digital");
        assert_eq!(pids[1]["period"], 10_000);
        assert_eq!(pids[1]["state"], "never_updated");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_signal_list_reports_stopped_ticker() {
        let shutdown = CancellationToken::new();
        let (connections, _) = spawn_connections_hub(16, Duration::from_secs(60));
        let (hub, _) = spawn_ticker_hub(connections, Duration::from_secs(60), 16, shutdown.clone());

        // Never launched.
        hub.subscribe(ticker(7, SignalKind::Analog, Duration::from_secs(1), &shutdown))
            .await
            .unwrap();

        let frame = ServerFrame::parse(&hub.signal_list().await.unwrap()).unwrap();
        let pids = frame.pids.unwrap();
        assert_eq!(pids[0]["index"], 7);
        assert_eq!(
            pids[0]["state"],
            serde_json::to_value(SignalState::InternalError).unwrap()
        );

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_ticker() {
        let shutdown = CancellationToken::new();
        let (connections, _) = spawn_connections_hub(16, Duration::from_secs(60));
        let (hub, _) = spawn_ticker_hub(connections, Duration::from_secs(60), 16, shutdown.clone());

        let t = ticker(0, SignalKind::Analog, Duration::from_secs(1), &shutdown);
        t.launch();
        hub.subscribe(t.clone()).await.unwrap();
        hub.unsubscribe(0).await.unwrap();
        hub.unsubscribe(42).await.unwrap();

        assert_eq!(hub.ticker_count().await.unwrap(), 0);
        let frame = ServerFrame::parse(&hub.signal_list().await.unwrap()).unwrap();
        assert!(frame.pids.unwrap().is_empty());

        // Unsubscribing leaves the ticker running.
        assert!(t.is_running());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_duplicate_index_replaces_ticker() {
        let shutdown = CancellationToken::new();
        let (connections, _) = spawn_connections_hub(16, Duration::from_secs(60));
        let (hub, _) = spawn_ticker_hub(connections, Duration::from_secs(60), 16, shutdown.clone());

        let period = Duration::from_secs(1);
        hub.subscribe(ticker(0, SignalKind::Analog, period, &shutdown)).await.unwrap();
        hub.subscribe(ticker(0, SignalKind::Digital, period, &shutdown)).await.unwrap();

        assert_eq!(hub.ticker_count().await.unwrap(), 1);
        let frame = ServerFrame::parse(&hub.signal_list().await.unwrap()).unwrap();
        assert_eq!(frame.pids.unwrap()[0]["type"], "digital");
        shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregation_broadcasts_dirty_tickers() {
        let shutdown = CancellationToken::new();
        let (connections, _) = spawn_connections_hub(16, Duration::from_secs(60));
        let (queue, mut rx) = mpsc::channel(64);
        connections.register(queue).await.unwrap();

        let fast = ticker(0, SignalKind::Analog, Duration::from_millis(10), &shutdown);
        let idle = ticker(1, SignalKind::Analog, Duration::from_secs(3600), &shutdown);
        fast.launch();
        idle.launch();

        let (hub, _) = spawn_ticker_hub(
            connections.clone(),
            Duration::from_millis(35),
            16,
            shutdown.clone(),
        );
        hub.subscribe(fast).await.unwrap();
        hub.subscribe(idle).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        let received = frames(&mut rx);
        assert_eq!(received[0].command, CommandType::N_CONNECTIONS);

        let updates: Vec<_> = received
            .iter()
            .filter(|f| f.command == CommandType::SIGNAL_UPDATE_LIST)
            .collect();
        assert_eq!(updates.len(), 1);

        let pids = updates[0].pids.as_ref().unwrap();
        assert_eq!(pids.len(), 1);
        assert_eq!(pids[0]["index"], 0);
        assert_eq!(pids[0]["updates"], 3);

        shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregation_skips_empty_batches() {
        let shutdown = CancellationToken::new();
        let (connections, _) = spawn_connections_hub(16, Duration::from_secs(60));
        let (queue, mut rx) = mpsc::channel(64);
        connections.register(queue).await.unwrap();

        let (hub, _) = spawn_ticker_hub(
            connections.clone(),
            Duration::from_millis(10),
            16,
            shutdown.clone(),
        );
        let idle = ticker(0, SignalKind::Analog, Duration::from_secs(3600), &shutdown);
        idle.launch();
        hub.subscribe(idle).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        let received = frames(&mut rx);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].command, CommandType::N_CONNECTIONS);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_registered_handler_answers_through_messages_hub() {
        let shutdown = CancellationToken::new();
        let (connections, _) = spawn_connections_hub(16, Duration::from_secs(60));
        let (messages, _) =
            sigcast_hub::spawn_messages_hub(connections.clone(), 16, Duration::from_secs(5));
        let (hub, _) = spawn_ticker_hub(connections.clone(), Duration::from_secs(60), 16, shutdown.clone());
        hub.register_handlers(&messages).await.unwrap();

        let commands = messages.registered_commands().await.unwrap();
        assert!(commands.contains(&CommandType::SIGNAL_LIST));

        let (queue, mut rx) = mpsc::channel(8);
        let conn_id = connections.register(queue).await.unwrap();
        messages
            .inbound(conn_id, br#"{"command":1}"#.to_vec())
            .await
            .unwrap();

        let count = ServerFrame::parse(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(count.command, CommandType::N_CONNECTIONS);
        let list = ServerFrame::parse(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(list.command, CommandType::SIGNAL_LIST);
        assert_eq!(list.status, Status::Ok);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_handle_fails_after_shutdown() {
        let shutdown = CancellationToken::new();
        let (connections, _) = spawn_connections_hub(16, Duration::from_secs(60));
        let (hub, join) = spawn_ticker_hub(connections, Duration::from_secs(60), 16, shutdown);
        hub.shutdown().await;
        join.await.unwrap();

        assert!(matches!(
            hub.ticker_count().await,
            Err(HubError::HubClosed(HUB_NAME))
        ));
    }
}
