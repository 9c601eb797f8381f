//! Connections hub actor.
//!
//! Owns the registry of live connections and is the only writer to their send
//! queues. Every registry mutation happens on the hub's serial loop:
//! - Register / unregister, each followed by a client-count broadcast
//! - Broadcast with slow-consumer eviction
//! - Unicast to a single connection
//! - Client-count requests
//!
//! A connection's send queue is closed by dropping the hub-held `Sender`,
//! which happens exactly once: when the entry leaves the registry.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sigcast_core::{ClientCountFrame, CommandType, Frame, RawFrame, ServerFrame};
use sigcast_telemetry::Metrics;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::error::{HubError, HubResult};
use crate::messages::MessagesHubHandle;
use crate::request::{handler, CommandRequest};

/// Connection identifier, unique for the process lifetime.
pub type ConnId = i32;

const HUB_NAME: &str = "ConnectionsHub";

// ============================================================================
// ConnectionsHubMsg
// ============================================================================

/// Messages for the connections hub actor.
#[derive(Debug)]
pub enum ConnectionsHubMsg {
    /// Add a connection and announce the new client count.
    Register {
        conn_id: ConnId,
        queue: mpsc::Sender<RawFrame>,
    },

    /// Remove a connection, close its queue and announce the new count.
    Unregister(ConnId),

    /// Fan a frame out to every connection.
    Broadcast {
        frame: RawFrame,
        /// Completion report, if the caller waits for it.
        done: Option<oneshot::Sender<BroadcastReport>>,
    },

    /// Deliver a frame to a single connection.
    Unicast {
        conn_id: ConnId,
        frame: RawFrame,
        reply: oneshot::Sender<HubResult<()>>,
    },

    /// Answer with the current client count.
    ClientCount(CommandRequest),

    /// Graceful shutdown.
    Shutdown,
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections that accepted the frame.
    pub delivered: usize,
    /// Connections evicted during the iteration, including follow-up count frames.
    pub evicted: usize,
}

// ============================================================================
// ConnectionsHubTask
// ============================================================================

/// Counters logged and reset once per stats interval.
#[derive(Debug, Default)]
struct HubStats {
    registered: u64,
    unregistered: u64,
    broadcasts: u64,
    evicted: u64,
}

/// Connections hub actor task.
pub struct ConnectionsHubTask {
    /// Message receiver.
    rx: mpsc::Receiver<ConnectionsHubMsg>,

    /// Live connections in registration order, keyed for unicast lookup.
    connections: BTreeMap<ConnId, mpsc::Sender<RawFrame>>,

    stats: HubStats,
    stats_interval: Duration,
}

impl ConnectionsHubTask {
    /// Run the hub until Shutdown is received or every handle is dropped.
    pub async fn run(mut self) {
        info!("ConnectionsHub started");

        let mut stats_tick = interval_at(Instant::now() + self.stats_interval, self.stats_interval);
        stats_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(ConnectionsHubMsg::Shutdown) | None => break,
                    Some(msg) => self.handle_message(msg),
                },
                _ = stats_tick.tick() => self.log_stats(),
            }
        }

        let remaining = self.connections.len();
        // Dropping the senders closes every queue; write pumps send a close frame.
        self.connections.clear();
        Metrics::connections(0);
        info!(remaining, "ConnectionsHub stopped");
    }

    /// Handle a single message.
    fn handle_message(&mut self, msg: ConnectionsHubMsg) {
        match msg {
            ConnectionsHubMsg::Register { conn_id, queue } => self.on_register(conn_id, queue),
            ConnectionsHubMsg::Unregister(conn_id) => self.on_unregister(conn_id),
            ConnectionsHubMsg::Broadcast { frame, done } => {
                let report = self.on_broadcast(frame);
                if let Some(done) = done {
                    let _ = done.send(report);
                }
            }
            ConnectionsHubMsg::Unicast {
                conn_id,
                frame,
                reply,
            } => {
                let _ = reply.send(self.on_unicast(conn_id, frame));
            }
            ConnectionsHubMsg::ClientCount(request) => self.on_client_count(request),
            ConnectionsHubMsg::Shutdown => unreachable!("Shutdown handled in run()"),
        }
    }

    fn on_register(&mut self, conn_id: ConnId, queue: mpsc::Sender<RawFrame>) {
        if self.connections.insert(conn_id, queue).is_some() {
            // Replaced sender is dropped here, closing the stale queue.
            warn!(conn_id, "Connection registered twice, replacing queue");
        }
        self.stats.registered += 1;
        Metrics::connections(self.connections.len());
        debug!(conn_id, count = self.connections.len(), "Connection registered");

        self.announce_count();
    }

    fn on_unregister(&mut self, conn_id: ConnId) {
        if self.connections.remove(&conn_id).is_none() {
            trace!(conn_id, "Unregister for unknown connection ignored");
            return;
        }
        self.stats.unregistered += 1;
        Metrics::connections(self.connections.len());
        debug!(conn_id, count = self.connections.len(), "Connection unregistered");

        self.announce_count();
    }

    fn on_broadcast(&mut self, frame: RawFrame) -> BroadcastReport {
        self.stats.broadcasts += 1;
        self.fan_out(frame)
    }

    fn on_unicast(&mut self, conn_id: ConnId, frame: RawFrame) -> HubResult<()> {
        let Some(queue) = self.connections.get(&conn_id) else {
            Metrics::unicast("not_found");
            return Err(HubError::ConnectionNotFound(conn_id));
        };

        match queue.try_send(frame) {
            Ok(()) => {
                Metrics::unicast("delivered");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                Metrics::unicast("queue_full");
                self.evict(conn_id, "slow_consumer");
                self.announce_count();
                Err(HubError::QueueFull(conn_id))
            }
            Err(TrySendError::Closed(_)) => {
                Metrics::unicast("not_found");
                self.evict(conn_id, "closed");
                self.announce_count();
                Err(HubError::ConnectionNotFound(conn_id))
            }
        }
    }

    fn on_client_count(&self, request: CommandRequest) {
        let frame = self.count_frame();
        request.respond(frame);
    }

    /// Broadcast the current client count.
    fn announce_count(&mut self) {
        let frame = self.count_frame();
        self.fan_out(frame);
    }

    fn count_frame(&self) -> RawFrame {
        let frame = ClientCountFrame::new(self.connections.len());
        match frame.encode() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to encode client count frame");
                RawFrame::from(format!(
                    r#"{{"command":3,"status":0,"number":{}}}"#,
                    self.connections.len()
                ))
            }
        }
    }

    /// Enqueue `frame` on every connection without blocking.
    ///
    /// Connections whose queue is full or closed are evicted in the same
    /// iteration; each eviction round is followed by a client-count frame to
    /// the survivors, processed through the same worklist.
    fn fan_out(&mut self, frame: RawFrame) -> BroadcastReport {
        Metrics::broadcast();

        let mut report = BroadcastReport::default();
        let mut pending = VecDeque::from([frame]);
        let mut first = true;

        while let Some(frame) = pending.pop_front() {
            let mut evicted = Vec::new();

            for (&conn_id, queue) in &self.connections {
                match queue.try_send(frame.clone()) {
                    Ok(()) => {
                        if first {
                            report.delivered += 1;
                        }
                    }
                    Err(TrySendError::Full(_)) => evicted.push((conn_id, "slow_consumer")),
                    Err(TrySendError::Closed(_)) => evicted.push((conn_id, "closed")),
                }
            }
            first = false;

            if !evicted.is_empty() {
                report.evicted += evicted.len();
                for (conn_id, reason) in evicted {
                    self.evict(conn_id, reason);
                }
                pending.push_back(self.count_frame());
            }
        }

        report
    }

    fn evict(&mut self, conn_id: ConnId, reason: &'static str) {
        if self.connections.remove(&conn_id).is_some() {
            self.stats.evicted += 1;
            Metrics::evicted(reason);
            Metrics::connections(self.connections.len());
            warn!(
                conn_id,
                reason,
                count = self.connections.len(),
                "Evicting connection"
            );
        }
    }

    fn log_stats(&mut self) {
        let stats = std::mem::take(&mut self.stats);
        info!(
            connections = self.connections.len(),
            registered = stats.registered,
            unregistered = stats.unregistered,
            broadcasts = stats.broadcasts,
            evicted = stats.evicted,
            "ConnectionsHub stats"
        );
    }
}

// ============================================================================
// ConnectionsHubHandle
// ============================================================================

/// Handle for sending messages to the connections hub.
///
/// Clone-friendly; every clone shares the connection ID counter.
#[derive(Clone)]
pub struct ConnectionsHubHandle {
    tx: mpsc::Sender<ConnectionsHubMsg>,
    next_conn_id: Arc<AtomicI32>,
}

impl ConnectionsHubHandle {
    /// Register a connection's send queue. Returns the assigned connection ID.
    pub async fn register(&self, queue: mpsc::Sender<RawFrame>) -> HubResult<ConnId> {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        self.send(ConnectionsHubMsg::Register { conn_id, queue }).await?;
        Ok(conn_id)
    }

    /// Unregister a connection. Unknown IDs are ignored by the hub.
    pub async fn unregister(&self, conn_id: ConnId) {
        let _ = self.tx.send(ConnectionsHubMsg::Unregister(conn_id)).await;
    }

    /// Broadcast a frame and wait until the hub has fanned it out.
    pub async fn broadcast(&self, frame: RawFrame) -> HubResult<BroadcastReport> {
        let (done, report) = oneshot::channel();
        self.send(ConnectionsHubMsg::Broadcast {
            frame,
            done: Some(done),
        })
        .await?;
        report.await.map_err(|_| HubError::HubClosed(HUB_NAME))
    }

    /// Queue a broadcast without waiting. Fails when the hub inbox is full.
    pub fn try_broadcast(&self, frame: RawFrame) -> HubResult<()> {
        self.tx
            .try_send(ConnectionsHubMsg::Broadcast { frame, done: None })
            .map_err(|e| match e {
                TrySendError::Full(_) => HubError::InboxFull(HUB_NAME),
                TrySendError::Closed(_) => HubError::HubClosed(HUB_NAME),
            })
    }

    /// Deliver a frame to one connection.
    pub async fn unicast(&self, conn_id: ConnId, frame: RawFrame) -> HubResult<()> {
        let (reply, result) = oneshot::channel();
        self.send(ConnectionsHubMsg::Unicast {
            conn_id,
            frame,
            reply,
        })
        .await?;
        result.await.map_err(|_| HubError::HubClosed(HUB_NAME))?
    }

    /// Hand a client-count request to the hub.
    pub async fn submit_client_count(&self, request: CommandRequest) -> HubResult<()> {
        self.send(ConnectionsHubMsg::ClientCount(request)).await
    }

    /// Current number of registered connections.
    pub async fn client_count(&self) -> HubResult<usize> {
        let (request, response) = CommandRequest::new(CommandType::N_CONNECTIONS, Vec::new());
        self.submit_client_count(request).await?;
        let frame = response.recv().await?;
        let parsed = ServerFrame::parse(&frame)?;
        Ok(parsed.number.unwrap_or_default())
    }

    /// Register this hub's request handlers with the messages hub.
    pub async fn register_handlers(&self, messages: &MessagesHubHandle) -> HubResult<()> {
        let hub = self.clone();
        messages
            .register_handler(
                CommandType::N_CONNECTIONS,
                handler(move |request| {
                    let hub = hub.clone();
                    async move { hub.submit_client_count(request).await }
                }),
            )
            .await
    }

    /// Request graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(ConnectionsHubMsg::Shutdown).await;
    }

    async fn send(&self, msg: ConnectionsHubMsg) -> HubResult<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| HubError::HubClosed(HUB_NAME))
    }
}

// ============================================================================
// Spawn
// ============================================================================

/// Spawn the connections hub.
///
/// Returns a handle for sending messages and a join handle for the task.
#[must_use]
pub fn spawn_connections_hub(
    inbox_capacity: usize,
    stats_interval: Duration,
) -> (ConnectionsHubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(inbox_capacity);

    let task = ConnectionsHubTask {
        rx,
        connections: BTreeMap::new(),
        stats: HubStats::default(),
        stats_interval,
    };

    let join = tokio::spawn(task.run());
    let handle = ConnectionsHubHandle {
        tx,
        next_conn_id: Arc::new(AtomicI32::new(1)),
    };

    (handle, join)
}
