//! Per-peer connection pumps.
//!
//! A `Connection` owns the read side of its send queue and drives two tasks:
//! - the read pump forwards inbound frames to the MessagesHub, enforces the
//!   frame size cap and the pong deadline, and unregisters on exit;
//! - the write pump drains the send queue and emits heartbeat pings, each
//!   write bounded by the write deadline.
//!
//! The ConnectionsHub owns the write side of the queue and closes it. Both
//! pumps close the peer on exit through a shared, idempotent closer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use sigcast_core::RawFrame;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::PumpSettings;
use crate::connections::{ConnId, ConnectionsHubHandle};
use crate::error::{HubError, HubResult};
use crate::heartbeat::Heartbeat;
use crate::messages::MessagesHubHandle;
use crate::peer::PeerFrame;

// ============================================================================
// ConnectionCloser
// ============================================================================

/// Closes a connection exactly once, whichever pump gets there first.
#[derive(Debug)]
pub struct ConnectionCloser {
    token: CancellationToken,
    closed: AtomicBool,
}

impl ConnectionCloser {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            closed: AtomicBool::new(false),
        }
    }

    /// Close the connection. Returns `true` only for the first call.
    pub fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        self.token.cancel();
        first
    }

    /// Resolves once the connection is closed or the server shuts down.
    pub async fn closed(&self) {
        self.token.cancelled().await
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A registered duplex peer, ready to be served.
pub struct Connection {
    conn_id: ConnId,
    queue: mpsc::Receiver<RawFrame>,
    settings: PumpSettings,
    closer: Arc<ConnectionCloser>,
}

impl Connection {
    /// Create a send queue and register it with the hub.
    ///
    /// The connection is closed when `shutdown` is cancelled.
    pub async fn open(
        connections: &ConnectionsHubHandle,
        queue_capacity: usize,
        settings: PumpSettings,
        shutdown: &CancellationToken,
    ) -> HubResult<Self> {
        let (tx, queue) = mpsc::channel(queue_capacity);
        let conn_id = connections.register(tx).await?;
        debug!(conn_id, "Connection opened");

        Ok(Self {
            conn_id,
            queue,
            settings,
            closer: Arc::new(ConnectionCloser::new(shutdown.child_token())),
        })
    }

    pub fn id(&self) -> ConnId {
        self.conn_id
    }

    /// Spawn the read and write pumps.
    pub fn spawn<W, R>(
        self,
        sink: W,
        stream: R,
        messages: MessagesHubHandle,
        connections: ConnectionsHubHandle,
    ) -> ConnectionTasks
    where
        W: Sink<PeerFrame, Error = HubError> + Unpin + Send + 'static,
        R: Stream<Item = HubResult<PeerFrame>> + Unpin + Send + 'static,
    {
        let heartbeat = Arc::new(Heartbeat::new(self.settings.pong_wait));

        let read = tokio::spawn(read_pump(
            self.conn_id,
            stream,
            self.settings,
            heartbeat.clone(),
            self.closer.clone(),
            messages,
            connections,
        ));
        let write = tokio::spawn(write_pump(
            self.conn_id,
            sink,
            self.queue,
            self.settings,
            heartbeat,
            self.closer,
        ));

        ConnectionTasks {
            conn_id: self.conn_id,
            read,
            write,
        }
    }
}

/// Join handles of a connection's pumps.
pub struct ConnectionTasks {
    pub conn_id: ConnId,
    pub read: JoinHandle<()>,
    pub write: JoinHandle<()>,
}

impl ConnectionTasks {
    /// Wait for both pumps to exit.
    pub async fn join(self) {
        let _ = self.read.await;
        let _ = self.write.await;
    }
}

// ============================================================================
// Pumps
// ============================================================================

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitReason {
    Closed,
    PeerClosed,
    ReadError,
    PongTimeout,
    FrameTooLarge,
    QueueClosed,
    WriteFailed,
    PingFailed,
}

impl ExitReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::PeerClosed => "peer_closed",
            Self::ReadError => "read_error",
            Self::PongTimeout => "pong_timeout",
            Self::FrameTooLarge => "frame_too_large",
            Self::QueueClosed => "queue_closed",
            Self::WriteFailed => "write_failed",
            Self::PingFailed => "ping_failed",
        }
    }
}

async fn read_pump<R>(
    conn_id: ConnId,
    mut stream: R,
    settings: PumpSettings,
    heartbeat: Arc<Heartbeat>,
    closer: Arc<ConnectionCloser>,
    messages: MessagesHubHandle,
    connections: ConnectionsHubHandle,
) where
    R: Stream<Item = HubResult<PeerFrame>> + Unpin,
{
    let reason = loop {
        tokio::select! {
            () = closer.closed() => break ExitReason::Closed,
            () = sleep_until(heartbeat.deadline()) => {
                if heartbeat.is_expired() {
                    break ExitReason::PongTimeout;
                }
            }
            next = stream.next() => match next {
                Some(Ok(PeerFrame::Text(text))) => {
                    if let Err(reason) = forward(conn_id, text.into_bytes(), &settings, &messages).await {
                        break reason;
                    }
                }
                Some(Ok(PeerFrame::Binary(data))) => {
                    if let Err(reason) = forward(conn_id, data, &settings, &messages).await {
                        break reason;
                    }
                }
                Some(Ok(PeerFrame::Pong(_))) => heartbeat.record_pong(),
                // Pings are answered by the transport.
                Some(Ok(PeerFrame::Ping(_))) => {}
                Some(Ok(PeerFrame::Close)) | None => break ExitReason::PeerClosed,
                Some(Err(e)) => {
                    debug!(conn_id, error = %e, "Peer read failed");
                    break ExitReason::ReadError;
                }
            }
        }
    };

    connections.unregister(conn_id).await;
    if closer.close() {
        let stats = heartbeat.stats();
        info!(
            conn_id,
            reason = reason.as_str(),
            pings = stats.pings,
            pongs = stats.pongs,
            "Connection closed by read pump"
        );
    }
}

/// Forward one inbound frame to the MessagesHub.
async fn forward(
    conn_id: ConnId,
    payload: Vec<u8>,
    settings: &PumpSettings,
    messages: &MessagesHubHandle,
) -> Result<(), ExitReason> {
    if payload.len() > settings.max_frame_bytes {
        let err = HubError::FrameTooLarge {
            size: payload.len(),
            limit: settings.max_frame_bytes,
        };
        debug!(conn_id, error = %err, "Dropping connection");
        return Err(ExitReason::FrameTooLarge);
    }
    trace!(conn_id, bytes = payload.len(), "Inbound frame");
    messages
        .inbound(conn_id, payload)
        .await
        .map_err(|_| ExitReason::Closed)
}

async fn write_pump<W>(
    conn_id: ConnId,
    mut sink: W,
    mut queue: mpsc::Receiver<RawFrame>,
    settings: PumpSettings,
    heartbeat: Arc<Heartbeat>,
    closer: Arc<ConnectionCloser>,
) where
    W: Sink<PeerFrame, Error = HubError> + Unpin,
{
    let mut ping = interval_at(Instant::now() + settings.ping_period, settings.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            () = closer.closed() => break ExitReason::Closed,
            next = queue.recv() => match next {
                Some(frame) => {
                    if let Err(e) = send_batch(&mut sink, frame, &mut queue, &settings).await {
                        debug!(conn_id, error = %e, "Peer write failed");
                        break ExitReason::WriteFailed;
                    }
                }
                // The hub closed the queue.
                None => break ExitReason::QueueClosed,
            },
            _ = ping.tick() => {
                match timeout(settings.write_wait, sink.send(PeerFrame::Ping(Vec::new()))).await {
                    Ok(Ok(())) => heartbeat.record_ping(),
                    _ => break ExitReason::PingFailed,
                }
            }
        }
    };

    if closer.close() {
        info!(conn_id, reason = reason.as_str(), "Connection closed by write pump");
    }
    if matches!(reason, ExitReason::QueueClosed | ExitReason::Closed) {
        let _ = timeout(settings.write_wait, sink.send(PeerFrame::Close)).await;
    }
    let _ = timeout(settings.write_wait, sink.close()).await;
}

/// Write `first` and everything already queued behind it, then flush.
async fn send_batch<W>(
    sink: &mut W,
    first: RawFrame,
    queue: &mut mpsc::Receiver<RawFrame>,
    settings: &PumpSettings,
) -> HubResult<()>
where
    W: Sink<PeerFrame, Error = HubError> + Unpin,
{
    let write = async {
        sink.feed(PeerFrame::Text(first.to_string())).await?;
        while let Ok(frame) = queue.try_recv() {
            sink.feed(PeerFrame::Text(frame.to_string())).await?;
        }
        sink.flush().await
    };

    timeout(settings.write_wait, write)
        .await
        .map_err(|_| HubError::Peer("write deadline exceeded".to_string()))?
}
