//! In-process peers.
//!
//! A `MemoryPeer` plays the client side of a connection over tokio channels,
//! so hubs can be driven without a network transport.

use futures_util::{stream, SinkExt};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

use crate::error::{HubError, HubResult};
use crate::peer::{PeerFrame, PeerSink, PeerStream};

/// Client side of an in-memory connection.
pub struct MemoryPeer {
    inbound: mpsc::Sender<HubResult<PeerFrame>>,
    outbound: mpsc::Receiver<PeerFrame>,
}

impl MemoryPeer {
    /// Create a peer. The sink and stream are the server-side halves.
    pub fn new(capacity: usize) -> (PeerSink, PeerStream, Self) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);

        let sink = PollSender::new(out_tx)
            .sink_map_err(|_| HubError::Peer("memory peer hung up".to_string()));
        let stream = stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        let peer = Self {
            inbound: in_tx,
            outbound: out_rx,
        };
        (Box::pin(sink), Box::pin(stream), peer)
    }

    /// Send a frame to the server. Returns `false` once the server stopped reading.
    pub async fn send(&self, frame: PeerFrame) -> bool {
        self.inbound.send(Ok(frame)).await.is_ok()
    }

    pub async fn send_text(&self, text: &str) -> bool {
        self.send(PeerFrame::Text(text.to_string())).await
    }

    pub async fn send_pong(&self) -> bool {
        self.send(PeerFrame::Pong(Vec::new())).await
    }

    /// Make the server's next read fail.
    pub async fn fail_read(&self, reason: &str) -> bool {
        self.inbound
            .send(Err(HubError::Peer(reason.to_string())))
            .await
            .is_ok()
    }

    /// Next frame written by the server, `None` once the server dropped its sink.
    pub async fn next_frame(&mut self) -> Option<PeerFrame> {
        self.outbound.recv().await
    }

    /// Next frame already written by the server, without waiting.
    pub fn try_next_frame(&mut self) -> Option<PeerFrame> {
        self.outbound.try_recv().ok()
    }

    /// Next text frame, skipping heartbeats. `None` once the server closed.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            match self.next_frame().await? {
                PeerFrame::Text(text) => return Some(text),
                PeerFrame::Close => return None,
                _ => continue,
            }
        }
    }

    /// Drop the client side; the server's stream ends.
    pub fn hang_up(self) {}
}
