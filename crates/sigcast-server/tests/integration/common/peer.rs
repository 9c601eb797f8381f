//! In-memory test client.
//!
//! Wraps a `MemoryPeer` attached to running `Services`, decoding every text
//! frame into a `ServerFrame`.

use sigcast_core::{CommandType, ServerFrame};
use sigcast_hub::{ConnectionTasks, MemoryPeer};
use sigcast_server::Services;
use tokio::time::timeout;

use super::WAIT;

/// A connected client.
pub struct TestPeer {
    peer: MemoryPeer,
    tasks: ConnectionTasks,
}

impl TestPeer {
    /// Attach a new client to `services`.
    pub async fn connect(services: &Services) -> Self {
        let (sink, stream, peer) = MemoryPeer::new(64);
        let tasks = services.attach(sink, stream).await.unwrap();
        Self { peer, tasks }
    }

    /// Send a raw text frame.
    pub async fn send(&self, text: &str) {
        assert!(self.peer.send_text(text).await, "server stopped reading");
    }

    /// Next decoded frame, skipping heartbeats.
    pub async fn next(&mut self) -> ServerFrame {
        let text = timeout(WAIT, self.peer.next_text())
            .await
            .expect("timed out waiting for a frame")
            .expect("server closed the connection");
        ServerFrame::parse(&text).unwrap()
    }

    /// Next frame carrying `command`, skipping all others.
    pub async fn next_command(&mut self, command: CommandType) -> ServerFrame {
        loop {
            let frame = self.next().await;
            if frame.command == command {
                return frame;
            }
        }
    }

    /// Next client-count announcement.
    pub async fn next_count(&mut self) -> usize {
        self.next_command(CommandType::N_CONNECTIONS)
            .await
            .number
            .unwrap()
    }

    /// Close the client side and wait for the server pumps to exit.
    pub async fn hang_up(self) {
        self.peer.hang_up();
        timeout(WAIT, self.tasks.join())
            .await
            .expect("pumps did not exit");
    }
}
