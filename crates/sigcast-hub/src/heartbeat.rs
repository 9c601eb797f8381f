//! Heartbeat tracking for duplex connections.
//!
//! Shared between the two pumps of a connection: the write pump records pings,
//! the read pump records pongs and waits on the read deadline. The deadline is
//! refreshed only by pongs.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Heartbeat state of one connection.
pub struct Heartbeat {
    /// Idle limit between pongs.
    pong_wait: Duration,
    state: Mutex<HeartbeatState>,
}

struct HeartbeatState {
    deadline: Instant,
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
    pings: u64,
    pongs: u64,
}

impl Heartbeat {
    /// Start tracking; the first deadline is `pong_wait` from now.
    pub fn new(pong_wait: Duration) -> Self {
        Self {
            pong_wait,
            state: Mutex::new(HeartbeatState {
                deadline: Instant::now() + pong_wait,
                last_ping: None,
                last_pong: None,
                pings: 0,
                pongs: 0,
            }),
        }
    }

    /// Record that a ping was sent.
    pub fn record_ping(&self) {
        let mut state = self.state.lock();
        state.last_ping = Some(Instant::now());
        state.pings += 1;
    }

    /// Record a pong and push the read deadline out by `pong_wait`.
    pub fn record_pong(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.deadline = now + self.pong_wait;
        state.last_pong = Some(now);
        state.pongs += 1;

        if let Some(ping) = state.last_ping {
            trace!(rtt_ms = now.duration_since(ping).as_millis() as u64, "Received pong");
        }
    }

    /// Current read deadline.
    pub fn deadline(&self) -> Instant {
        self.state.lock().deadline
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline()
    }

    /// Heartbeat statistics.
    pub fn stats(&self) -> HeartbeatStats {
        let state = self.state.lock();
        HeartbeatStats {
            last_ping: state.last_ping,
            last_pong: state.last_pong,
            pings: state.pings,
            pongs: state.pongs,
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatStats {
    pub last_ping: Option<Instant>,
    pub last_pong: Option<Instant>,
    pub pings: u64,
    pub pongs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires_without_pong() {
        let hb = Heartbeat::new(Duration::from_secs(60));
        assert!(!hb.is_expired());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(hb.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_refreshes_deadline() {
        let hb = Heartbeat::new(Duration::from_secs(60));
        let first = hb.deadline();

        tokio::time::advance(Duration::from_secs(50)).await;
        hb.record_ping();
        hb.record_pong();
        assert!(hb.deadline() > first);

        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(!hb.is_expired());

        let stats = hb.stats();
        assert_eq!(stats.pings, 1);
        assert_eq!(stats.pongs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_alone_does_not_refresh() {
        let hb = Heartbeat::new(Duration::from_secs(10));
        let first = hb.deadline();
        hb.record_ping();
        assert_eq!(hb.deadline(), first);
    }
}
