//! Transport-neutral peer frames.
//!
//! The connection pumps drive any `Sink<PeerFrame>` / `Stream<Item =
//! HubResult<PeerFrame>>` pair. The gateway adapts WebSocket halves to this
//! shape; tests use in-memory peers.

use std::pin::Pin;

use futures_util::{Sink, Stream};

use crate::error::{HubError, HubResult};

/// One frame exchanged with a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFrame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Boxed outbound half of a peer.
pub type PeerSink = Pin<Box<dyn Sink<PeerFrame, Error = HubError> + Send>>;

/// Boxed inbound half of a peer.
pub type PeerStream = Pin<Box<dyn Stream<Item = HubResult<PeerFrame>> + Send>>;
