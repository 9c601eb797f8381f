//! Request envelope and handler type.
//!
//! A `CommandRequest` carries the full inbound payload and a single-use
//! response slot. The slot is a `oneshot` sender consumed by `respond`, so a
//! request can be answered at most once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use sigcast_core::{CommandType, RawFrame};
use tokio::sync::oneshot;
use tracing::debug;

use crate::connections::ConnId;
use crate::error::{HubError, HubResult};

/// A request routed to the hub that owns its command.
#[derive(Debug)]
pub struct CommandRequest {
    command: CommandType,
    origin: Option<ConnId>,
    payload: Vec<u8>,
    slot: oneshot::Sender<RawFrame>,
}

impl CommandRequest {
    /// Create a request and the receiver for its single response.
    pub fn new(command: CommandType, payload: Vec<u8>) -> (Self, ResponseReceiver) {
        let (tx, rx) = oneshot::channel();
        let request = Self {
            command,
            origin: None,
            payload,
            slot: tx,
        };
        (request, ResponseReceiver { command, rx })
    }

    /// Tag the request with the connection it arrived on.
    #[must_use]
    pub fn with_origin(mut self, conn_id: ConnId) -> Self {
        self.origin = Some(conn_id);
        self
    }

    pub fn command(&self) -> CommandType {
        self.command
    }

    pub fn origin(&self) -> Option<ConnId> {
        self.origin
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Write the response slot.
    ///
    /// Returns `false` when the requester stopped waiting.
    pub fn respond(self, frame: RawFrame) -> bool {
        let delivered = self.slot.send(frame).is_ok();
        if !delivered {
            debug!(
                command = %self.command,
                origin = ?self.origin,
                "Requester gone, dropping response"
            );
        }
        delivered
    }
}

/// Read side of a request's response slot.
#[derive(Debug)]
pub struct ResponseReceiver {
    command: CommandType,
    rx: oneshot::Receiver<RawFrame>,
}

impl ResponseReceiver {
    /// Wait for the response.
    pub async fn recv(self) -> HubResult<RawFrame> {
        self.rx
            .await
            .map_err(|_| HubError::ResponseDropped(self.command))
    }

    /// Wait for the response, giving up after `deadline`.
    pub async fn recv_timeout(self, deadline: Duration) -> HubResult<RawFrame> {
        let command = self.command;
        match tokio::time::timeout(deadline, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(HubError::RequestTimeout {
                command,
                timeout_ms: deadline.as_millis() as u64,
            }),
        }
    }
}

/// Handler for one command.
///
/// The returned future completes once the request has been handed to the
/// hub that owns the command; the response arrives through the slot.
pub type Handler = Arc<dyn Fn(CommandRequest) -> BoxFuture<'static, HubResult<()>> + Send + Sync>;

/// Build a `Handler` from an async closure.
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(CommandRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HubResult<()>> + Send + 'static,
{
    Arc::new(move |request| f(request).boxed())
}
