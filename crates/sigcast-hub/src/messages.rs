//! Messages hub actor.
//!
//! Dispatches inbound client frames to the handler registered for their
//! command. The handler registry is owned by the hub loop; handlers themselves
//! hand requests to the hub that owns the command (TickerHub, ConnectionsHub)
//! and the response comes back through the request's slot. Responses are
//! delivered to the originating connection through `ConnectionsHub::unicast`.
//!
//! `COMMAND_LIST` is answered by this hub directly from its registry.

use std::collections::HashMap;
use std::time::Duration;

use sigcast_core::{
    decode_header, CommandDescriptor, CommandListFrame, CommandType, Frame, RawFrame,
    ResponseHeader, Status,
};
use sigcast_telemetry::Metrics;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connections::{ConnId, ConnectionsHubHandle};
use crate::error::{HubError, HubResult};
use crate::request::{CommandRequest, Handler};

const HUB_NAME: &str = "MessagesHub";

// ============================================================================
// MessagesHubMsg
// ============================================================================

/// Messages for the messages hub actor.
pub enum MessagesHubMsg {
    /// Register a handler. Duplicate registrations are ignored.
    RegisterHandler {
        command: CommandType,
        handler: Handler,
    },

    /// Remove the handler for a command.
    UnregisterHandler(CommandType),

    /// A frame received on a connection.
    Inbound { conn_id: ConnId, payload: Vec<u8> },

    /// Report the commands currently accepted.
    RegisteredCommands(oneshot::Sender<Vec<CommandType>>),

    /// Graceful shutdown.
    Shutdown,
}

impl std::fmt::Debug for MessagesHubMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RegisterHandler { command, .. } => {
                f.debug_struct("RegisterHandler").field("command", command).finish()
            }
            Self::UnregisterHandler(command) => {
                f.debug_tuple("UnregisterHandler").field(command).finish()
            }
            Self::Inbound { conn_id, payload } => f
                .debug_struct("Inbound")
                .field("conn_id", conn_id)
                .field("bytes", &payload.len())
                .finish(),
            Self::RegisteredCommands(_) => f.write_str("RegisteredCommands"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

// ============================================================================
// MessagesHubTask
// ============================================================================

/// Messages hub actor task.
pub struct MessagesHubTask {
    /// Message receiver.
    rx: mpsc::Receiver<MessagesHubMsg>,

    /// Handler registry: command -> handler.
    handlers: HashMap<CommandType, Handler>,

    /// Response path back to connections.
    connections: ConnectionsHubHandle,

    /// Deadline for a handler's response.
    request_timeout: Duration,
}

impl MessagesHubTask {
    /// Run the hub until Shutdown is received or every handle is dropped.
    pub async fn run(mut self) {
        info!("MessagesHub started");

        while let Some(msg) = self.rx.recv().await {
            match msg {
                MessagesHubMsg::Shutdown => break,
                msg => self.handle_message(msg).await,
            }
        }

        info!(handlers = self.handlers.len(), "MessagesHub stopped");
    }

    /// Handle a single message.
    async fn handle_message(&mut self, msg: MessagesHubMsg) {
        match msg {
            MessagesHubMsg::RegisterHandler { command, handler } => {
                self.on_register_handler(command, handler)
            }
            MessagesHubMsg::UnregisterHandler(command) => self.on_unregister_handler(command),
            MessagesHubMsg::Inbound { conn_id, payload } => self.on_inbound(conn_id, payload).await,
            MessagesHubMsg::RegisteredCommands(reply) => {
                let _ = reply.send(self.registered_commands());
            }
            MessagesHubMsg::Shutdown => unreachable!("Shutdown handled in run()"),
        }
    }

    fn on_register_handler(&mut self, command: CommandType, handler: Handler) {
        if command == CommandType::COMMAND_LIST || self.handlers.contains_key(&command) {
            warn!(%command, "Handler already registered, ignoring");
            return;
        }
        self.handlers.insert(command, handler);
        debug!(%command, "Handler registered");
    }

    fn on_unregister_handler(&mut self, command: CommandType) {
        if self.handlers.remove(&command).is_some() {
            debug!(%command, "Handler unregistered");
        } else {
            warn!(%command, "Unregister for unknown command ignored");
        }
    }

    /// Commands accepted by this hub, sorted by code.
    fn registered_commands(&self) -> Vec<CommandType> {
        let mut commands: Vec<CommandType> = self.handlers.keys().copied().collect();
        commands.push(CommandType::COMMAND_LIST);
        commands.sort();
        commands
    }

    async fn on_inbound(&mut self, conn_id: ConnId, payload: Vec<u8>) {
        let response = match decode_header(&payload) {
            Err(e) => {
                debug!(conn_id, error = %e, "Malformed frame");
                Metrics::request(CommandType::NOT_SUPPORTED.code(), "BAD_REQUEST");
                ResponseHeader::bad_request(e).encode_or_fallback()
            }
            Ok(header) if header.command == CommandType::COMMAND_LIST => {
                Metrics::request(header.command.code(), "OK");
                self.command_list_frame()
            }
            Ok(header) => match self.handlers.get(&header.command) {
                Some(handler) => {
                    let handler = handler.clone();
                    self.dispatch(handler, header.command, conn_id, payload)
                        .await
                }
                None => {
                    debug!(conn_id, command = %header.command, "Unknown command");
                    Metrics::request(header.command.code(), "NOT_SUPPORTED");
                    ResponseHeader::not_supported(header.command).encode_or_fallback()
                }
            },
        };

        if let Err(e) = self.connections.unicast(conn_id, response).await {
            debug!(conn_id, error = %e, "Response not delivered");
        }
    }

    /// Invoke a handler and wait for its response, bounded by the request timeout.
    async fn dispatch(
        &self,
        handler: Handler,
        command: CommandType,
        conn_id: ConnId,
        payload: Vec<u8>,
    ) -> RawFrame {
        let (request, response) = CommandRequest::new(command, payload);
        let request = request.with_origin(conn_id);

        let outcome = match handler(request).await {
            Ok(()) => response.recv_timeout(self.request_timeout).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(frame) => {
                Metrics::request(command.code(), "OK");
                frame
            }
            Err(e) => {
                warn!(conn_id, %command, error = %e, "Handler failed");
                Metrics::request(command.code(), &Status::InternalError.to_string());
                ResponseHeader::internal_error(command, e).encode_or_fallback()
            }
        }
    }

    fn command_list_frame(&self) -> RawFrame {
        let commands = self
            .registered_commands()
            .into_iter()
            .map(CommandDescriptor::from)
            .collect();
        CommandListFrame::new(commands)
            .encode()
            .unwrap_or_else(|e| {
                ResponseHeader::internal_error(CommandType::COMMAND_LIST, e).encode_or_fallback()
            })
    }
}

// ============================================================================
// MessagesHubHandle
// ============================================================================

/// Handle for sending messages to the messages hub.
#[derive(Clone)]
pub struct MessagesHubHandle {
    tx: mpsc::Sender<MessagesHubMsg>,
}

impl MessagesHubHandle {
    /// Register a handler for `command`.
    pub async fn register_handler(&self, command: CommandType, handler: Handler) -> HubResult<()> {
        self.send(MessagesHubMsg::RegisterHandler { command, handler })
            .await
    }

    /// Remove the handler for `command`.
    pub async fn unregister_handler(&self, command: CommandType) -> HubResult<()> {
        self.send(MessagesHubMsg::UnregisterHandler(command)).await
    }

    /// Forward a frame received on `conn_id`.
    pub async fn inbound(&self, conn_id: ConnId, payload: Vec<u8>) -> HubResult<()> {
        self.send(MessagesHubMsg::Inbound { conn_id, payload })
            .await
    }

    /// Commands currently accepted, sorted by code.
    pub async fn registered_commands(&self) -> HubResult<Vec<CommandType>> {
        let (reply, commands) = oneshot::channel();
        self.send(MessagesHubMsg::RegisteredCommands(reply)).await?;
        commands.await.map_err(|_| HubError::HubClosed(HUB_NAME))
    }

    /// Request graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(MessagesHubMsg::Shutdown).await;
    }

    async fn send(&self, msg: MessagesHubMsg) -> HubResult<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| HubError::HubClosed(HUB_NAME))
    }
}

// ============================================================================
// Spawn
// ============================================================================

/// Spawn the messages hub.
#[must_use]
pub fn spawn_messages_hub(
    connections: ConnectionsHubHandle,
    inbox_capacity: usize,
    request_timeout: Duration,
) -> (MessagesHubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(inbox_capacity);

    let task = MessagesHubTask {
        rx,
        handlers: HashMap::new(),
        connections,
        request_timeout,
    };

    let join = tokio::spawn(task.run());
    (MessagesHubHandle { tx }, join)
}
