//! Message routing core for sigcast.
//!
//! Three cooperating pieces, each a serial actor or task set:
//! - `ConnectionsHub`: registry of live connections, broadcast and unicast
//!   with slow-consumer eviction, client-count notifications
//! - `MessagesHub`: command -> handler dispatch for inbound frames
//! - `Connection`: read and write pumps of one duplex peer
//!
//! The signal hub lives in `sigcast-feed` and plugs in through `Handler`.

pub mod config;
pub mod connection;
pub mod connections;
pub mod error;
pub mod heartbeat;
pub mod memory;
pub mod messages;
pub mod peer;
pub mod request;

pub use config::{HubConfig, PumpSettings};
pub use connection::{Connection, ConnectionCloser, ConnectionTasks};
pub use connections::{
    spawn_connections_hub, BroadcastReport, ConnId, ConnectionsHubHandle, ConnectionsHubMsg,
    ConnectionsHubTask,
};
pub use error::{HubError, HubResult};
pub use heartbeat::{Heartbeat, HeartbeatStats};
pub use memory::MemoryPeer;
pub use messages::{spawn_messages_hub, MessagesHubHandle, MessagesHubMsg, MessagesHubTask};
pub use peer::{PeerFrame, PeerSink, PeerStream};
pub use request::{handler, CommandRequest, Handler, ResponseReceiver};
