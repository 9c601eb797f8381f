//! Command and status codes of the wire protocol.
//!
//! A single `CommandType` is shared by requests and responses; the `status`
//! field of a response distinguishes success from failure. Codes are stable
//! across a deployment and must never be renumbered.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Command identifier carried in the `command` field of every frame.
///
/// Kept open (a newtype rather than an enum) so that frames naming a command
/// this server does not know can still be decoded and answered with
/// `NOT_SUPPORTED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandType(i32);

impl CommandType {
    /// Catalogue of the commands the server currently accepts.
    pub const COMMAND_LIST: Self = Self(0);
    /// Full signal catalogue (request and response).
    pub const SIGNAL_LIST: Self = Self(1);
    /// Aggregated delta push.
    pub const SIGNAL_UPDATE_LIST: Self = Self(2);
    /// Connected client count (push, also accepted as a request).
    pub const N_CONNECTIONS: Self = Self(3);
    /// Per-sample push.
    pub const SIGNAL_UPDATE: Self = Self(4);
    /// Error responses for requests that could not be served.
    pub const NOT_SUPPORTED: Self = Self(-1);

    /// Wrap a raw command code.
    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    /// Raw integer code.
    pub const fn code(self) -> i32 {
        self.0
    }

    /// Human readable name for known commands.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::COMMAND_LIST => Some("CommandList"),
            Self::SIGNAL_LIST => Some("SignalList"),
            Self::SIGNAL_UPDATE_LIST => Some("SignalUpdateList"),
            Self::N_CONNECTIONS => Some("NConnections"),
            Self::SIGNAL_UPDATE => Some("SignalUpdate"),
            Self::NOT_SUPPORTED => Some("NotSupported"),
            _ => None,
        }
    }
}

impl From<i32> for CommandType {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Response status carried in the `status` field of server frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Status {
    /// Request served.
    #[default]
    Ok,
    /// No handler is registered for the requested command.
    NotSupported,
    /// Frame was not valid JSON or lacked a `command` field.
    BadRequest,
    /// A registered handler failed or did not answer in time.
    InternalError,
}

impl Status {
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::NotSupported => -1,
            Self::BadRequest => -2,
            Self::InternalError => -3,
        }
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl TryFrom<i32> for Status {
    type Error = CoreError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Ok),
            -1 => Ok(Self::NotSupported),
            -2 => Ok(Self::BadRequest),
            -3 => Ok(Self::InternalError),
            other => Err(CoreError::UnknownStatus(other)),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::NotSupported => write!(f, "NOT_SUPPORTED"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}
