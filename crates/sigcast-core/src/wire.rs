//! Wire codec.
//!
//! Every frame is a single JSON object. Server frames always carry `command`
//! and `status`; client frames carry at least `command`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::command::{CommandType, Status};
use crate::error::Result;
use crate::signal::{IndexedSample, SignalEntry};

/// Encoded frame, shared between every send queue it is fanned out to.
pub type RawFrame = Arc<str>;

/// Serializable server frame.
pub trait Frame: Serialize {
    /// Encode into a raw frame.
    fn encode(&self) -> Result<RawFrame> {
        Ok(serde_json::to_string(self)?.into())
    }
}

/// Header of a client frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RequestHeader {
    pub command: CommandType,
}

/// Decode the header of an inbound frame.
///
/// Fails when the payload is not a JSON object with an integer `command`.
pub fn decode_header(payload: &[u8]) -> Result<RequestHeader> {
    Ok(serde_json::from_slice(payload)?)
}

/// Header shared by every server frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub command: CommandType,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseHeader {
    pub fn ok(command: CommandType) -> Self {
        Self {
            command,
            status: Status::Ok,
            error: None,
        }
    }

    /// Response for a command with no registered handler.
    pub fn not_supported(requested: CommandType) -> Self {
        Self {
            command: CommandType::NOT_SUPPORTED,
            status: Status::NotSupported,
            error: Some(format!("The Command Request {requested} is not supported")),
        }
    }

    /// Response for a frame whose header could not be decoded.
    pub fn bad_request(detail: impl std::fmt::Display) -> Self {
        Self {
            command: CommandType::NOT_SUPPORTED,
            status: Status::BadRequest,
            error: Some(format!("The Command Request is unrecognizable: {detail}")),
        }
    }

    /// Response for a handler that failed or timed out.
    pub fn internal_error(command: CommandType, detail: impl std::fmt::Display) -> Self {
        Self {
            command,
            status: Status::InternalError,
            error: Some(detail.to_string()),
        }
    }

    /// Encode an error header.
    ///
    /// Headers hold only integers and a string, so encoding cannot fail in
    /// practice; a fixed frame is returned if it ever does.
    pub fn encode_or_fallback(&self) -> RawFrame {
        self.encode()
            .unwrap_or_else(|_| Arc::from(r#"{"command":-1,"status":-3}"#))
    }
}

impl Frame for ResponseHeader {}

/// SIGNAL_LIST response.
#[derive(Debug, Clone, Serialize)]
pub struct SignalListFrame {
    #[serde(flatten)]
    pub header: ResponseHeader,
    pub pids: Vec<SignalEntry>,
}

impl SignalListFrame {
    pub fn new(pids: Vec<SignalEntry>) -> Self {
        Self {
            header: ResponseHeader::ok(CommandType::SIGNAL_LIST),
            pids,
        }
    }
}

impl Frame for SignalListFrame {}

/// SIGNAL_UPDATE_LIST push.
#[derive(Debug, Clone, Serialize)]
pub struct SignalUpdateListFrame {
    #[serde(flatten)]
    pub header: ResponseHeader,
    pub pids: Vec<IndexedSample>,
}

impl SignalUpdateListFrame {
    pub fn new(pids: Vec<IndexedSample>) -> Self {
        Self {
            header: ResponseHeader::ok(CommandType::SIGNAL_UPDATE_LIST),
            pids,
        }
    }
}

impl Frame for SignalUpdateListFrame {}

/// N_CONNECTIONS push or response.
#[derive(Debug, Clone, Serialize)]
pub struct ClientCountFrame {
    #[serde(flatten)]
    pub header: ResponseHeader,
    pub number: usize,
}

impl ClientCountFrame {
    pub fn new(number: usize) -> Self {
        Self {
            header: ResponseHeader::ok(CommandType::N_CONNECTIONS),
            number,
        }
    }
}

impl Frame for ClientCountFrame {}

/// SIGNAL_UPDATE push (one sample).
#[derive(Debug, Clone, Serialize)]
pub struct SignalUpdateFrame {
    #[serde(flatten)]
    pub header: ResponseHeader,
    #[serde(flatten)]
    pub update: IndexedSample,
}

impl SignalUpdateFrame {
    pub fn new(update: IndexedSample) -> Self {
        Self {
            header: ResponseHeader::ok(CommandType::SIGNAL_UPDATE),
            update,
        }
    }
}

impl Frame for SignalUpdateFrame {}

/// One entry of the command catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub command: CommandType,
    pub name: String,
}

impl From<CommandType> for CommandDescriptor {
    fn from(command: CommandType) -> Self {
        Self {
            command,
            name: command
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Command{}", command.code())),
        }
    }
}

/// COMMAND_LIST response.
#[derive(Debug, Clone, Serialize)]
pub struct CommandListFrame {
    #[serde(flatten)]
    pub header: ResponseHeader,
    pub commands: Vec<CommandDescriptor>,
}

impl CommandListFrame {
    pub fn new(commands: Vec<CommandDescriptor>) -> Self {
        Self {
            header: ResponseHeader::ok(CommandType::COMMAND_LIST),
            commands,
        }
    }
}

impl Frame for CommandListFrame {}

/// Loosely typed view of any server frame, for clients and tests.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerFrame {
    pub command: CommandType,
    pub status: Status,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub number: Option<usize>,
    #[serde(default)]
    pub pids: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub commands: Option<Vec<CommandDescriptor>>,
    #[serde(default)]
    pub index: Option<u32>,
}

impl ServerFrame {
    pub fn parse(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::signal::{SignalKind, SignalSample, SignalState, SignalStatic};

    #[test]
    fn test_decode_header() {
        let header = decode_header(br#"{"command":1,"extra":true}"#).unwrap();
        assert_eq!(header.command, CommandType::SIGNAL_LIST);
    }

    #[test]
    fn test_decode_header_rejects_garbage() {
        assert!(decode_header(b"not json").is_err());
        assert!(decode_header(br#"{"cmd":1}"#).is_err());
        assert!(decode_header(br#"{"command":"one"}"#).is_err());
    }

    #[test]
    fn test_not_supported_names_command() {
        let frame = ResponseHeader::not_supported(CommandType::new(9999)).encode_or_fallback();
        let parsed = ServerFrame::parse(&frame).unwrap();
        assert_eq!(parsed.command, CommandType::NOT_SUPPORTED);
        assert_eq!(parsed.status, Status::NotSupported);
        assert!(parsed.error.unwrap().contains("9999"));
    }

    #[test]
    fn test_bad_request_frame() {
        let frame = ResponseHeader::bad_request("expected value").encode_or_fallback();
        assert!(frame.starts_with(r#"{"command":-1,"status":-2,"error":"#));
    }

    #[test]
    fn test_ok_header_omits_error() {
        let frame = ClientCountFrame::new(3).encode().unwrap();
        assert_eq!(&*frame, r#"{"command":3,"status":0,"number":3}"#);
    }

    #[test]
    fn test_update_list_frame_shape() {
        let frame = SignalUpdateListFrame::new(vec![IndexedSample {
            index: 7,
            sample: SignalSample {
                value: 1.0,
                state: SignalState::Bad,
                updates: 3,
                timestamp: 10,
            },
        }])
        .encode()
        .unwrap();

        let parsed = ServerFrame::parse(&frame).unwrap();
        assert_eq!(parsed.command, CommandType::SIGNAL_UPDATE_LIST);
        let pids = parsed.pids.unwrap();
        assert_eq!(pids.len(), 1);
        assert_eq!(pids[0]["index"], 7);
        assert_eq!(pids[0]["updates"], 3);
        assert_eq!(pids[0]["state"], "bad");
    }

    #[test]
    fn test_signal_list_frame_shape() {
        let signal =
            SignalStatic::new("Sig1", 1, SignalKind::Digital, Duration::from_secs(10)).unwrap();
        let frame = SignalListFrame::new(vec![SignalEntry {
            signal,
            sample: SignalSample::default(),
        }])
        .encode()
        .unwrap();

        let parsed = ServerFrame::parse(&frame).unwrap();
        assert_eq!(parsed.status, Status::Ok);
        let pids = parsed.pids.unwrap();
        assert_eq!(pids[0]["name"], "Sig1");
        assert_eq!(pids[0]["type"], "digital");
        assert_eq!(pids[0]["state"], "never_updated");
    }

    #[test]
    fn test_command_descriptor_for_unknown_code() {
        let descriptor = CommandDescriptor::from(CommandType::new(42));
        assert_eq!(descriptor.name, "Command42");
    }
}
