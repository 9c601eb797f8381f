//! Core domain types for sigcast.
//!
//! This crate provides the types shared by every hub and by clients:
//! - `CommandType`, `Status`: stable integer codes of the wire protocol
//! - `SignalStatic`, `SignalSample`: static identity and dynamic data of a signal
//! - Frame types and the JSON codec used on the duplex transport

pub mod command;
pub mod error;
pub mod signal;
pub mod wire;

pub use command::{CommandType, Status};
pub use error::{CoreError, Result};
pub use signal::{
    now_nanos, IndexedSample, SignalEntry, SignalIndex, SignalKind, SignalSample, SignalState,
    SignalStatic,
};
pub use wire::{
    decode_header, ClientCountFrame, CommandDescriptor, CommandListFrame, Frame, RawFrame,
    RequestHeader, ResponseHeader, ServerFrame, SignalListFrame, SignalUpdateFrame,
    SignalUpdateListFrame,
};
