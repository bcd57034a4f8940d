//! ADC wire protocol — packet envelopes, line codec, and message bodies.
//!
//! These types ARE the protocol: a line-oriented text format in which
//! every message is a kind byte, a three-letter command, and escaped
//! space-separated parameters. The hub crate builds its handshake and
//! routing on top of this vocabulary without touching raw bytes.

pub mod codec;
pub mod features;
pub mod msg;
pub mod packet;
pub mod types;

pub use codec::{AdcCodec, MAX_LINE};
pub use features::{Feature, Features};
pub use msg::{ChatMessage, Disconnect, HubInfo, Message, SidAssign, Status, Supported, User};
pub use packet::{BroadcastPacket, Command, DirectPacket, EchoPacket, InfoPacket, Packet};
pub use types::{tiger_hash, Cid, Pid, Severity, Sid};

/// Errors that can arise when interpreting wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("message line exceeds {MAX_LINE} bytes")]
    LineTooLong,

    #[error("message line is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown packet kind: {0:?}")]
    UnknownKind(char),

    #[error("truncated packet: missing {0}")]
    Truncated(&'static str),

    #[error("invalid SID: {0:?}")]
    InvalidSid(String),

    #[error("invalid CID: {0:?}")]
    InvalidCid(String),

    #[error("invalid escape sequence in {0:?}")]
    InvalidEscape(String),

    #[error("invalid feature token: {0:?}")]
    InvalidFeature(String),

    #[error("invalid status code: {0:?}")]
    InvalidStatus(String),

    #[error("expected {expected} message, got {got}")]
    UnexpectedCommand { expected: Command, got: Command },

    #[error("invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
