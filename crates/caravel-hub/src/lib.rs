//! Caravel hub core — admits ADC clients into a shared room and routes
//! their traffic.
//!
//! A connection moves through the Protocol and Identity handshake stages,
//! is admitted into the [`registry::Registry`], and then serves packets
//! until the transport ends. The registry enforces nickname and CID
//! uniqueness across the login race; the router fans traffic out without
//! letting one slow peer stall another.

pub mod config;
pub mod conn;
mod handshake;
pub mod hub;
pub mod peer;
pub mod registry;
mod router;

pub use config::HubConfig;
pub use conn::{Conn, ConnReader, ConnWriter, Wire};
pub use hub::Hub;
pub use peer::{AdcPeer, Peer, Software};
pub use registry::{IdentityConflict, Registry};

use caravel_proto::ProtoError;

/// Errors that terminate a connection.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Wrong packet kind or command, malformed SID tag, unmarshal failure.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("feature negotiation failed: {0}")]
    Feature(String),

    /// PID mismatch or unusable nick.
    #[error("identity failure: {0}")]
    Identity(String),

    #[error("nick is taken")]
    NickTaken,

    #[error("CID is taken")]
    CidTaken,

    #[error("handshake read timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl From<ProtoError> for HubError {
    fn from(e: ProtoError) -> Self {
        match e {
            ProtoError::Io(io) => HubError::Transport(io),
            other => HubError::Protocol(other.to_string()),
        }
    }
}
