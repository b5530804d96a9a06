//! Error kinds shared by the codec, the connection loop and the handlers.
//!
//! Framing errors (`MalformedHeader`, `MalformedBody`, `ConnectionClosed`, `SendFailed`, `Io`)
//! end the connection they occurred on. The remaining kinds are business outcomes that the
//! handlers translate into ack codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("malformed body: {0}")]
    MalformedBody(String),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(std::io::Error),

    #[error("no storage gateway available")]
    NoGatewayAvailable,

    #[error("config lookup for site {site_id} exhausted after {attempts} attempts")]
    ConfigLookupExhausted { site_id: u32, attempts: usize },

    #[error("unknown command 0x{0:08x}")]
    UnknownCommand(u32),

    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MetaError {
    /// True for errors after which the connection cannot be read from again.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            MetaError::MalformedHeader(_)
                | MetaError::MalformedBody(_)
                | MetaError::ConnectionClosed
                | MetaError::SendFailed(_)
                | MetaError::Io(_)
        )
    }
}

impl From<serde_json::Error> for MetaError {
    fn from(e: serde_json::Error) -> Self {
        MetaError::MalformedBody(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MetaError>;
