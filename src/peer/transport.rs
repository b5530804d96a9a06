use bytes::Bytes;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config_client::PeerEndpoint;
use crate::error::{MetaError, Result};
use crate::wire::{Command, Frame, Header, PeerType, frame, read_message, write_frame};

pub type PeerFuture<'a> = Pin<Box<dyn Future<Output = Result<Frame>> + Send + 'a>>;

/// One request, one response, against a sibling metadata node.
pub trait PeerTransport: Send + Sync {
    fn exchange<'a>(&'a self, peer: &'a PeerEndpoint, request: Bytes) -> PeerFuture<'a>;
}

/// Builds a peer-to-peer request carrying the originating client's correlation fields.
pub fn peer_request(
    local_id: u32,
    origin: &Header,
    command: Command,
    peer: &PeerEndpoint,
    offset: u64,
    count: u32,
    body: &[u8],
) -> Bytes {
    let mut header = Header::new(
        command,
        (PeerType::Metadata, local_id),
        (PeerType::Metadata, peer.node_id),
    );
    header.trans_id = origin.trans_id;
    header.sequence = origin.sequence;
    header.offset = offset;
    header.count = count;
    frame(header, body)
}

pub struct TcpPeerTransport {
    timeout: Duration,
}

impl TcpPeerTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn unreachable(peer: &str, reason: impl Display) -> MetaError {
    MetaError::PeerUnreachable {
        peer: peer.to_string(),
        reason: reason.to_string(),
    }
}

impl PeerTransport for TcpPeerTransport {
    fn exchange<'a>(&'a self, peer: &'a PeerEndpoint, request: Bytes) -> PeerFuture<'a> {
        Box::pin(async move {
            let addr = peer.address();

            let mut stream = timeout(self.timeout, TcpStream::connect(&addr))
                .await
                .map_err(|_| unreachable(&addr, "connect timed out"))?
                .map_err(|e| unreachable(&addr, e))?;

            timeout(self.timeout, write_frame(&mut stream, &request))
                .await
                .map_err(|_| unreachable(&addr, "send timed out"))?
                .map_err(|e| unreachable(&addr, e))?;

            let reply = timeout(self.timeout, read_message(&mut stream))
                .await
                .map_err(|_| unreachable(&addr, "reply timed out"))?
                .map_err(|e| unreachable(&addr, e))?;

            debug!(
                "Peer {} answered command 0x{:08x} ack {}",
                addr, reply.header.command, reply.header.ack_code
            );
            Ok(reply)
        })
    }
}
