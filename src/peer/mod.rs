//! Remote Peer Client Module
//!
//! Outbound request/response exchanges with sibling metadata nodes in other regions. Every
//! exchange opens a fresh connection, sends one frame and reads one frame back, bounded by
//! a connect/read timeout.

pub mod transport;

pub use transport::{PeerFuture, PeerTransport, TcpPeerTransport, peer_request};

#[cfg(test)]
mod tests;
