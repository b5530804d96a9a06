//! TCP front door: one task per accepted connection, frames handled in arrival order.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::MetaError;
use crate::handlers::{NodeContext, Outcome, dispatch};
use crate::wire::{read_message, write_frame};

/// Accepts connections until `shutdown` flips.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<NodeContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    match listener.local_addr() {
        Ok(addr) => info!("Metadata node listening on {}", addr),
        Err(e) => warn!("Listening on unknown address: {}", e),
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        handle_connection(stream, peer, ctx).await;
                    });
                }
                Err(e) => error!("Accept failed: {}", e),
            },
            _ = shutdown.changed() => {
                info!("Listener stopping");
                break;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<NodeContext>) {
    debug!("Connection from {}", peer);
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let frame = match read_message(&mut reader).await {
            Ok(frame) => frame,
            Err(MetaError::ConnectionClosed) => {
                debug!("{} disconnected", peer);
                break;
            }
            Err(e) => {
                error!("Dropping {}: {}", peer, e);
                break;
            }
        };

        match dispatch(&ctx, &frame.header, &frame.body).await {
            Ok(Outcome::Reply(bytes)) => {
                if let Err(e) = write_frame(&mut writer, &bytes).await {
                    warn!("Reply to {} failed: {}", peer, e);
                    break;
                }
            }
            Ok(Outcome::Silent) => {}
            Ok(Outcome::Close) => {
                info!("Closing {} on request of handler", peer);
                break;
            }
            Err(e) if e.is_fatal_to_connection() => {
                error!("Dropping {}: {}", peer, e);
                break;
            }
            Err(e) => warn!("Request 0x{:08x} from {} failed: {}", frame.header.command, peer, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_client::{ConfigLookup, ConfigReply, LookupFuture, PeerEndpoint};
    use crate::gateway::GatewayRegistry;
    use crate::handlers::NodeIdentity;
    use crate::peer::{PeerFuture, PeerTransport};
    use crate::storage::MemoryStore;
    use crate::wire::codec::{encode_client_heartbeat, parse_json};
    use crate::wire::*;
    use bytes::Bytes;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    struct NoConfig;

    impl ConfigLookup for NoConfig {
        fn lookup(&self, _site_id: u32) -> LookupFuture<'_> {
            Box::pin(async { None })
        }

        fn take_notice(&self, _site_id: u32) -> Option<ConfigReply> {
            None
        }

        fn peek_notice(&self, _site_id: u32) -> Option<ConfigReply> {
            None
        }
    }

    struct NoPeers;

    impl PeerTransport for NoPeers {
        fn exchange<'a>(&'a self, peer: &'a PeerEndpoint, _request: Bytes) -> PeerFuture<'a> {
            Box::pin(async move {
                Err(MetaError::PeerUnreachable {
                    peer: peer.address(),
                    reason: "no peers in this test".to_string(),
                })
            })
        }
    }

    async fn start() -> (SocketAddr, watch::Sender<bool>) {
        let ctx = NodeContext::new(
            NodeIdentity {
                node_id: 0x0800_0001,
                region_id: 1,
                system_id: 1,
            },
            GatewayRegistry::new(Duration::from_secs(15)),
            Arc::new(MemoryStore::new()),
            Arc::new(NoConfig),
            Arc::new(NoPeers),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(serve(listener, ctx, stop_rx));
        (addr, stop_tx)
    }

    fn heartbeat_frame(trans_id: u64) -> Bytes {
        let mut header = Header::new(Command::ClientHb, (PeerType::Client, 7), (PeerType::Metadata, 0x0800_0001));
        header.trans_id = trans_id;
        let body = encode_client_heartbeat(&ClientHeartbeat {
            site_id: 7,
            ..Default::default()
        });
        frame(header, &body)
    }

    #[tokio::test]
    async fn test_heartbeat_round_trip_over_tcp() {
        let (addr, _stop) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(&heartbeat_frame(1)).await.unwrap();
        stream.write_all(&heartbeat_frame(2)).await.unwrap();
        let first = read_message(&mut stream).await.unwrap();
        let second = read_message(&mut stream).await.unwrap();

        assert_eq!(first.header.command, Command::ClientHbResp.code());
        assert_eq!((first.header.trans_id, second.header.trans_id), (1, 2));
        let body: Value = parse_json(&first.body).unwrap();
        assert_eq!(body, json!({"config_version": 0, "client_version": 0}));
    }

    #[tokio::test]
    async fn test_garbage_header_closes_connection() {
        let (addr, _stop) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // total_size smaller than a header
        let mut garbage = vec![0u8; HEADER_LENGTH];
        garbage[3] = 8;
        stream.write_all(&garbage).await.unwrap();

        let result = read_message(&mut stream).await;
        assert!(matches!(result, Err(MetaError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_connection_open() {
        let (addr, _stop) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let mut header = Header::new(Command::ClientHb, (PeerType::Client, 7), (PeerType::Metadata, 1));
        header.command = 0x7777;
        stream.write_all(&frame(header, b"")).await.unwrap();
        stream.write_all(&heartbeat_frame(3)).await.unwrap();

        let reply = read_message(&mut stream).await.unwrap();
        assert_eq!(reply.header.trans_id, 3);
    }
}
