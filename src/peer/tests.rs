#[cfg(test)]
mod tests {
    use crate::config_client::PeerEndpoint;
    use crate::error::MetaError;
    use crate::peer::{PeerTransport, TcpPeerTransport, peer_request};
    use crate::wire::codec::decode_header;
    use crate::wire::{
        ACK_OK, Command, HEADER_LENGTH, Header, PeerType, frame, read_message, write_frame,
    };
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn endpoint(port: u16) -> PeerEndpoint {
        PeerEndpoint {
            region_id: 2,
            ip: "127.0.0.1".to_string(),
            port,
            node_id: 0x0800_0002,
        }
    }

    fn origin() -> Header {
        let mut header = Header::new(
            Command::ClientQueryNum,
            (PeerType::Client, 7),
            (PeerType::Metadata, 0x0800_0001),
        );
        header.trans_id = 77;
        header.sequence = 5;
        header
    }

    #[test]
    fn test_peer_request_addresses_peer_and_keeps_correlation() {
        let bytes = peer_request(
            0x0800_0001,
            &origin(),
            Command::RemoteQueryData,
            &endpoint(1),
            20,
            10,
            b"{}",
        );

        let header = decode_header(&bytes[..HEADER_LENGTH]).unwrap();

        assert_eq!(header.command, Command::RemoteQueryData.code());
        assert_eq!(header.dst_id, 0x0800_0002);
        assert_eq!(header.src_type, PeerType::Metadata.code());
        assert_eq!(header.trans_id, 77);
        assert_eq!((header.offset, header.count), (20, 10));
        assert_eq!(header.total_size as usize, HEADER_LENGTH + 2);
    }

    #[tokio::test]
    async fn test_exchange_reads_one_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_message(&mut stream).await.unwrap();
            let mut reply = request.header.reply(
                Command::RemoteQueryNumResp,
                ACK_OK,
                0x0800_0002,
                PeerType::Metadata,
            );
            reply.total = 5;
            write_frame(&mut stream, &frame(reply, &request.body)).await.unwrap();
        });
        let transport = TcpPeerTransport::new(Duration::from_secs(2));
        let peer = endpoint(port);
        let request = peer_request(1, &origin(), Command::RemoteQueryNum, &peer, 0, 0, b"{}");

        let reply = transport.exchange(&peer, request).await.unwrap();

        assert_eq!(reply.header.total, 5);
        assert_eq!(&reply.body[..], b"{}");
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let transport = TcpPeerTransport::new(Duration::from_millis(100));
        let peer = endpoint(port);
        let request = peer_request(1, &origin(), Command::RemoteDel, &peer, 0, 0, b"");

        let result = transport.exchange(&peer, request).await;

        assert!(matches!(result, Err(MetaError::PeerUnreachable { .. })));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let transport = TcpPeerTransport::new(Duration::from_millis(500));
        let peer = endpoint(port);
        let request = peer_request(1, &origin(), Command::RemoteDel, &peer, 0, 0, b"");

        let result = transport.exchange(&peer, request).await;

        assert!(matches!(result, Err(MetaError::PeerUnreachable { .. })));
    }
}
