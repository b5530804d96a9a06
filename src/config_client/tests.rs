//! Config Client Tests
//!
//! ## Test Scopes
//! - **Reply parsing**: peer region tuples, versions and upgrade fields.
//! - **Correlation**: concurrent queries for different sites never swap replies.
//! - **Retry budget**: an unanswered query gives up after the configured attempts.
//! - **Push notices & reconnect**: notices are parked per site; a dropped link comes back.
//! - **Malformed frames**: an unparsable config body ends the connection, which is redialed.

#[cfg(test)]
mod tests {
    use crate::config_client::client::notice_key;
    use crate::error::MetaError;
    use crate::config_client::*;
    use crate::metrics::{NodeMetrics, StaticMetrics};
    use crate::wire::codec::parse_json;
    use crate::wire::{Command, Frame, Header, PeerType, frame, read_message, write_frame};
    use bytes::Bytes;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::{Mutex, mpsc, watch};

    fn reply_from(value: Value) -> ConfigReply {
        serde_json::from_value(value).unwrap()
    }

    fn settings(addr: SocketAddr, attempts: usize, delay: Duration) -> ConfigClientSettings {
        ConfigClientSettings {
            addr: addr.to_string(),
            local_id: 0x0800_0001,
            service_id: 0x0a00_0001,
            region_id: 1,
            system_id: 1,
            heartbeat_interval: Duration::from_secs(60),
            retry: RetryPolicy { attempts, delay },
        }
    }

    fn client_for(settings: ConfigClientSettings) -> Arc<ConfigClient> {
        ConfigClient::new(settings, Arc::new(StaticMetrics(NodeMetrics::default())))
    }

    fn reply_header(command: Command, site_id: u64) -> Header {
        let mut header = Header::new(command, (PeerType::Config, 0x0a00_0001), (PeerType::Metadata, 0x0800_0001));
        header.trans_id = site_id;
        header
    }

    /// Fake config service. Replies to queries for the sites in `replies` after the paired
    /// delay; forwards every received frame to the returned channel. The first `drop_first`
    /// connections are closed right after accept.
    async fn fake_service(
        replies: HashMap<u64, (Duration, Value)>,
        push_on_accept: Option<(u64, Value)>,
        drop_first: usize,
    ) -> (SocketAddr, mpsc::UnboundedReceiver<Frame>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        let replies = Arc::new(replies);

        tokio::spawn(async move {
            let mut dropped = 0;
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                if dropped < drop_first {
                    dropped += 1;
                    drop(stream);
                    continue;
                }
                let (mut reader, writer) = stream.into_split();
                let writer = Arc::new(Mutex::new(writer));
                if let Some((site, body)) = &push_on_accept {
                    let bytes = frame(reply_header(Command::ConfigInfo, *site), body.to_string().as_bytes());
                    write_frame(&mut *writer.lock().await, &bytes).await.unwrap();
                }
                while let Ok(received) = read_message(&mut reader).await {
                    let header = received.header;
                    let _ = seen_tx.send(received);
                    if header.command != Command::ConfigQuery.code() {
                        continue;
                    }
                    if let Some((delay, body)) = replies.get(&header.trans_id).cloned() {
                        let writer = Arc::clone(&writer);
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let bytes = frame(
                                reply_header(Command::ConfigQueryResp, header.trans_id),
                                body.to_string().as_bytes(),
                            );
                            let _ = write_frame(&mut *writer.lock().await, &bytes).await;
                        });
                    }
                }
            }
        });

        (addr, seen_rx)
    }

    async fn wait_connected(client: &ConfigClient) {
        for _ in 0..200 {
            if client.is_connected().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("config client never connected");
    }

    // ============================================================
    // REPLY PARSING TESTS
    // ============================================================

    #[test]
    fn test_peer_regions_resolve_region_tuples() {
        let reply = reply_from(json!({
            "7": ["2", 3],
            "2": [2, "10.0.2.1", 9110, "0x08000002"],
            "3": ["3", "10.0.3.1", "9110", "08000003"],
            "region_id": [1, "10.0.1.1", 9110, "0x08000001"],
        }));

        let peers = reply.peer_regions(7);

        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].address(), "10.0.2.1:9110");
        assert_eq!(peers[0].node_id, 0x0800_0002);
        assert_eq!(peers[1].region_id, 3);
        assert_eq!(peers[1].port, 9110);
        assert_eq!(reply.home_region().map(|h| h.region_id), Some(1));
    }

    #[test]
    fn test_site_without_history_has_no_peers() {
        let reply = reply_from(json!({"region_id": [1, "10.0.1.1", 9110, "0x08000001"]}));

        assert!(reply.peer_regions(7).is_empty());
    }

    #[test]
    fn test_versions_and_upgrade_fields() {
        let reply = reply_from(json!({
            "config_version": 3,
            "client_version": "4",
            "file_url": "http://dl/client.tgz",
            "file_name": "client.tgz",
        }));

        assert_eq!(
            reply.versions(),
            SiteVersions { config_version: 3, client_version: 4 }
        );
        let package = reply.upgrade_package();
        assert_eq!(package.file_name, "client.tgz");
        assert_eq!(package.file_md5, "", "missing fields become empty");
    }

    #[test]
    fn test_notice_key_format() {
        assert_eq!(notice_key(42), "42_info");
    }

    // ============================================================
    // CORRELATION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_concurrent_queries_never_cross_deliver() {
        // ARRANGE: site 1 answers slowly, site 2 quickly, so replies arrive in reverse order
        let mut replies = HashMap::new();
        replies.insert(1, (Duration::from_millis(200), json!({"tag": 1})));
        replies.insert(2, (Duration::from_millis(10), json!({"tag": 2})));
        let (addr, _seen) = fake_service(replies, None, 0).await;
        let client = client_for(settings(addr, 3, Duration::from_secs(2)));
        let (_stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(Arc::clone(&client).run(stop_rx));
        wait_connected(&client).await;

        // ACT
        let (first, second) = tokio::join!(client.query(1), client.query(2));

        // ASSERT
        assert_eq!(first.unwrap().0["tag"], json!(1));
        assert_eq!(second.unwrap().0["tag"], json!(2));
    }

    #[tokio::test]
    async fn test_two_waiters_for_same_site_both_resolve() {
        let mut replies = HashMap::new();
        replies.insert(5, (Duration::from_millis(50), json!({"tag": 5})));
        let (addr, _seen) = fake_service(replies, None, 0).await;
        let client = client_for(settings(addr, 3, Duration::from_secs(2)));
        let (_stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(Arc::clone(&client).run(stop_rx));
        wait_connected(&client).await;

        let (a, b) = tokio::join!(client.query(5), client.query(5));

        assert!(a.is_some());
        assert!(b.is_some());
    }

    // ============================================================
    // RETRY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_unanswered_query_exhausts_attempts() {
        let (addr, mut seen) = fake_service(HashMap::new(), None, 0).await;
        let client = client_for(settings(addr, 3, Duration::from_millis(50)));
        let (_stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(Arc::clone(&client).run(stop_rx));
        wait_connected(&client).await;

        let result = client.query(9).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(result.is_none());
        let mut queries = 0;
        while let Ok(received) = seen.try_recv() {
            if received.header.command == Command::ConfigQuery.code() {
                assert_eq!(received.header.trans_id, 9);
                queries += 1;
            }
        }
        assert_eq!(queries, 3);
    }

    #[tokio::test]
    async fn test_query_without_connection_returns_none() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let client = client_for(settings(addr, 2, Duration::from_millis(10)));

        assert!(client.query(1).await.is_none());
    }

    // ============================================================
    // HEARTBEAT, NOTICE & RECONNECT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_heartbeat_reports_node_status() {
        let (addr, mut seen) = fake_service(HashMap::new(), None, 0).await;
        let client = client_for(settings(addr, 1, Duration::from_millis(10)));
        let (_stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(Arc::clone(&client).run(stop_rx));

        let first = tokio::time::timeout(Duration::from_secs(5), seen.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.header.command, Command::ConfigHb.code());
        assert_eq!(first.header.dst_type, PeerType::Config.code());
        let body: Value = parse_json(&first.body).unwrap();
        assert_eq!(body["meta_version"], json!(1));
        assert_eq!(body["region_id"], json!(1));
        assert!(body.get("disk_free").is_some());
    }

    #[tokio::test]
    async fn test_push_notice_is_parked_per_site() {
        let notice = json!({"config_version": 8, "client_version": 9});
        let (addr, _seen) = fake_service(HashMap::new(), Some((7, notice)), 0).await;
        let client = client_for(settings(addr, 1, Duration::from_millis(10)));
        let (_stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(Arc::clone(&client).run(stop_rx));

        let mut parked = None;
        for _ in 0..200 {
            parked = client.peek_notice(7);
            if parked.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(parked.map(|n| n.versions().config_version), Some(8));
        assert!(client.peek_notice(8).is_none());
        assert!(client.take_notice(7).is_some());
        assert!(client.take_notice(7).is_none(), "taking consumes the notice");
    }

    #[tokio::test]
    async fn test_reconnects_after_dropped_connection() {
        let mut replies = HashMap::new();
        replies.insert(3, (Duration::from_millis(0), json!({"tag": 3})));
        let (addr, _seen) = fake_service(replies, None, 1).await;
        let client = client_for(settings(addr, 3, Duration::from_secs(1)));
        let (stop_tx, stop_rx) = watch::channel(false);
        let runner = tokio::spawn(Arc::clone(&client).run(stop_rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        wait_connected(&client).await;

        let reply = client.query(3).await;
        stop_tx.send(true).unwrap();

        assert!(reply.is_some());
        tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("client stops on shutdown")
            .unwrap();
    }

    // ============================================================
    // MALFORMED FRAME TESTS
    // ============================================================

    #[test]
    fn test_unparsable_notice_is_a_framing_error() {
        let client = client_for(settings("127.0.0.1:1".parse().unwrap(), 1, Duration::from_millis(10)));
        let garbage = Frame {
            header: reply_header(Command::ConfigInfo, 7),
            body: Bytes::from_static(b"not json"),
        };
        let good = Frame {
            header: reply_header(Command::ConfigInfo, 7),
            body: Bytes::from(json!({"config_version": 2}).to_string()),
        };

        let rejected = client.handle_frame(garbage);
        assert!(matches!(rejected, Err(MetaError::MalformedBody(_))));
        assert!(client.peek_notice(7).is_none());

        client.handle_frame(good).unwrap();
        assert!(client.peek_notice(7).is_some());
    }

    #[tokio::test]
    async fn test_unparsable_query_reply_drops_link_and_redials() {
        // ARRANGE: a service that answers the first connection with a non-object body
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = client_for(settings(addr, 1, Duration::from_millis(10)));
        let (stop_tx, stop_rx) = watch::channel(false);
        let runner = tokio::spawn(Arc::clone(&client).run(stop_rx));

        // ACT
        let (first, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = first.into_split();
        let bad = frame(reply_header(Command::ConfigQueryResp, 3), b"[1, 2]");
        write_frame(&mut writer, &bad).await.unwrap();

        // ASSERT: the client hangs up, then dials again
        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            while read_message(&mut reader).await.is_ok() {}
        })
        .await;
        assert!(closed.is_ok(), "client keeps a link that sent garbage");
        let second = tokio::time::timeout(Duration::from_secs(5), listener.accept()).await;
        assert!(second.is_ok(), "client never reconnected");

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("client stops on shutdown")
            .unwrap();
    }
}
