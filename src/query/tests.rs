//! Query Module Tests
//!
//! ## Test Scopes
//! - **Request bodies**: lenient id lists and defaults.
//! - **Paging**: `gather_page` against a concatenate-sort-slice reference for every offset,
//!   shallow and deep, with ties and uneven source sizes.
//! - **Degraded sources**: failing sources are skipped, fetch sizes stay bounded.

#[cfg(test)]
mod tests {
    use crate::error::MetaError;
    use crate::query::*;
    use crate::storage::{SortKey, SortSpec};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Mutex;

    /// In-memory source recording every fetch.
    struct VecSource {
        rows: Vec<FileEntry>,
        fetches: Mutex<Vec<(u64, u32)>>,
        fail: bool,
    }

    impl VecSource {
        fn new(mut rows: Vec<FileEntry>, sort: &SortSpec) -> Self {
            rows.sort_by(|a, b| sort.compare(a, b));
            Self {
                rows,
                fetches: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                rows: Vec::new(),
                fetches: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    impl RowSource for VecSource {
        fn name(&self) -> String {
            "vec".to_string()
        }

        fn fetch(&self, offset: u64, limit: u32) -> RowsFuture<'_> {
            self.fetches.lock().unwrap().push((offset, limit));
            Box::pin(async move {
                if self.fail {
                    return Err(MetaError::PeerUnreachable {
                        peer: "vec".to_string(),
                        reason: "down".to_string(),
                    });
                }
                Ok(self
                    .rows
                    .iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect())
            })
        }
    }

    fn entry(region_id: u32, n: u32, timestamp: u32) -> FileEntry {
        FileEntry {
            site_id: 7,
            app_id: 1,
            file_name: format!("r{}-f{:04}", region_id, n),
            region_id,
            user_id: n % 3,
            customer_id: "c".to_string(),
            timestamp,
            sgw_ip: 0,
            proxy_ip: 0,
            sgw_port: 0,
            proxy_port: 0,
            sgw_id: 0,
            proxy_id: 0,
        }
    }

    /// Disjoint rows per region with heavily repeated timestamps to exercise ties.
    fn random_rows(rng: &mut StdRng, region_id: u32, len: u32) -> Vec<FileEntry> {
        (0..len)
            .map(|n| entry(region_id, n, rng.gen_range(0..20)))
            .collect()
    }

    fn naive_page(sources: &[&VecSource], sort: &SortSpec, offset: u64, count: u32) -> Vec<FileEntry> {
        let mut all: Vec<FileEntry> = sources.iter().flat_map(|s| s.rows.clone()).collect();
        all.sort_by(|a, b| sort.compare(a, b));
        all.into_iter()
            .skip(offset as usize)
            .take(count as usize)
            .collect()
    }

    // ============================================================
    // REQUEST BODY TESTS
    // ============================================================

    #[test]
    fn test_file_query_parses_client_body() {
        let body = r#"{"site_id":[7],"app_id":["1",2],"user_id":[3],"customer_id":[4,"x"],
                      "timestamp":[100,200],"order_by":["timestamp"],"desc":true}"#;

        let query: FileQuery = serde_json::from_str(body).unwrap();

        assert_eq!(query.app_id, vec![1, 2]);
        assert_eq!(query.customer_id, vec!["4".to_string(), "x".to_string()]);
        let filter = query.filter();
        assert_eq!(filter.time_range, (100, 200));
        assert_eq!(query.sort().keys, vec![SortKey::Timestamp]);
        assert!(query.sort().descending);
    }

    #[test]
    fn test_file_query_rejects_unknown_sort_key() {
        let body = r#"{"site_id":[7],"order_by":["colour"]}"#;

        assert!(serde_json::from_str::<FileQuery>(body).is_err());
    }

    #[test]
    fn test_entry_to_task_keeps_owner_and_addresses() {
        let mut row = entry(2, 1, 50);
        row.sgw_ip = 10;
        row.proxy_port = 9000;

        let task = row.to_task();

        assert_eq!(task.info.file_name.text(), "r2-f0001");
        assert_eq!(task.info.region_id, 2);
        assert_eq!(task.info.sgw_ip, 10);
        assert_eq!(task.info.proxy_port, 9000);
        assert_eq!(task.info.file_len, 0);
        assert_eq!(task.owner.user_id, 1);
    }

    // ============================================================
    // PAGING TESTS
    // ============================================================

    #[tokio::test]
    async fn test_gather_matches_naive_for_every_offset() {
        let mut rng = StdRng::seed_from_u64(7);
        let sorts = [
            SortSpec { keys: vec![SortKey::Timestamp], descending: false },
            SortSpec { keys: vec![SortKey::Timestamp, SortKey::UserId], descending: true },
            SortSpec::default(),
        ];

        for sort in &sorts {
            let local = VecSource::new(random_rows(&mut rng, 1, 23), sort);
            let peer_a = VecSource::new(random_rows(&mut rng, 2, 41), sort);
            let peer_b = VecSource::new(random_rows(&mut rng, 3, 5), sort);
            let empty = VecSource::new(Vec::new(), sort);
            let all = [&local, &peer_a, &peer_b, &empty];
            let sources: Vec<&dyn RowSource> = all.iter().map(|s| *s as &dyn RowSource).collect();
            let total = 23 + 41 + 5;

            for count in [1u32, 3, 10, 25] {
                for offset in 0..=(total + 3) as u64 {
                    let page = gather_page(&sources, sort, offset, count).await;
                    let expected = naive_page(&all, sort, offset, count);
                    assert_eq!(
                        page, expected,
                        "sort {:?} offset {} count {}",
                        sort, offset, count
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn test_single_source_fetches_page_directly() {
        let sort = SortSpec::default();
        let rows: Vec<FileEntry> = (0..30).map(|n| entry(1, n, n)).collect();
        let local = VecSource::new(rows, &sort);

        let page = gather_page(&[&local], &sort, 20, 5).await;

        assert_eq!(page.len(), 5);
        assert_eq!(page[0].file_name, "r1-f0020");
        assert_eq!(*local.fetches.lock().unwrap(), vec![(20, 5)]);
    }

    #[tokio::test]
    async fn test_deep_page_never_fetches_more_than_count() {
        let sort = SortSpec { keys: vec![SortKey::Timestamp], descending: false };
        let local = VecSource::new((0..100).map(|n| entry(1, n, n * 2)).collect(), &sort);
        let peer = VecSource::new((0..100).map(|n| entry(2, n, n * 2 + 1)).collect(), &sort);

        let page = gather_page(&[&local, &peer], &sort, 95, 10).await;

        let stamps: Vec<u32> = page.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, (95..105).collect::<Vec<u32>>());
        for source in [&local, &peer] {
            let fetches = source.fetches.lock().unwrap();
            assert!(fetches.iter().all(|(_, limit)| *limit <= 10));
            assert!(fetches.len() <= 1 + 10, "one initial fetch plus at most one per round");
        }
    }

    #[tokio::test]
    async fn test_oversized_count_returns_every_row() {
        let sort = SortSpec { keys: vec![SortKey::Timestamp], descending: false };
        let local = VecSource::new((0..5).map(|n| entry(1, n, n * 2)).collect(), &sort);
        let peer = VecSource::new((0..5).map(|n| entry(2, n, n * 2 + 1)).collect(), &sort);

        let whole = gather_page(&[&local, &peer], &sort, 0, u32::MAX).await;
        let tail = gather_page(&[&local, &peer], &sort, 7, u32::MAX).await;

        let stamps: Vec<u32> = whole.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, (0..10).collect::<Vec<u32>>());
        let stamps: Vec<u32> = tail.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn test_zero_count_is_empty() {
        let sort = SortSpec::default();
        let local = VecSource::new(vec![entry(1, 1, 1)], &sort);
        let peer = VecSource::new(vec![entry(2, 1, 1)], &sort);

        assert!(gather_page(&[&local, &peer], &sort, 0, 0).await.is_empty());
        assert!(local.fetches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_peer_is_skipped() {
        let sort = SortSpec { keys: vec![SortKey::Timestamp], descending: false };
        let local = VecSource::new((0..8).map(|n| entry(1, n, n)).collect(), &sort);
        let broken = VecSource::failing();

        let page = gather_page(&[&local, &broken], &sort, 2, 4).await;

        let stamps: Vec<u32> = page.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![2, 3, 4, 5]);
        assert_eq!(broken.fetches.lock().unwrap().len(), 1, "not retried after failing");
    }
}
