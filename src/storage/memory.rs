use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::store::MetadataStore;
use super::types::*;
use crate::error::Result;

/// Status tables keep only the most recent rows.
const STATUS_ROW_LIMIT: u64 = 10_000;

/// Append-only table with a sliding retention window.
struct StatusTable<T> {
    rows: DashMap<u64, T>,
    next_id: AtomicU64,
}

impl<T: Clone> StatusTable<T> {
    fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    fn push(&self, row: T) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.rows.insert(id, row);
        if id >= STATUS_ROW_LIMIT {
            self.rows.remove(&(id - STATUS_ROW_LIMIT));
        }
    }

    fn latest(&self) -> Option<T> {
        let last = self.next_id.load(Ordering::Relaxed).checked_sub(1)?;
        self.rows.get(&last).map(|r| r.value().clone())
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

/// In-process store backing a single node.
pub struct MemoryStore {
    files: DashMap<u64, FileMetadata>,
    next_file_id: AtomicU64,
    client_status: StatusTable<ClientStatus>,
    gateway_status: StatusTable<GatewayStatus>,
    node_status: StatusTable<NodeStatus>,
    gateway_static: DashMap<u32, GatewayStatic>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            files: DashMap::new(),
            next_file_id: AtomicU64::new(0),
            client_status: StatusTable::new(),
            gateway_status: StatusTable::new(),
            node_status: StatusTable::new(),
            gateway_static: DashMap::new(),
        }
    }

    pub fn gateway_static(&self, sgw_id: u32) -> Option<GatewayStatic> {
        self.gateway_static.get(&sgw_id).map(|r| r.value().clone())
    }

    pub fn latest_client_status(&self) -> Option<ClientStatus> {
        self.client_status.latest()
    }

    pub fn latest_gateway_status(&self) -> Option<GatewayStatus> {
        self.gateway_status.latest()
    }

    pub fn latest_node_status(&self) -> Option<NodeStatus> {
        self.node_status.latest()
    }

    pub fn node_status_count(&self) -> usize {
        self.node_status.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn matching(&self, filter: &FileFilter) -> Vec<FileMetadata> {
        self.files
            .iter()
            .filter(|row| filter.matches(row.value()))
            .map(|row| row.value().clone())
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore for MemoryStore {
    fn insert_client_status(&self, status: ClientStatus) -> Result<()> {
        self.client_status.push(status);
        Ok(())
    }

    fn insert_gateway_status(&self, status: GatewayStatus) -> Result<()> {
        self.gateway_status.push(status);
        Ok(())
    }

    fn upsert_gateway_static(&self, record: GatewayStatic) -> Result<()> {
        self.gateway_static.insert(
            record.sgw_id,
            GatewayStatic {
                active: true,
                ..record
            },
        );
        Ok(())
    }

    fn set_gateway_active(&self, sgw_id: u32, active: bool) -> Result<bool> {
        match self.gateway_static.get_mut(&sgw_id) {
            Some(mut row) => {
                row.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert_node_status(&self, status: NodeStatus) -> Result<()> {
        self.node_status.push(status);
        Ok(())
    }

    fn insert_file(&self, record: FileMetadata) -> Result<()> {
        let id = self.next_file_id.fetch_add(1, Ordering::Relaxed);
        self.files.insert(id, record);
        Ok(())
    }

    fn count_files(&self, filter: &FileFilter) -> Result<u64> {
        Ok(self
            .files
            .iter()
            .filter(|row| filter.matches(row.value()))
            .count() as u64)
    }

    fn query_files(
        &self,
        filter: &FileFilter,
        sort: &SortSpec,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<FileMetadata>> {
        let mut rows = self.matching(filter);
        rows.sort_by(|a, b| sort.compare(a, b));
        Ok(rows
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .collect())
    }

    fn delete_files(&self, key: &FileKey) -> Result<usize> {
        let doomed: Vec<u64> = self
            .files
            .iter()
            .filter(|row| key.matches(row.value()))
            .map(|row| *row.key())
            .collect();

        Ok(doomed
            .into_iter()
            .filter(|id| self.files.remove(id).is_some())
            .count())
    }
}
