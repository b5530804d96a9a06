use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::metrics::NodeMetrics;
use crate::wire::{ClientHeartbeat, GatewayHeartbeat};

/// One client heartbeat as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    pub heartbeat: ClientHeartbeat,
    /// Unix seconds when this node received it.
    pub received_at: u64,
}

/// One gateway heartbeat as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayStatus {
    pub sgw_id: u32,
    pub heartbeat: GatewayHeartbeat,
    pub received_at: u64,
}

/// Static registration row of a gateway, flipped inactive when it expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayStatic {
    pub sgw_id: u32,
    pub region_id: u32,
    pub system_id: u32,
    pub group_id: u32,
    pub ip: u32,
    pub port: u16,
    pub version: u32,
    pub active: bool,
}

/// This node's own periodic status sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub region_id: u32,
    pub system_id: u32,
    pub meta_version: u32,
    #[serde(flatten)]
    pub metrics: NodeMetrics,
    pub timestamp: u64,
}

/// Catalog row for one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub site_id: u32,
    pub app_id: u32,
    pub file_name: String,
    pub region_id: u32,
    pub system_id: u32,
    pub group_id: u32,
    pub user_id: u32,
    pub customer_id: String,
    pub timestamp: u32,
}

/// Exact-match key used by deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileKey {
    pub site_id: u32,
    pub app_id: u32,
    pub file_name: String,
    pub user_id: u32,
    pub customer_id: String,
    pub timestamp: u32,
}

impl FileKey {
    pub fn matches(&self, row: &FileMetadata) -> bool {
        self.site_id == row.site_id
            && self.app_id == row.app_id
            && self.file_name == row.file_name
            && self.user_id == row.user_id
            && self.customer_id == row.customer_id
            && self.timestamp == row.timestamp
    }
}

/// Catalog filter. Every list is a membership test; an empty list matches nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileFilter {
    pub site_ids: Vec<u32>,
    pub app_ids: Vec<u32>,
    pub user_ids: Vec<u32>,
    pub customer_ids: Vec<String>,
    /// Inclusive `[start, end]`.
    pub time_range: (u32, u32),
}

impl FileFilter {
    pub fn matches(&self, row: &FileMetadata) -> bool {
        self.site_ids.contains(&row.site_id)
            && self.app_ids.contains(&row.app_id)
            && self.user_ids.contains(&row.user_id)
            && self.customer_ids.iter().any(|c| *c == row.customer_id)
            && (self.time_range.0..=self.time_range.1).contains(&row.timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    SiteId,
    AppId,
    FileName,
    RegionId,
    UserId,
    CustomerId,
    Timestamp,
}

impl SortKey {
    /// Tiebreak order applied after the requested keys.
    pub const IDENTITY: [SortKey; 7] = [
        SortKey::SiteId,
        SortKey::AppId,
        SortKey::FileName,
        SortKey::UserId,
        SortKey::CustomerId,
        SortKey::Timestamp,
        SortKey::RegionId,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortValue<'a> {
    Number(u32),
    Text(&'a str),
}

/// Anything that can be ordered by a [`SortSpec`].
pub trait Sortable {
    fn sort_value(&self, key: SortKey) -> SortValue<'_>;
}

impl Sortable for FileMetadata {
    fn sort_value(&self, key: SortKey) -> SortValue<'_> {
        match key {
            SortKey::SiteId => SortValue::Number(self.site_id),
            SortKey::AppId => SortValue::Number(self.app_id),
            SortKey::FileName => SortValue::Text(&self.file_name),
            SortKey::RegionId => SortValue::Number(self.region_id),
            SortKey::UserId => SortValue::Number(self.user_id),
            SortKey::CustomerId => SortValue::Text(&self.customer_id),
            SortKey::Timestamp => SortValue::Number(self.timestamp),
        }
    }
}

/// Requested ordering plus a fixed identity tiebreak, giving a total order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortSpec {
    pub keys: Vec<SortKey>,
    pub descending: bool,
}

impl SortSpec {
    pub fn compare<T: Sortable>(&self, a: &T, b: &T) -> Ordering {
        for key in &self.keys {
            let ord = a.sort_value(*key).cmp(&b.sort_value(*key));
            let ord = if self.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        SortKey::IDENTITY
            .iter()
            .map(|key| a.sort_value(*key).cmp(&b.sort_value(*key)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}
