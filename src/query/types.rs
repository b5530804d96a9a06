use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::gateway::Selection;
use crate::storage::{FileFilter, FileMetadata, SortKey, SortSpec, SortValue, Sortable};
use crate::wire::lenient;
use crate::wire::{FileOwner, FixedBytes, TaskInfo, TaskRecord};

fn full_range() -> (u32, u32) {
    (0, u32::MAX)
}

/// JSON body of count and data queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileQuery {
    #[serde(default, deserialize_with = "lenient::u32_list_from_any")]
    pub site_id: Vec<u32>,
    #[serde(default, deserialize_with = "lenient::u32_list_from_any")]
    pub app_id: Vec<u32>,
    #[serde(default, deserialize_with = "lenient::u32_list_from_any")]
    pub user_id: Vec<u32>,
    #[serde(default, deserialize_with = "lenient::string_list_from_any")]
    pub customer_id: Vec<String>,
    #[serde(default = "full_range")]
    pub timestamp: (u32, u32),
    #[serde(default)]
    pub order_by: Vec<SortKey>,
    #[serde(default)]
    pub desc: bool,
}

impl FileQuery {
    pub fn filter(&self) -> FileFilter {
        FileFilter {
            site_ids: self.site_id.clone(),
            app_ids: self.app_id.clone(),
            user_ids: self.user_id.clone(),
            customer_ids: self.customer_id.clone(),
            time_range: self.timestamp,
        }
    }

    pub fn sort(&self) -> SortSpec {
        SortSpec {
            keys: self.order_by.clone(),
            descending: self.desc,
        }
    }
}

/// One catalog row as exchanged between metadata nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub site_id: u32,
    pub app_id: u32,
    pub file_name: String,
    pub region_id: u32,
    pub user_id: u32,
    #[serde(deserialize_with = "lenient::string_from_any")]
    pub customer_id: String,
    pub timestamp: u32,
    pub sgw_ip: u32,
    pub proxy_ip: u32,
    pub sgw_port: u16,
    pub proxy_port: u16,
    pub sgw_id: u32,
    pub proxy_id: u32,
}

/// Key the answering node files its rows under in `REMOTE_QUERY_DATA_RESP`.
pub const REMOTE_ROWS_KEY: &str = "site_id";

/// Body of `REMOTE_QUERY_DATA_RESP`. Readers flatten every key.
pub type RemoteRows = BTreeMap<String, Vec<FileEntry>>;

impl FileEntry {
    /// Row as served by the node holding it; both gateway slots point at its own gateway.
    pub fn from_row(row: &FileMetadata, gateway: Option<&Selection>) -> Self {
        let (ip, port, id) = gateway
            .map(|g| (g.addr.ip, g.addr.port, g.addr.gateway_id))
            .unwrap_or_default();
        Self {
            site_id: row.site_id,
            app_id: row.app_id,
            file_name: row.file_name.clone(),
            region_id: row.region_id,
            user_id: row.user_id,
            customer_id: row.customer_id.clone(),
            timestamp: row.timestamp,
            sgw_ip: ip,
            proxy_ip: ip,
            sgw_port: port,
            proxy_port: port,
            sgw_id: id,
            proxy_id: id,
        }
    }

    pub fn set_proxy(&mut self, gateway: &Selection) {
        self.proxy_ip = gateway.addr.ip;
        self.proxy_port = gateway.addr.port;
        self.proxy_id = gateway.addr.gateway_id;
    }

    pub fn to_task(&self) -> TaskRecord {
        TaskRecord {
            info: TaskInfo {
                region_id: self.region_id as u16,
                site_id: self.site_id,
                app_id: self.app_id,
                timestamp: self.timestamp,
                sgw_port: self.sgw_port,
                proxy_port: self.proxy_port,
                sgw_ip: self.sgw_ip,
                proxy_ip: self.proxy_ip,
                sgw_id: self.sgw_id,
                proxy_id: self.proxy_id,
                file_name: FixedBytes::from_text(&self.file_name),
                ..Default::default()
            },
            owner: FileOwner {
                user_id: self.user_id,
                customer_id: self.customer_id.clone(),
            },
        }
    }
}

impl Sortable for FileEntry {
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
