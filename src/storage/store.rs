use super::types::*;
use crate::error::Result;

/// Persistence seam for status rows and the file catalog.
///
/// Each call is one logical transaction. Implementations must be safe to share across
/// connection tasks.
pub trait MetadataStore: Send + Sync {
    fn insert_client_status(&self, status: ClientStatus) -> Result<()>;

    fn insert_gateway_status(&self, status: GatewayStatus) -> Result<()>;

    /// Inserts the row, or refreshes it and marks it active when it already exists.
    fn upsert_gateway_static(&self, record: GatewayStatic) -> Result<()>;

    /// Returns false when no such gateway row exists.
    fn set_gateway_active(&self, sgw_id: u32, active: bool) -> Result<bool>;

    fn insert_node_status(&self, status: NodeStatus) -> Result<()>;

    fn insert_file(&self, record: FileMetadata) -> Result<()>;

    fn count_files(&self, filter: &FileFilter) -> Result<u64>;

    /// Rows matching `filter`, ordered by `sort`, sliced to `[offset, offset + limit)`.
    fn query_files(
        &self,
        filter: &FileFilter,
        sort: &SortSpec,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<FileMetadata>>;

    /// Deletes rows matching `key` exactly and returns how many went away.
    fn delete_files(&self, key: &FileKey) -> Result<usize>;
}
