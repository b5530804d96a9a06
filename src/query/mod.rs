//! Query Module
//!
//! Filter/sort request bodies, the row format shared between regions, and the scatter-gather
//! pager that assembles one globally sorted page from the local store and every sibling
//! region holding rows for the requesting site.
//!
//! ## Submodules
//! - **`types`**: `FileQuery` request bodies and `FileEntry` rows.
//! - **`gather`**: the `RowSource` seam and the paging algorithm.
//! - **`sources`**: row sources backed by the local store and by peer nodes.

pub mod gather;
pub mod sources;
pub mod types;

pub use gather::{RowSource, RowsFuture, gather_page};
pub use sources::{LocalSource, PeerSource};
pub use types::{FileEntry, FileQuery, REMOTE_ROWS_KEY, RemoteRows};

#[cfg(test)]
mod tests;
