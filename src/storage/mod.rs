//! Storage Module
//!
//! The persistence seam of the node. Handlers only ever see the [`MetadataStore`] trait; the
//! node ships with [`MemoryStore`], a `DashMap`-backed implementation.
//!
//! ## Record Kinds
//! - **Client / gateway status**: one row per heartbeat, bounded retention.
//! - **Gateway static**: one row per gateway, flipped inactive on expiry.
//! - **Node status**: this node's own metric samples.
//! - **File metadata**: the catalog queried, paged and deleted by clients.

pub mod memory;
pub mod store;
pub mod types;

pub use memory::MemoryStore;
pub use store::MetadataStore;
pub use types::*;
