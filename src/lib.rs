//! Regional Metadata Node Library
//!
//! This library crate defines the modules that make up one regional metadata server.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`wire`**: the fixed-header binary protocol, byte-exact codecs and async framing.
//! - **`gateway`**: the registry of live storage gateways, grouped and selected by free disk.
//! - **`config_client`**: the long-lived link to the config service, with per-site lookups,
//!   push notices and the node's own heartbeat.
//! - **`peer`**: one-shot request/response exchanges with sibling metadata nodes.
//! - **`query`**: request bodies and the scatter-gather pager merging sorted sources.
//! - **`handlers`**: one async handler per opcode plus the dispatcher.
//! - **`storage`**: the persistence seam for status rows and the file catalog.
//! - **`server`**, **`status`**, **`metrics`**, **`config`**, **`error`**: runtime plumbing.

pub mod config;
pub mod config_client;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod peer;
pub mod query;
pub mod server;
pub mod status;
pub mod storage;
pub mod wire;

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
