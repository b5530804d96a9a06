//! Config Service Client Module
//!
//! Keeps one long-lived connection to the config service, which knows for every client site
//! which regions hold its data and which software versions it should run.
//!
//! ## Core Concepts
//! - **Correlated queries**: a query for a site resolves the waiters registered under that
//!   site id and no others.
//! - **Push notices**: unsolicited `CONFIG_INFO` frames are parked under `"<site>_info"` until
//!   the next heartbeat from that site picks them up.
//! - **Self heartbeat**: the node reports its own load on a fixed interval.
//! - **Reconnect**: a dropped connection is re-established with exponential backoff.

pub mod client;
pub mod types;

pub use client::{ConfigClient, ConfigClientSettings, ConfigLookup, LookupFuture, RetryPolicy};
pub use types::{ConfigReply, PeerEndpoint, SiteVersions, UpgradePackage};

#[cfg(test)]
mod tests;
