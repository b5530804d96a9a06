//! Storage Gateway Registry Module
//!
//! Tracks the storage gateways (SGWs) of this region and hands one out for every upload or
//! relayed download.
//!
//! ## Core Concepts
//! - **Groups**: gateways report a group id; all gateways of a group share one free-disk figure.
//! - **Selection**: the group with the most free disk wins, its addresses are used round-robin.
//! - **Liveness**: a gateway that stops heart-beating for longer than the expiry window is
//!   evicted by a background sweeper and marked inactive in the store.
//!
//! ## Submodules
//! - **`types`**: addresses, group entries and selection results.
//! - **`registry`**: the concurrent registry and its sweeper loop.

pub mod registry;
pub mod types;

pub use registry::GatewayRegistry;
pub use types::{GatewayAddr, GatewayReport, Selection};
