//! Request Handlers
//!
//! One async function per opcode served on the listening port. Handlers are pure with
//! respect to the socket: they take the decoded header and body and return an [`Outcome`]
//! for the connection loop to act on.
//!
//! ## Core Concepts
//! - **Node Context**: the gateway registry, catalog store, config lookup and peer
//!   transport shared by every connection.
//! - **Scatter-Gather**: counts, pages and deletes reach sibling regions listed by the
//!   config service for the requesting site.
//!
//! ## Submodules
//! - **`dispatch`**: opcode routing.
//! - **`heartbeat`**, **`upload`**, **`query`**, **`delete`**, **`upgrade`**: the handlers.

pub mod context;
pub mod delete;
pub mod dispatch;
pub mod heartbeat;
pub mod query;
pub mod upgrade;
pub mod upload;

pub use context::{NodeContext, NodeIdentity, Outcome};
pub use dispatch::dispatch;
