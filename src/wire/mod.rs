//! Wire Protocol Module
//!
//! Byte-exact encoding of the fixed-header binary protocol spoken between clients, storage
//! gateways, the config service and sibling metadata nodes. All integers are big-endian.
//!
//! ## Core Concepts
//! - **Header**: every frame starts with a 64-byte header whose `total_size` covers header + body.
//! - **Task Info**: a 591-byte file record followed by a small JSON blob naming the file owner.
//! - **Heartbeats**: fixed-width status bodies sent by clients and storage gateways.
//!
//! ## Submodules
//! - **`types`**: constants, opcodes, peer roles and the record structs.
//! - **`codec`**: pure encode/decode functions, no I/O.
//! - **`reader`**: framing over an async byte stream.
//! - **`lenient`**: serde helpers for ids that arrive as numbers or strings.

pub mod codec;
pub mod lenient;
pub mod reader;
pub mod types;

pub use codec::frame;
pub use reader::{Frame, read_message, write_frame};
pub use types::*;
