//! Relay fan-out client.
//!
//! Opens ephemeral connections to a set of independent relay nodes,
//! issues the same subscription to all of them, and merges the
//! streamed responses under a global deadline.
//!
//! - [`wire`] - REQ/EVENT/EOSE frame encoding and parsing
//! - [`client`] - the concurrent query client

pub mod client;
pub mod wire;

pub use client::{query_relays, RelayClient};
pub use wire::RelayMessage;
