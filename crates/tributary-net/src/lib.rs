//! Multi-source acquisition engine.
//!
//! This crate owns everything between "a logical fetch" and "bytes on
//! the wire", under partial and adversarial failure:
//!
//! - [`transport`] - single outbound HTTP request with a hard
//!   wall-clock timeout and injectable direct-vs-proxied routing
//! - [`mirrors`] - fallback resolver that walks a shuffled list of
//!   interchangeable endpoint mirrors, with per-mirror retry budget
//!   and content validation
//! - [`relay`] - concurrent relay fan-out client: same query to every
//!   relay, streamed responses deduplicated by event id and merged
//!   under a global deadline
//! - [`race`] - first-non-empty strategy racing
//!
//! # Failure model
//!
//! Individual endpoint failures are recovered locally and never
//! surface past their component. Only full exhaustion (all mirrors,
//! all relays) is visible to the caller, and for relays even that is
//! reported as an empty result rather than an error.

pub mod error;
pub mod mirrors;
pub mod race;
pub mod relay;
pub mod transport;

pub use error::{NetError, Result};
pub use mirrors::{FallbackOptions, FallbackResolver};
pub use race::first_non_empty;
pub use relay::{query_relays, RelayClient};
pub use transport::{ProxyPolicy, Transport};
