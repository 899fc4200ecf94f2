//! Multi-source feed aggregation.
//!
//! Ties the acquisition layer together: a set of source adapters that
//! each turn one upstream network into [`UnifiedPost`]s, a profile
//! cache for relay-native author identities, and an orchestrator that
//! fans a request out to every adapter and streams merged snapshots.
//!
//! [`UnifiedPost`]: tributary_core::UnifiedPost

pub mod adapters;
pub mod config;
pub mod error;
pub mod media;
pub mod orchestrator;
pub mod profiles;

pub use adapters::{default_adapters, FetchOptions, SourceAdapter};
pub use config::FeedConfig;
pub use error::{FeedError, Result};
pub use orchestrator::{
    collect_feed, FeedOrchestrator, FeedRequest, FeedSummary, FeedUpdate,
};
pub use profiles::{ActorProfile, ProfileCache};
