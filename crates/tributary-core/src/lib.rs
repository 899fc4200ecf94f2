//! Shared data model for the Tributary feed aggregator.
//!
//! This crate defines the types that flow between the acquisition
//! engine and its callers:
//!
//! - [`post`] - The unified post record that every network adapter
//!   maps into, plus the source taxonomy and category filtering
//! - [`event`] - Relay protocol event and subscription filter types
//!
//! All types here are constructed fresh per fetch cycle and never
//! mutated after creation. Nothing in this crate performs I/O.

pub mod event;
pub mod post;

pub use event::{Filter, RelayEvent, KIND_METADATA, KIND_NOTE, KIND_PICTURE, KIND_VIDEO};
pub use post::{
    filter_by_category, placeholder_avatar, Author, Category, MediaItem, MediaKind, Source,
    UnifiedPost, MAX_MEDIA_ITEMS,
};
