//! Relay protocol event and subscription filter types.
//!
//! These mirror the wire JSON exactly: an event is immutable once
//! received, content-addressed by `id`, and two relays may
//! legitimately deliver the same `id`.

use serde::{Deserialize, Serialize};

/// Profile metadata events (the identity-resolution kind).
pub const KIND_METADATA: u16 = 0;
/// Short text notes.
pub const KIND_NOTE: u16 = 1;
/// Picture-first posts (Olas-style photo feeds).
pub const KIND_PICTURE: u16 = 20;
/// Short vertical video posts (DiVine-style video feeds).
pub const KIND_VIDEO: u16 = 34236;

/// A single event as delivered by a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    /// Content-addressed event id (hex). Globally unique.
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Unix timestamp in seconds.
    pub created_at: u64,
    /// Event kind tag.
    pub kind: u16,
    /// Nested tag lists, e.g. `[["t", "rust"], ["imeta", "url https://..."]]`.
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sig: String,
}

impl RelayEvent {
    /// First value of the first tag with the given name, if any.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }
}

/// Subscription filter sent to relays in a REQ frame.
///
/// Every field is optional and omitted from the wire form when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    /// Hashtag filter, serialized as `"#t"` per the tag-filter convention.
    #[serde(rename = "#t", skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u16>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn authors(mut self, authors: impl IntoIterator<Item = String>) -> Self {
        self.authors = Some(authors.into_iter().collect());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn hashtag(mut self, tag: impl Into<String>) -> Self {
        self.hashtags
            .get_or_insert_with(Vec::new)
            .push(tag.into());
        self
    }
}
