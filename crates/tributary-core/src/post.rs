//! The unified post record and source taxonomy.
//!
//! Every network adapter maps its wire format into [`UnifiedPost`].
//! The `external_url` field is the cross-cutting identity used by
//! downstream collaborators (bookmarks, likes); `id` + `source` is
//! only unique within one adapter invocation.

use serde::{Deserialize, Serialize};

/// Maximum number of media items carried per post. Pathological feeds
/// (galleries, image floods) are truncated to this bound.
pub const MAX_MEDIA_ITEMS: usize = 4;

/// The closed set of networks an adapter can tag its posts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Mastodon,
    Nostr,
    NostrPhotos,
    NostrVideos,
    Bluesky,
    Misskey,
    Reddit,
    Lemmy,
    Twitter,
    Rss,
}

impl Source {
    /// Stable lowercase name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Mastodon => "mastodon",
            Source::Nostr => "nostr",
            Source::NostrPhotos => "nostr-photos",
            Source::NostrVideos => "nostr-videos",
            Source::Bluesky => "bluesky",
            Source::Misskey => "misskey",
            Source::Reddit => "reddit",
            Source::Lemmy => "lemmy",
            Source::Twitter => "twitter",
            Source::Rss => "rss",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post author as displayed in the feed.
///
/// `avatar_url` is always populated: adapters synthesize a
/// deterministic placeholder via [`placeholder_avatar`] when the
/// source provides none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub handle: String,
    pub avatar_url: String,
    pub profile_url: String,
}

/// Kind of an attached media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Embed,
}

/// A single media attachment, in source-declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

impl MediaItem {
    pub fn image(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            kind: MediaKind::Image,
            preview_url: Some(url.clone()),
            url,
        }
    }

    pub fn video(url: impl Into<String>, preview_url: Option<String>) -> Self {
        Self {
            kind: MediaKind::Video,
            url: url.into(),
            preview_url,
        }
    }
}

/// The canonical post record produced by every adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedPost {
    /// Source-scoped unique identifier.
    pub id: String,
    /// Which network produced this post.
    pub source: Source,
    pub author: Author,
    /// Markup content (HTML subset). Sanitization happens downstream.
    pub content: String,
    /// Attached media, capped at [`MAX_MEDIA_ITEMS`].
    pub media: Vec<MediaItem>,
    /// Canonical external URL - the identity key used by collaborators.
    pub external_url: String,
    /// Milliseconds since epoch. The universal sort key, descending.
    pub timestamp: i64,
    /// Opaque passthrough of the original source record. Never rendered.
    #[serde(skip_serializing)]
    pub raw: serde_json::Value,
}

/// Deterministic placeholder avatar for authors without one.
///
/// The same seed always yields the same URL, so a pubkey or post id
/// renders consistently across fetches.
pub fn placeholder_avatar(seed: &str) -> String {
    format!("https://api.dicebear.com/7.x/bottts/svg?seed={seed}")
}

/// Feed category requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Text,
    Media,
    All,
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Category::Text),
            "media" => Ok(Category::Media),
            "all" => Ok(Category::All),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Apply the category filter policy uniformly, post-fetch.
///
/// `Text` drops any post carrying media; `Media` drops any post
/// without media; `All` keeps everything. Idempotent.
pub fn filter_by_category(posts: Vec<UnifiedPost>, category: Category) -> Vec<UnifiedPost> {
    match category {
        Category::All => posts,
        Category::Text => posts.into_iter().filter(|p| p.media.is_empty()).collect(),
        Category::Media => posts.into_iter().filter(|p| !p.media.is_empty()).collect(),
    }
}
