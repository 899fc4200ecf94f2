//! Source adapters.
//!
//! Each adapter translates one upstream service into the canonical
//! [`UnifiedPost`] shape. The contract is deliberately narrow: a
//! topic-scoped fetch that returns an empty vector when the source
//! has nothing, and errors only on genuine failure. Everything else
//! (category filtering, merging, timeouts) belongs to the
//! orchestrator.

use async_trait::async_trait;
use std::sync::Arc;

use tributary_core::{Category, Source, UnifiedPost};

use crate::config::FeedConfig;
use crate::error::Result;
use crate::profiles::ProfileCache;

pub mod bluesky;
pub mod lemmy;
pub mod mastodon;
pub mod misskey;
pub mod nitter;
pub mod nostr;
pub mod nostr_media;
pub mod reddit;
pub mod rss;

pub use bluesky::BlueskyAdapter;
pub use lemmy::LemmyAdapter;
pub use mastodon::MastodonAdapter;
pub use misskey::MisskeyAdapter;
pub use nitter::NitterAdapter;
pub use nostr::NostrAdapter;
pub use nostr_media::{NostrPhotosAdapter, NostrVideosAdapter};
pub use reddit::RedditAdapter;
pub use rss::RssAdapter;

/// Flatten HTML into display text: tags dropped, entities for the
/// common ampersand escapes resolved. Good enough for status bodies
/// and feed summaries; not a sanitizer.
pub(crate) fn strip_html(input: &str) -> String {
    static TAG: std::sync::LazyLock<regex::Regex> =
        std::sync::LazyLock::new(|| regex::Regex::new(r"<[^>]*>").unwrap());
    let text = TAG.replace_all(input, " ");
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Per-fetch knobs passed through to every adapter.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Bypass caches and hit upstreams even for fresh data.
    pub force_refresh: bool,
    /// Requested content category, for adapters that can narrow the
    /// upstream query. Final filtering still happens centrally.
    pub category: Category,
}

/// A single upstream source of posts.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which source this adapter feeds.
    fn source(&self) -> Source;

    /// Human-readable description for `--list-sources`.
    fn description(&self) -> &'static str;

    /// Whether this adapter can produce posts for a category. The
    /// orchestrator skips adapters that can't.
    fn supports(&self, category: Category) -> bool {
        let _ = category;
        true
    }

    /// Fetch posts, optionally scoped to a topic.
    ///
    /// "Source has nothing" is `Ok(vec![])`, never an error.
    async fn fetch_posts(
        &self,
        topic: Option<&str>,
        options: &FetchOptions,
    ) -> Result<Vec<UnifiedPost>>;
}

/// Build the full adapter set from configuration. The relay-backed
/// adapters share one profile cache so a pubkey resolved for the text
/// feed is reused by the media feeds.
pub fn default_adapters(config: &FeedConfig) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let profiles = Arc::new(ProfileCache::with_ttl(
        config.relays.clone(),
        config.profile_ttl,
        crate::profiles::DEFAULT_PROFILE_CAPACITY,
    ));
    let transport = config.transport()?;

    Ok(vec![
        Arc::new(NostrAdapter::new(config, Arc::clone(&profiles), transport.clone())),
        Arc::new(NostrPhotosAdapter::new(config, Arc::clone(&profiles), transport.clone())),
        Arc::new(NostrVideosAdapter::new(config, Arc::clone(&profiles), transport.clone())),
        Arc::new(MastodonAdapter::new(config, transport.clone())),
        Arc::new(BlueskyAdapter::new(transport.clone())),
        Arc::new(MisskeyAdapter::new(config, transport.clone())),
        Arc::new(RedditAdapter::new(config, transport.clone())),
        Arc::new(LemmyAdapter::new(config, transport.clone())),
        Arc::new(NitterAdapter::new(config, transport.clone())),
        Arc::new(RssAdapter::new(config, transport)),
    ])
}
