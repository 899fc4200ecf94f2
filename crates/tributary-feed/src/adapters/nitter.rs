//! Twitter adapter, via Nitter mirrors.
//!
//! No mirror is dependable, and a "healthy" mirror can still serve a
//! rate-limit or bot-protection page with HTTP 200. The fallback
//! resolver shuffles the mirror list and a content validator rejects
//! block pages so the walk moves on to the next mirror.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use tributary_core::{placeholder_avatar, Author, MediaItem, Source, UnifiedPost};
use tributary_net::{FallbackOptions, FallbackResolver, Transport};

use crate::adapters::{strip_html, FetchOptions, SourceAdapter};
use crate::config::FeedConfig;
use crate::error::{FeedError, Result};

/// Search query used when no topic is given.
const DEFAULT_QUERY: &str = "news";

static INLINE_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img[^>]+src="([^"]+)""#).unwrap()
});

/// Markers of mirror block pages served with a 200 status.
const BLOCK_MARKERS: &[&str] = &["whitelisted", "Verify your request", "bot protection"];

/// Accept only a real RSS document that is not a block page.
pub(crate) fn looks_like_tweet_feed(body: &str) -> bool {
    let is_rss = body.contains("<rss") || body.contains("<channel");
    is_rss && !BLOCK_MARKERS.iter().any(|marker| body.contains(marker))
}

pub struct NitterAdapter {
    mirrors: Vec<String>,
    resolver: FallbackResolver,
}

impl NitterAdapter {
    pub fn new(config: &FeedConfig, transport: Transport) -> Self {
        Self {
            mirrors: config.nitter_mirrors.clone(),
            resolver: FallbackResolver::new(transport),
        }
    }
}

fn convert(entry: feed_rs::model::Entry, query: &str) -> Option<UnifiedPost> {
    let link = entry.links.first()?.href.clone();
    let timestamp = entry
        .published
        .or(entry.updated)
        .map(|dt| dt.timestamp_millis())?;

    // Creator is "@username"; the status path works on the canonical
    // host too, so rewrite the mirror link.
    let creator = entry
        .authors
        .first()
        .map(|person| person.name.clone())
        .unwrap_or_default();
    let username = creator.trim_start_matches('@').to_string();

    let external_url = url::Url::parse(&link)
        .ok()
        .map(|u| format!("https://twitter.com{}", u.path()))
        .unwrap_or(link);

    let text_html = entry
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .unwrap_or_default();
    let summary_html = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .unwrap_or_default();

    let media: Vec<MediaItem> = INLINE_IMAGE
        .captures_iter(&summary_html)
        .take(1)
        .map(|caps| MediaItem::image(caps[1].to_string()))
        .collect();

    let status_id = external_url
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();

    Some(UnifiedPost {
        id: format!("twitter-{username}-{status_id}"),
        source: Source::Twitter,
        author: Author {
            name: username.clone(),
            handle: creator,
            avatar_url: placeholder_avatar(&username),
            profile_url: format!("https://twitter.com/{username}"),
        },
        content: strip_html(&text_html),
        media,
        external_url,
        timestamp,
        raw: serde_json::json!({ "query": query }),
    })
}

#[async_trait]
impl SourceAdapter for NitterAdapter {
    fn source(&self) -> Source {
        Source::Twitter
    }

    fn description(&self) -> &'static str {
        "Tweet search RSS through a pool of Nitter mirrors"
    }

    fn supports(&self, category: tributary_core::Category) -> bool {
        // Mirror RSS is text with incidental thumbnails; it has no
        // media-only view worth racing for.
        !matches!(category, tributary_core::Category::Media)
    }

    async fn fetch_posts(
        &self,
        topic: Option<&str>,
        _options: &FetchOptions,
    ) -> Result<Vec<UnifiedPost>> {
        let query = topic.unwrap_or(DEFAULT_QUERY);
        let path = format!("search/rss?q={}&f=tweets", urlencoding::encode(query));

        let body = match self
            .resolver
            .fetch_with_fallback(
                &path,
                &self.mirrors,
                FallbackOptions::validated(looks_like_tweet_feed).with_proxy_last_resort(),
            )
            .await
        {
            Ok(body) => body,
            // Exhausting every mirror means the service is dark right
            // now, not that the fetch cycle is broken.
            Err(err @ tributary_net::NetError::AllMirrorsFailed { .. }) => {
                tracing::warn!(error = %err, "all mirrors exhausted");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let feed = feed_rs::parser::parse(body.as_bytes())
            .map_err(|e| FeedError::Parse(format!("nitter feed: {e}")))?;
        let query = query.to_string();
        Ok(feed
            .entries
            .into_iter()
            .filter_map(|entry| convert(entry, &query))
            .collect())
    }
}
