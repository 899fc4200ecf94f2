//! Generic RSS/Atom adapter.
//!
//! Pulls every configured feed concurrently and merges the entries.
//! There is no server-side search for arbitrary feeds, so a topic is
//! applied as a case-insensitive keyword filter after the fetch.

use std::sync::LazyLock;

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;

use tributary_core::{placeholder_avatar, Author, MediaItem, Source, UnifiedPost};
use tributary_net::Transport;

use crate::adapters::{strip_html, FetchOptions, SourceAdapter};
use crate::config::FeedConfig;
use crate::error::Result;

/// Entry summaries are teasers, not articles.
const SUMMARY_MAX_CHARS: usize = 280;

static INLINE_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img[^>]+src="([^"]+)""#).unwrap()
});

pub struct RssAdapter {
    feeds: Vec<String>,
    transport: Transport,
}

impl RssAdapter {
    pub fn new(config: &FeedConfig, transport: Transport) -> Self {
        Self {
            feeds: config.rss_feeds.clone(),
            transport,
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}…", cut.trim_end())
}

fn entry_image(entry: &feed_rs::model::Entry, summary_html: &str) -> Option<MediaItem> {
    for media in &entry.media {
        for content in &media.content {
            let is_image = content
                .content_type
                .as_ref()
                .map(|m| m.ty() == "image")
                .unwrap_or(false);
            if is_image {
                if let Some(url) = &content.url {
                    return Some(MediaItem::image(url.to_string()));
                }
            }
        }
    }
    INLINE_IMAGE
        .captures_iter(summary_html)
        .next()
        .map(|caps| MediaItem::image(caps[1].to_string()))
}

fn convert(entry: feed_rs::model::Entry, feed_host: &str) -> Option<UnifiedPost> {
    let link = entry.links.first()?.href.clone();
    let timestamp = entry
        .published
        .or(entry.updated)
        .map(|dt| dt.timestamp_millis())?;

    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .unwrap_or_default();
    let summary_html = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .unwrap_or_default();

    let media = entry_image(&entry, &summary_html).into_iter().collect();
    let summary = truncate_chars(&strip_html(&summary_html), SUMMARY_MAX_CHARS);
    let content = if summary.is_empty() {
        title.clone()
    } else {
        format!("{title}\n\n{summary}")
    };

    Some(UnifiedPost {
        id: format!("rss-{}", entry.id),
        source: Source::Rss,
        author: Author {
            name: feed_host.to_string(),
            handle: feed_host.to_string(),
            avatar_url: placeholder_avatar(feed_host),
            profile_url: format!("https://{feed_host}"),
        },
        content,
        media,
        external_url: link,
        timestamp,
        raw: serde_json::json!({ "id": entry.id }),
    })
}

fn host_of(feed_url: &str) -> String {
    url::Url::parse(feed_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| feed_url.to_string())
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    fn source(&self) -> Source {
        Source::Rss
    }

    fn description(&self) -> &'static str {
        "Configured RSS and Atom feeds, merged"
    }

    fn supports(&self, category: tributary_core::Category) -> bool {
        !matches!(category, tributary_core::Category::Media)
    }

    async fn fetch_posts(
        &self,
        topic: Option<&str>,
        _options: &FetchOptions,
    ) -> Result<Vec<UnifiedPost>> {
        let fetches = self.feeds.iter().map(|feed_url| async move {
            let body = self.transport.fetch_text(feed_url).await?;
            let parsed = feed_rs::parser::parse(body.as_bytes())
                .map_err(|e| crate::error::FeedError::Parse(format!("{feed_url}: {e}")))?;
            Ok::<_, crate::error::FeedError>((host_of(feed_url), parsed))
        });

        let mut posts = Vec::new();
        for result in join_all(fetches).await {
            match result {
                Ok((host, feed)) => {
                    posts.extend(feed.entries.into_iter().filter_map(|e| convert(e, &host)));
                }
                // One broken feed must not sink the rest.
                Err(err) => tracing::warn!(error = %err, "feed fetch failed"),
            }
        }

        if let Some(topic) = topic {
            let needle = topic.to_lowercase();
            posts.retain(|post| post.content.to_lowercase().contains(&needle));
        }
        Ok(posts)
    }
}
