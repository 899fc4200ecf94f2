//! Lemmy adapter.
//!
//! Lemmy's JSON API requires auth on many instances, but every
//! instance publishes RSS feeds. Reads the all-communities feed (or
//! one community's feed when a topic is given) and recovers the
//! author from the Dublin Core creator element, which Lemmy fills
//! with the user's profile URL.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use tributary_core::{placeholder_avatar, Author, MediaItem, Source, UnifiedPost};
use tributary_net::Transport;

use crate::adapters::{strip_html, FetchOptions, SourceAdapter};
use crate::config::FeedConfig;
use crate::error::{FeedError, Result};

static CREATOR_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://([^/]+)/u/(.+)").unwrap());

static INLINE_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img[^>]+src="([^"]+)""#).unwrap()
});

pub struct LemmyAdapter {
    instance: String,
    transport: Transport,
}

impl LemmyAdapter {
    pub fn new(config: &FeedConfig, transport: Transport) -> Self {
        Self {
            instance: config.lemmy_instance.clone(),
            transport,
        }
    }

    fn feed_url(&self, topic: Option<&str>) -> String {
        match topic {
            Some(community) => format!(
                "{}/feeds/c/{}.xml?sort=Hot",
                self.instance,
                urlencoding::encode(community)
            ),
            None => format!("{}/feeds/all.xml?sort=Hot", self.instance),
        }
    }
}

/// `https://lemmy.example/u/alice` -> `(alice@lemmy.example, url)`.
/// Anything else falls back to the raw creator string.
fn parse_creator(creator: &str) -> Author {
    if let Some(caps) = CREATOR_URL.captures(creator) {
        let host = &caps[1];
        let user = &caps[2];
        return Author {
            name: user.to_string(),
            handle: format!("@{user}@{host}"),
            avatar_url: placeholder_avatar(user),
            profile_url: creator.to_string(),
        };
    }
    Author {
        name: creator.to_string(),
        handle: creator.to_string(),
        avatar_url: placeholder_avatar(creator),
        profile_url: String::new(),
    }
}

fn convert(entry: feed_rs::model::Entry) -> Option<UnifiedPost> {
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

    let media: Vec<MediaItem> = INLINE_IMAGE
        .captures_iter(&summary_html)
        .take(1)
        .map(|caps| MediaItem::image(caps[1].to_string()))
        .collect();

    let summary = strip_html(&summary_html);
    let content = if summary.is_empty() {
        title.clone()
    } else {
        format!("{title}\n\n{summary}")
    };

    let creator = entry
        .authors
        .first()
        .map(|person| person.name.as_str())
        .unwrap_or("");

    Some(UnifiedPost {
        id: format!("lemmy-{}", entry.id),
        source: Source::Lemmy,
        author: parse_creator(creator),
        content,
        media,
        external_url: link,
        timestamp,
        raw: serde_json::json!({ "id": entry.id }),
    })
}

#[async_trait]
impl SourceAdapter for LemmyAdapter {
    fn source(&self) -> Source {
        Source::Lemmy
    }

    fn description(&self) -> &'static str {
        "Hot posts via a Lemmy instance's RSS feeds"
    }

    async fn fetch_posts(
        &self,
        topic: Option<&str>,
        _options: &FetchOptions,
    ) -> Result<Vec<UnifiedPost>> {
        let body = self.transport.fetch_text(&self.feed_url(topic)).await?;
        let feed = feed_rs::parser::parse(body.as_bytes())
            .map_err(|e| FeedError::Parse(format!("lemmy feed: {e}")))?;
        Ok(feed.entries.into_iter().filter_map(convert).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>All - lemmy.example</title>
    <link>https://lemmy.example</link>
    <item>
      <title>First post</title>
      <link>https://lemmy.example/post/101</link>
      <guid>https://lemmy.example/post/101</guid>
      <dc:creator>https://lemmy.example/u/alice</dc:creator>
      <pubDate>Sat, 01 Jun 2024 12:00:00 +0000</pubDate>
      <description>&lt;p&gt;Some &lt;b&gt;body&lt;/b&gt; text&lt;/p&gt;</description>
    </item>
    <item>
      <title>Picture post</title>
      <link>https://lemmy.example/post/102</link>
      <guid>https://lemmy.example/post/102</guid>
      <dc:creator>https://other.example/u/bob</dc:creator>
      <pubDate>Sat, 01 Jun 2024 11:00:00 +0000</pubDate>
      <description>&lt;img src="https://pics.example/x.png" /&gt;</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_feed_items() {
        let feed = feed_rs::parser::parse(SAMPLE_FEED.as_bytes()).unwrap();
        let posts: Vec<UnifiedPost> = feed.entries.into_iter().filter_map(convert).collect();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].external_url, "https://lemmy.example/post/101");
        assert_eq!(posts[0].content, "First post\n\nSome body text");
        assert_eq!(posts[0].timestamp, 1_717_243_200_000);
    }

    #[test]
    fn creator_url_becomes_federated_handle() {
        let author = parse_creator("https://other.example/u/bob");
        assert_eq!(author.name, "bob");
        assert_eq!(author.handle, "@bob@other.example");
        assert_eq!(author.profile_url, "https://other.example/u/bob");
    }

    #[test]
    fn non_url_creator_passes_through() {
        let author = parse_creator("plain-name");
        assert_eq!(author.name, "plain-name");
        assert!(author.profile_url.is_empty());
    }

    #[test]
    fn inline_image_becomes_media() {
        let feed = feed_rs::parser::parse(SAMPLE_FEED.as_bytes()).unwrap();
        let posts: Vec<UnifiedPost> = feed.entries.into_iter().filter_map(convert).collect();
        assert_eq!(posts[1].media.len(), 1);
        assert_eq!(posts[1].media[0].url, "https://pics.example/x.png");
    }

    #[test]
    fn feed_urls() {
        let adapter = LemmyAdapter {
            instance: "https://lemmy.example".to_string(),
            transport: Transport::new(tributary_net::ProxyPolicy::direct()).unwrap(),
        };
        assert_eq!(
            adapter.feed_url(None),
            "https://lemmy.example/feeds/all.xml?sort=Hot"
        );
        assert_eq!(
            adapter.feed_url(Some("rust")),
            "https://lemmy.example/feeds/c/rust.xml?sort=Hot"
        );
    }
}
