//! Mastodon adapter.
//!
//! Reads the public trends endpoint (or a hashtag timeline when a
//! topic is given) of a single configured instance. No auth; both
//! endpoints are open on mainstream instances.

use async_trait::async_trait;
use serde::Deserialize;

use tributary_core::{placeholder_avatar, Author, MediaItem, Source, UnifiedPost};
use tributary_net::Transport;

use crate::adapters::{strip_html, FetchOptions, SourceAdapter};
use crate::config::FeedConfig;
use crate::error::Result;

const PAGE_LIMIT: u32 = 40;

#[derive(Debug, Deserialize)]
struct Status {
    id: String,
    created_at: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: Option<String>,
    account: Account,
    #[serde(default)]
    media_attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(default)]
    username: String,
    #[serde(default)]
    acct: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    avatar: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    preview_url: Option<String>,
}

pub struct MastodonAdapter {
    instance: String,
    transport: Transport,
}

impl MastodonAdapter {
    pub fn new(config: &FeedConfig, transport: Transport) -> Self {
        Self {
            instance: config.mastodon_instance.clone(),
            transport,
        }
    }

    fn endpoint(&self, topic: Option<&str>) -> String {
        match topic {
            Some(tag) => format!(
                "{}/api/v1/timelines/tag/{}?limit={PAGE_LIMIT}",
                self.instance,
                urlencoding::encode(tag)
            ),
            None => format!("{}/api/v1/trends/statuses?limit={PAGE_LIMIT}", self.instance),
        }
    }
}

fn convert(status: Status) -> Option<UnifiedPost> {
    let raw = serde_json::json!({ "id": status.id });
    let timestamp = chrono::DateTime::parse_from_rfc3339(&status.created_at)
        .ok()?
        .timestamp_millis();

    let media = status
        .media_attachments
        .iter()
        .filter_map(|att| {
            let url = att.url.clone().or_else(|| att.preview_url.clone())?;
            match att.kind.as_str() {
                "image" => Some(MediaItem::image(url)),
                "video" | "gifv" => Some(MediaItem::video(url, att.preview_url.clone())),
                _ => None,
            }
        })
        .collect();

    let display = if status.account.display_name.is_empty() {
        status.account.username.clone()
    } else {
        status.account.display_name.clone()
    };
    let avatar = if status.account.avatar.is_empty() {
        placeholder_avatar(&status.account.acct)
    } else {
        status.account.avatar.clone()
    };

    Some(UnifiedPost {
        id: format!("mastodon-{}", status.id),
        source: Source::Mastodon,
        author: Author {
            name: display,
            handle: format!("@{}", status.account.acct),
            avatar_url: avatar,
            profile_url: status.account.url,
        },
        content: strip_html(&status.content),
        media,
        external_url: status.url.unwrap_or_default(),
        timestamp,
        raw,
    })
}

#[async_trait]
impl SourceAdapter for MastodonAdapter {
    fn source(&self) -> Source {
        Source::Mastodon
    }

    fn description(&self) -> &'static str {
        "Trending and hashtag statuses from a Mastodon instance"
    }

    async fn fetch_posts(
        &self,
        topic: Option<&str>,
        _options: &FetchOptions,
    ) -> Result<Vec<UnifiedPost>> {
        let body = self.transport.fetch_text(&self.endpoint(topic)).await?;
        let statuses: Vec<Status> = serde_json::from_str(&body)?;
        let posts: Vec<UnifiedPost> = statuses.into_iter().filter_map(convert).collect();
        tracing::debug!(count = posts.len(), "mastodon statuses converted");
        Ok(posts)
    }
}
