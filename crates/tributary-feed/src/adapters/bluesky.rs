//! Bluesky adapter.
//!
//! Uses the unauthenticated public AppView. Without a topic it reads
//! the "what's hot" feed generator; with a topic it falls through to
//! post search. Embeds come back as loosely-typed unions keyed by
//! `$type`, so those are walked as raw JSON.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use tributary_core::{
    placeholder_avatar, Author, MediaItem, Source, UnifiedPost, MAX_MEDIA_ITEMS,
};
use tributary_net::Transport;

use crate::adapters::{FetchOptions, SourceAdapter};
use crate::error::Result;

const APPVIEW: &str = "https://public.api.bsky.app";
const WHATS_HOT: &str =
    "at://did:plc:z72i7hdynmk6r22z27h6tvur/app.bsky.feed.generator/whats-hot";
const PAGE_LIMIT: u32 = 40;

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    feed: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    posts: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    post: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    uri: String,
    author: PostAuthor,
    record: Record,
    #[serde(default)]
    embed: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PostAuthor {
    handle: String,
    #[serde(default, rename = "displayName")]
    display_name: String,
    #[serde(default)]
    avatar: String,
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(default)]
    text: String,
    #[serde(rename = "createdAt")]
    created_at: String,
}

pub struct BlueskyAdapter {
    transport: Transport,
}

impl BlueskyAdapter {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

/// Pull image and video attachments out of an embed union. Handles
/// `app.bsky.embed.images`, `app.bsky.embed.video`, and the
/// `recordWithMedia` wrapper around either.
fn embed_media(embed: &Value) -> Vec<MediaItem> {
    let mut media = Vec::new();
    collect_embed_media(embed, &mut media);
    media.truncate(MAX_MEDIA_ITEMS);
    media
}

fn collect_embed_media(embed: &Value, media: &mut Vec<MediaItem>) {
    let kind = embed.get("$type").and_then(Value::as_str).unwrap_or("");

    if kind.starts_with("app.bsky.embed.images") {
        if let Some(images) = embed.get("images").and_then(Value::as_array) {
            for image in images {
                if let Some(url) = image.get("fullsize").and_then(Value::as_str) {
                    media.push(MediaItem::image(url));
                }
            }
        }
    } else if kind.starts_with("app.bsky.embed.video") {
        if let Some(url) = embed.get("playlist").and_then(Value::as_str) {
            let preview = embed
                .get("thumbnail")
                .and_then(Value::as_str)
                .map(str::to_string);
            media.push(MediaItem::video(url, preview));
        }
    } else if kind.starts_with("app.bsky.embed.recordWithMedia") {
        if let Some(inner) = embed.get("media") {
            collect_embed_media(inner, media);
        }
    }
}

/// `at://did/app.bsky.feed.post/rkey` -> `rkey`.
fn record_key(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

fn convert(post: Post) -> Option<UnifiedPost> {
    let timestamp = chrono::DateTime::parse_from_rfc3339(&post.record.created_at)
        .ok()?
        .timestamp_millis();
    let rkey = record_key(&post.uri).to_string();
    let media = post.embed.as_ref().map(embed_media).unwrap_or_default();

    let display = if post.author.display_name.is_empty() {
        post.author.handle.clone()
    } else {
        post.author.display_name.clone()
    };
    let avatar = if post.author.avatar.is_empty() {
        placeholder_avatar(&post.author.handle)
    } else {
        post.author.avatar.clone()
    };

    Some(UnifiedPost {
        id: format!("bluesky-{}-{rkey}", post.author.handle),
        source: Source::Bluesky,
        author: Author {
            name: display,
            handle: format!("@{}", post.author.handle),
            avatar_url: avatar,
            profile_url: format!("https://bsky.app/profile/{}", post.author.handle),
        },
        content: post.record.text.clone(),
        media,
        external_url: format!(
            "https://bsky.app/profile/{}/post/{rkey}",
            post.author.handle
        ),
        timestamp,
        raw: serde_json::json!({ "uri": post.uri }),
    })
}

#[async_trait]
impl SourceAdapter for BlueskyAdapter {
    fn source(&self) -> Source {
        Source::Bluesky
    }

    fn description(&self) -> &'static str {
        "Hot feed and post search from the public Bluesky AppView"
    }

    async fn fetch_posts(
        &self,
        topic: Option<&str>,
        _options: &FetchOptions,
    ) -> Result<Vec<UnifiedPost>> {
        let posts = match topic {
            Some(query) => {
                let url = format!(
                    "{APPVIEW}/xrpc/app.bsky.feed.searchPosts?q={}&limit={PAGE_LIMIT}",
                    urlencoding::encode(query)
                );
                let body = self.transport.fetch_text(&url).await?;
                let response: SearchResponse = serde_json::from_str(&body)?;
                response.posts
            }
            None => {
                let url = format!(
                    "{APPVIEW}/xrpc/app.bsky.feed.getFeed?feed={}&limit={PAGE_LIMIT}",
                    urlencoding::encode(WHATS_HOT)
                );
                let body = self.transport.fetch_text(&url).await?;
                let response: FeedResponse = serde_json::from_str(&body)?;
                response.feed.into_iter().map(|item| item.post).collect()
            }
        };

        Ok(posts.into_iter().filter_map(convert).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tributary_core::MediaKind;

    fn post(embed: Option<Value>) -> Post {
        Post {
            uri: "at://did:plc:abc/app.bsky.feed.post/3kxyz".to_string(),
            author: PostAuthor {
                handle: "alice.bsky.social".to_string(),
                display_name: "Alice".to_string(),
                avatar: String::new(),
            },
            record: Record {
                text: "hello sky".to_string(),
                created_at: "2024-06-01T12:00:00.000Z".to_string(),
            },
            embed,
        }
    }

    #[test]
    fn builds_web_urls_from_at_uri() {
        let converted = convert(post(None)).unwrap();
        assert_eq!(
            converted.external_url,
            "https://bsky.app/profile/alice.bsky.social/post/3kxyz"
        );
        assert_eq!(converted.author.handle, "@alice.bsky.social");
        assert!(converted.author.avatar_url.contains("dicebear"));
    }

    #[test]
    fn image_embed_maps_to_media() {
        let embed = serde_json::json!({
            "$type": "app.bsky.embed.images#view",
            "images": [
                {"fullsize": "https://cdn.example/full1.jpg", "thumb": "https://cdn.example/t1.jpg"},
                {"fullsize": "https://cdn.example/full2.jpg"}
            ]
        });
        let converted = convert(post(Some(embed))).unwrap();
        assert_eq!(converted.media.len(), 2);
        assert_eq!(converted.media[0].url, "https://cdn.example/full1.jpg");
    }

    #[test]
    fn video_and_record_with_media_embeds() {
        let embed = serde_json::json!({
            "$type": "app.bsky.embed.recordWithMedia#view",
            "media": {
                "$type": "app.bsky.embed.video#view",
                "playlist": "https://video.example/pl.m3u8",
                "thumbnail": "https://video.example/t.jpg"
            }
        });
        let converted = convert(post(Some(embed))).unwrap();
        assert_eq!(converted.media.len(), 1);
        assert_eq!(converted.media[0].kind, MediaKind::Video);
        assert_eq!(
            converted.media[0].preview_url.as_deref(),
            Some("https://video.example/t.jpg")
        );
    }

    #[test]
    fn unknown_embed_yields_no_media() {
        let embed = serde_json::json!({"$type": "app.bsky.embed.external#view"});
        let converted = convert(post(Some(embed))).unwrap();
        assert!(converted.media.is_empty());
    }
}
