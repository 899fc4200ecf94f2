//! Reddit adapter.
//!
//! Reads the public listing JSON for a subreddit (topic maps to a
//! subreddit name, default is r/popular). Reddit's media model is
//! scattered: galleries, previews, hosted video, and plain links all
//! live in different corners of the listing child, so extraction
//! walks raw JSON instead of a typed mirror of the whole schema.

use async_trait::async_trait;
use serde_json::Value;

use tributary_core::{
    placeholder_avatar, Author, MediaItem, Source, UnifiedPost, MAX_MEDIA_ITEMS,
};
use tributary_net::Transport;

use crate::adapters::{FetchOptions, SourceAdapter};
use crate::config::FeedConfig;
use crate::error::Result;

const PAGE_LIMIT: u32 = 40;

/// Preview resolutions at or above this width are preferred over the
/// source image, which can be tens of megabytes.
const PREFERRED_WIDTH: u64 = 640;

pub struct RedditAdapter {
    default_subreddit: String,
    transport: Transport,
}

impl RedditAdapter {
    pub fn new(config: &FeedConfig, transport: Transport) -> Self {
        Self {
            default_subreddit: config.default_subreddit.clone(),
            transport,
        }
    }
}

/// Listing JSON escapes ampersands in URLs.
fn unescape_url(url: &str) -> String {
    url.replace("&amp;", "&")
}

fn str_field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

/// Best image URL from a preview block: the smallest resolution at or
/// above [`PREFERRED_WIDTH`], else the source.
fn preview_image(preview: &Value) -> Option<String> {
    let image = preview.get("images")?.as_array()?.first()?;
    let resolutions = image.get("resolutions").and_then(Value::as_array);
    if let Some(resolutions) = resolutions {
        let mut best: Option<(u64, &str)> = None;
        for res in resolutions {
            let Some(width) = res.get("width").and_then(Value::as_u64) else {
                continue;
            };
            let Some(url) = str_field(res, "url") else {
                continue;
            };
            if width >= PREFERRED_WIDTH {
                match best {
                    Some((best_width, _)) if best_width <= width => {}
                    _ => best = Some((width, url)),
                }
            }
        }
        if let Some((_, url)) = best {
            return Some(unescape_url(url));
        }
    }
    str_field(image.get("source")?, "url").map(unescape_url)
}

/// Every image in a gallery post, in gallery order.
fn gallery_images(data: &Value) -> Vec<String> {
    let Some(items) = data
        .pointer("/gallery_data/items")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    let Some(metadata) = data.get("media_metadata") else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let media_id = str_field(item, "media_id")?;
            let url = metadata.pointer(&format!("/{media_id}/s/u")).and_then(Value::as_str)?;
            Some(unescape_url(url))
        })
        .collect()
}

fn extract_media(data: &Value) -> Vec<MediaItem> {
    let mut media = Vec::new();

    if data.get("is_gallery").and_then(Value::as_bool) == Some(true) {
        for url in gallery_images(data) {
            media.push(MediaItem::image(url));
        }
    } else if data.get("is_video").and_then(Value::as_bool) == Some(true) {
        if let Some(url) = data
            .pointer("/media/reddit_video/fallback_url")
            .and_then(Value::as_str)
        {
            let preview = data.get("preview").and_then(preview_image);
            media.push(MediaItem::video(unescape_url(url), preview));
        }
    } else if let Some(preview) = data.get("preview") {
        if let Some(url) = preview_image(preview) {
            media.push(MediaItem::image(url));
        }
    }

    media.truncate(MAX_MEDIA_ITEMS);
    media
}

fn convert(child: &Value) -> Option<UnifiedPost> {
    let data = child.get("data")?;
    let id = str_field(data, "id")?;
    let title = str_field(data, "title").unwrap_or_default();
    let selftext = str_field(data, "selftext").unwrap_or_default();
    let author = str_field(data, "author").unwrap_or("[deleted]");
    let subreddit = str_field(data, "subreddit").unwrap_or_default();
    let permalink = str_field(data, "permalink").unwrap_or_default();
    let created = data.get("created_utc").and_then(Value::as_f64)?;

    let content = if selftext.is_empty() {
        title.to_string()
    } else {
        format!("{title}\n\n{selftext}")
    };

    Some(UnifiedPost {
        id: format!("reddit-{id}"),
        source: Source::Reddit,
        author: Author {
            name: format!("u/{author}"),
            handle: format!("r/{subreddit}"),
            avatar_url: placeholder_avatar(author),
            profile_url: format!("https://www.reddit.com/user/{author}"),
        },
        content,
        media: extract_media(data),
        external_url: format!("https://www.reddit.com{permalink}"),
        timestamp: (created * 1000.0) as i64,
        raw: serde_json::json!({ "id": id }),
    })
}

#[async_trait]
impl SourceAdapter for RedditAdapter {
    fn source(&self) -> Source {
        Source::Reddit
    }

    fn description(&self) -> &'static str {
        "Hot listing from a subreddit (r/popular by default)"
    }

    async fn fetch_posts(
        &self,
        topic: Option<&str>,
        _options: &FetchOptions,
    ) -> Result<Vec<UnifiedPost>> {
        let subreddit = topic.unwrap_or(&self.default_subreddit);
        let url = format!(
            "https://www.reddit.com/r/{}.json?limit={PAGE_LIMIT}&raw_json=1",
            urlencoding::encode(subreddit)
        );
        let body = self.transport.fetch_text(&url).await?;
        let listing: Value = serde_json::from_str(&body)?;

        let children = listing
            .pointer("/data/children")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(children.iter().filter_map(convert).collect())
    }
}
