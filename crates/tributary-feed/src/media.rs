//! Media URL extraction from relay events.
//!
//! Media posts reference their payloads three ways: bare URLs in the
//! text content, single-value tags (`url`, `image`, `thumb`), and
//! `imeta` tags whose entries are space-prefixed key/value strings.
//! This module pulls image and video URLs out of all three, preserving
//! first-seen order, and strips the extracted URLs back out of the
//! display text.

use std::sync::LazyLock;

use regex::Regex;

use tributary_core::{MediaItem, RelayEvent, MAX_MEDIA_ITEMS};

static IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://\S+\.(?:jpg|jpeg|png|gif|webp)(?:\?\S*)?").unwrap()
});

static VIDEO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://\S+\.(?:mp4|webm|mov|m3u8|avi|mkv)(?:\?\S*)?").unwrap()
});

static ANY_MEDIA_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://\S+\.(?:jpg|jpeg|png|gif|webp|mp4|webm|mov|m3u8|avi|mkv)(?:\?\S*)?")
        .unwrap()
});

/// Tags whose single value may be a media URL.
const MEDIA_TAG_NAMES: &[&str] = &["url", "image", "thumb", "streaming", "video"];

fn push_unique(urls: &mut Vec<String>, candidate: &str) {
    if !urls.iter().any(|u| u == candidate) {
        urls.push(candidate.to_string());
    }
}

/// URLs referenced by an event's tags, including `imeta` entries.
fn tag_urls(event: &RelayEvent) -> Vec<String> {
    let mut urls = Vec::new();
    for tag in &event.tags {
        let Some(name) = tag.first() else { continue };
        if MEDIA_TAG_NAMES.contains(&name.as_str()) {
            if let Some(value) = tag.get(1) {
                push_unique(&mut urls, value);
            }
        } else if name == "imeta" {
            for entry in &tag[1..] {
                if let Some(url) = entry.strip_prefix("url ") {
                    push_unique(&mut urls, url);
                }
            }
        }
    }
    urls
}

fn matching_urls(event: &RelayEvent, pattern: &Regex) -> Vec<String> {
    let mut urls = Vec::new();
    for m in pattern.find_iter(&event.content) {
        push_unique(&mut urls, m.as_str());
    }
    for url in tag_urls(event) {
        if pattern.is_match(&url) {
            push_unique(&mut urls, &url);
        }
    }
    urls
}

/// Image URLs in an event's content and tags, first-seen order.
pub fn extract_image_urls(event: &RelayEvent) -> Vec<String> {
    matching_urls(event, &IMAGE_URL)
}

/// Video URLs in an event's content and tags, first-seen order.
pub fn extract_video_urls(event: &RelayEvent) -> Vec<String> {
    matching_urls(event, &VIDEO_URL)
}

/// Remove bare media URLs from display text.
pub fn strip_media_urls(content: &str) -> String {
    ANY_MEDIA_URL.replace_all(content, "").trim().to_string()
}

/// Build a capped media list for a post: images first, then videos,
/// dropping everything past [`MAX_MEDIA_ITEMS`].
pub fn media_from_event(event: &RelayEvent) -> Vec<MediaItem> {
    let mut media: Vec<MediaItem> = Vec::new();
    for url in extract_image_urls(event) {
        media.push(MediaItem::image(url));
    }
    for url in extract_video_urls(event) {
        media.push(MediaItem::video(url, None));
    }
    media.truncate(MAX_MEDIA_ITEMS);
    media
}
