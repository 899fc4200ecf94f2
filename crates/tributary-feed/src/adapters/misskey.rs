//! Misskey adapter.
//!
//! Misskey's API is POST-only JSON, so these requests never go
//! through the indirection proxy. Reads the instance-local timeline;
//! with a topic, searches notes by tag. Renotes without their own
//! text are unwrapped to the original note.

use async_trait::async_trait;
use serde::Deserialize;

use tributary_core::{placeholder_avatar, Author, MediaItem, Source, UnifiedPost};
use tributary_net::Transport;

use crate::adapters::{FetchOptions, SourceAdapter};
use crate::config::FeedConfig;
use crate::error::Result;

const PAGE_LIMIT: u32 = 40;

#[derive(Debug, Deserialize)]
struct Note {
    id: String,
    #[serde(rename = "createdAt")]
    created_at: String,
    #[serde(default)]
    text: Option<String>,
    user: User,
    #[serde(default)]
    files: Vec<File>,
    #[serde(default)]
    renote: Option<Box<Note>>,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    username: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "avatarUrl")]
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct File {
    #[serde(default, rename = "type")]
    mime: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "thumbnailUrl")]
    thumbnail_url: Option<String>,
}

pub struct MisskeyAdapter {
    instance: String,
    transport: Transport,
}

impl MisskeyAdapter {
    pub fn new(config: &FeedConfig, transport: Transport) -> Self {
        Self {
            instance: config.misskey_instance.clone(),
            transport,
        }
    }

    fn host(&self) -> &str {
        self.instance
            .strip_prefix("https://")
            .or_else(|| self.instance.strip_prefix("http://"))
            .unwrap_or(&self.instance)
    }
}

fn file_media(files: &[File]) -> Vec<MediaItem> {
    files
        .iter()
        .filter_map(|file| {
            let url = file.url.clone()?;
            if file.mime.starts_with("image/") {
                Some(MediaItem::image(url))
            } else if file.mime.starts_with("video/") {
                Some(MediaItem::video(url, file.thumbnail_url.clone()))
            } else {
                None
            }
        })
        .collect()
}

fn convert(note: Note, host: &str) -> Option<UnifiedPost> {
    // A bare renote has no text of its own; surface the original.
    let is_bare_renote = note.text.as_deref().unwrap_or("").is_empty()
        && note.files.is_empty()
        && note.renote.is_some();
    let note = if is_bare_renote {
        *note.renote?
    } else {
        note
    };

    let timestamp = chrono::DateTime::parse_from_rfc3339(&note.created_at)
        .ok()?
        .timestamp_millis();
    let display = note
        .user
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| note.user.username.clone());
    let avatar = note
        .user
        .avatar_url
        .clone()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| placeholder_avatar(&note.user.username));

    Some(UnifiedPost {
        id: format!("misskey-{}", note.id),
        source: Source::Misskey,
        author: Author {
            name: display,
            handle: format!("@{}", note.user.username),
            avatar_url: avatar,
            profile_url: format!("https://{host}/@{}", note.user.username),
        },
        content: note.text.clone().unwrap_or_default(),
        media: file_media(&note.files),
        external_url: format!("https://{host}/notes/{}", note.id),
        timestamp,
        raw: serde_json::json!({ "id": note.id }),
    })
}

#[async_trait]
impl SourceAdapter for MisskeyAdapter {
    fn source(&self) -> Source {
        Source::Misskey
    }

    fn description(&self) -> &'static str {
        "Local timeline and tag search from a Misskey instance"
    }

    async fn fetch_posts(
        &self,
        topic: Option<&str>,
        _options: &FetchOptions,
    ) -> Result<Vec<UnifiedPost>> {
        let (endpoint, body) = match topic {
            Some(tag) => (
                format!("{}/api/notes/search-by-tag", self.instance),
                serde_json::json!({ "tag": tag, "limit": PAGE_LIMIT }),
            ),
            None => (
                format!("{}/api/notes/local-timeline", self.instance),
                serde_json::json!({ "limit": PAGE_LIMIT }),
            ),
        };

        let response = self.transport.post_json(&endpoint, &body).await?;
        let notes: Vec<Note> = serde_json::from_str(&response)?;
        let host = self.host().to_string();
        Ok(notes
            .into_iter()
            .filter_map(|note| convert(note, &host))
            .collect())
    }
}
