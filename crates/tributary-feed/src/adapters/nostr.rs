//! Nostr text adapter.
//!
//! Notes come from two independent kinds of upstream: an aggregation
//! API (which ranks by engagement and bundles author metadata with
//! each note) and plain relay queries. Neither is reliable alone, so
//! strategies are tried in order until one yields posts: curated
//! relays first for an untopiced feed, the API first for search.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use tributary_core::{
    placeholder_avatar, Author, Filter, RelayEvent, Source, UnifiedPost, KIND_NOTE,
};
use tributary_net::{RelayClient, Transport};

use crate::adapters::{FetchOptions, SourceAdapter};
use crate::config::FeedConfig;
use crate::error::Result;
use crate::media::{media_from_event, strip_media_urls};
use crate::profiles::{display_name, handle, ActorProfile, ProfileCache};

pub(crate) const BAND_API: &str = "https://api.nostr.band";

const RELAY_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const RELAY_QUERY_LIMIT: usize = 60;

/// One note in an aggregation API response. The author rides along
/// as a full metadata event.
#[derive(Debug, Deserialize)]
struct ApiNote {
    event: RelayEvent,
    #[serde(default)]
    author: Option<RelayEvent>,
}

#[derive(Debug, Deserialize)]
struct ApiNotes {
    #[serde(default)]
    notes: Vec<ApiNote>,
}

/// Append a throwaway query parameter so intermediary caches miss.
pub(crate) fn with_cache_buster(url: &str, force_refresh: bool) -> String {
    if !force_refresh {
        return url.to_string();
    }
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}_={}", chrono::Utc::now().timestamp_millis())
}

/// Fetch a note list from the aggregation API, priming the profile
/// cache with each bundled author so relay lookups are skipped.
pub(crate) async fn fetch_api_notes(
    transport: &Transport,
    profiles: &ProfileCache,
    url: &str,
) -> Result<Vec<RelayEvent>> {
    let body = transport.fetch_text(url).await?;
    let parsed: ApiNotes = serde_json::from_str(&body)?;

    let mut events = Vec::with_capacity(parsed.notes.len());
    for note in parsed.notes {
        if let Some(author) = &note.author {
            if let Some(profile) = ActorProfile::from_metadata_event(author) {
                profiles.prime(profile).await;
            }
        }
        events.push(note.event);
    }
    Ok(events)
}

/// Build a post from a note and its (possibly unresolved) author.
pub(crate) fn convert_note(
    event: &RelayEvent,
    source: Source,
    profile: Option<&ActorProfile>,
) -> UnifiedPost {
    let media = media_from_event(event);
    let avatar = profile
        .map(|p| p.picture.clone())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| placeholder_avatar(&event.pubkey));

    UnifiedPost {
        id: format!("{}-{}", source.as_str(), event.id),
        source,
        author: Author {
            name: display_name(profile, &event.pubkey),
            handle: handle(profile, &event.pubkey),
            avatar_url: avatar,
            profile_url: format!("https://njump.me/p/{}", event.pubkey),
        },
        content: strip_media_urls(&event.content),
        media,
        external_url: format!("https://njump.me/{}", event.id),
        timestamp: event.created_at as i64 * 1000,
        raw: serde_json::json!({ "id": event.id }),
    }
}

pub struct NostrAdapter {
    relays: Vec<String>,
    curated_relays: Vec<String>,
    profiles: Arc<ProfileCache>,
    transport: Transport,
    client: RelayClient,
}

impl NostrAdapter {
    pub fn new(config: &FeedConfig, profiles: Arc<ProfileCache>, transport: Transport) -> Self {
        Self {
            relays: config.relays.clone(),
            curated_relays: config.curated_relays.clone(),
            profiles,
            transport,
            client: RelayClient::default(),
        }
    }

    async fn relay_notes(&self, relays: &[String], topic: Option<&str>) -> Vec<RelayEvent> {
        let mut filter = Filter::new().kinds([KIND_NOTE]).limit(RELAY_QUERY_LIMIT);
        if let Some(topic) = topic {
            filter = filter.hashtag(topic.to_lowercase());
        }
        self.client
            .query(&filter, relays, RELAY_QUERY_TIMEOUT)
            .await
    }

    async fn trending_notes(&self, force_refresh: bool) -> Result<Vec<RelayEvent>> {
        let url = with_cache_buster(&format!("{BAND_API}/v0/trending/notes"), force_refresh);
        fetch_api_notes(&self.transport, &self.profiles, &url).await
    }

    async fn search_notes(&self, topic: &str, force_refresh: bool) -> Result<Vec<RelayEvent>> {
        let url = format!(
            "{BAND_API}/v0/search?q={}&kind={KIND_NOTE}&limit={RELAY_QUERY_LIMIT}",
            urlencoding::encode(topic)
        );
        fetch_api_notes(
            &self.transport,
            &self.profiles,
            &with_cache_buster(&url, force_refresh),
        )
        .await
    }

    /// Walk the strategy ladder until one yields events.
    async fn collect_events(&self, topic: Option<&str>, force_refresh: bool) -> Vec<RelayEvent> {
        match topic {
            None => {
                let curated = self.relay_notes(&self.curated_relays, None).await;
                if !curated.is_empty() {
                    return curated;
                }
                tracing::debug!("curated relays empty, trying trending API");
                match self.trending_notes(force_refresh).await {
                    Ok(events) if !events.is_empty() => return events,
                    Ok(_) => {}
                    Err(err) => tracing::debug!(error = %err, "trending API failed"),
                }
                self.relay_notes(&self.relays, None).await
            }
            Some(topic) => {
                match self.search_notes(topic, force_refresh).await {
                    Ok(events) if !events.is_empty() => return events,
                    Ok(_) => {}
                    Err(err) => tracing::debug!(error = %err, "note search failed"),
                }
                self.relay_notes(&self.relays, Some(topic)).await
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for NostrAdapter {
    fn source(&self) -> Source {
        Source::Nostr
    }

    fn description(&self) -> &'static str {
        "Text notes from relays and the nostr.band aggregation API"
    }

    async fn fetch_posts(
        &self,
        topic: Option<&str>,
        options: &FetchOptions,
    ) -> Result<Vec<UnifiedPost>> {
        let events = self.collect_events(topic, options.force_refresh).await;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let pubkeys: Vec<String> = events.iter().map(|e| e.pubkey.clone()).collect();
        let profiles = self.profiles.resolve(&pubkeys).await;

        Ok(events
            .iter()
            .map(|event| convert_note(event, Source::Nostr, profiles.get(&event.pubkey)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, pubkey: &str, content: &str) -> RelayEvent {
        RelayEvent {
            id: id.to_string(),
            pubkey: pubkey.to_string(),
            created_at: 1_700_000_000,
            kind: KIND_NOTE,
            tags: Vec::new(),
            content: content.to_string(),
            sig: String::new(),
        }
    }

    #[test]
    fn note_conversion_strips_media_from_text() {
        let ev = event("e1", "pk1", "look https://pics.example/cat.png");
        let post = convert_note(&ev, Source::Nostr, None);
        assert_eq!(post.id, "nostr-e1");
        assert_eq!(post.content, "look");
        assert_eq!(post.media.len(), 1);
        assert_eq!(post.external_url, "https://njump.me/e1");
        assert_eq!(post.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn cache_buster_respects_existing_query() {
        assert_eq!(with_cache_buster("https://a.example/x", false), "https://a.example/x");
        assert!(with_cache_buster("https://a.example/x", true).contains("/x?_="));
        assert!(with_cache_buster("https://a.example/x?q=1", true).contains("&_="));
    }

    #[test]
    fn unresolved_author_gets_placeholder_identity() {
        let ev = event("e1", "abcdefghijklmnopqrstuvwxyz", "hi");
        let post = convert_note(&ev, Source::Nostr, None);
        assert_eq!(post.author.name, "abcdefghijkl");
        assert!(post.author.avatar_url.contains("dicebear"));
    }

    #[test]
    fn resolved_author_uses_profile() {
        let ev = event("e1", "pk1", "hi");
        let profile = ActorProfile {
            pubkey: "pk1".to_string(),
            name: "alice".to_string(),
            display_name: "Alice".to_string(),
            nip05: String::new(),
            picture: "https://i.example/a.png".to_string(),
            about: String::new(),
        };
        let post = convert_note(&ev, Source::Nostr, Some(&profile));
        assert_eq!(post.author.name, "Alice");
        assert_eq!(post.author.handle, "@alice");
        assert_eq!(post.author.avatar_url, "https://i.example/a.png");
    }

    #[tokio::test]
    async fn api_notes_prime_profile_cache() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let body = serde_json::json!({
            "notes": [{
                "event": {
                    "id": "e1", "pubkey": "pk1", "created_at": 1_700_000_000,
                    "kind": 1, "content": "hello", "tags": [], "sig": ""
                },
                "author": {
                    "id": "m1", "pubkey": "pk1", "created_at": 1_699_000_000,
                    "kind": 0, "content": "{\"name\":\"alice\"}", "tags": [], "sig": ""
                }
            }]
        });
        Mock::given(method("GET"))
            .and(path("/v0/trending/notes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let transport =
            Transport::new(tributary_net::ProxyPolicy::direct()).unwrap();
        let profiles = ProfileCache::new(Vec::new());
        let url = format!("{}/v0/trending/notes", server.uri());
        let events = fetch_api_notes(&transport, &profiles, &url).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "e1");
        assert_eq!(profiles.cached("pk1").await.unwrap().name, "alice");
    }
}
