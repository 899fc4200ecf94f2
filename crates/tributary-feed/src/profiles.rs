//! Actor identity resolution with a TTL cache.
//!
//! Relay events carry only a public key; rendering a feed needs the
//! author's self-asserted profile, published as a metadata event
//! (kind 0). This module batches lookups for many actors into one
//! relay query, picks the newest metadata event per actor, and caches
//! the result so repeated fetch cycles don't re-query.
//!
//! A cache miss means "unresolved", never "empty profile": parse
//! failures and absent metadata leave no cache entry behind, so the
//! next batch will try again.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};

use tributary_core::{Filter, RelayEvent, KIND_METADATA};
use tributary_net::RelayClient;

/// Default time-to-live for resolved profiles.
pub const DEFAULT_PROFILE_TTL: Duration = Duration::from_secs(600);

/// Default cache capacity (number of actors).
pub const DEFAULT_PROFILE_CAPACITY: u64 = 10_000;

/// Cap on actors per relay query; relays reject filters with too many
/// authors. Excess keys are dropped from this batch, not queued.
pub const PROFILE_BATCH_LIMIT: usize = 50;

/// Timeout for metadata queries. Materially shorter than content
/// queries - profile resolution must never become the bottleneck for
/// rendering a feed.
pub const PROFILE_QUERY_TIMEOUT: Duration = Duration::from_millis(2500);

/// A resolved actor identity, derived from the newest metadata event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub pubkey: String,
    pub name: String,
    pub display_name: String,
    /// Verified handle (e.g. `user@domain`). Empty when unverified.
    pub nip05: String,
    pub picture: String,
    pub about: String,
}

/// Wire shape of a metadata event's JSON content. Every field is
/// optional; unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
struct ProfileMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "displayName")]
    display_name: Option<String>,
    #[serde(default)]
    nip05: Option<String>,
    #[serde(default, alias = "image")]
    picture: Option<String>,
    #[serde(default)]
    about: Option<String>,
}

impl ActorProfile {
    /// Parse a metadata event's content. `None` on malformed JSON -
    /// the actor stays unresolved.
    pub(crate) fn from_metadata_event(event: &RelayEvent) -> Option<Self> {
        let meta: ProfileMetadata = serde_json::from_str(&event.content).ok()?;
        Some(Self {
            pubkey: event.pubkey.clone(),
            display_name: meta
                .display_name
                .clone()
                .or_else(|| meta.name.clone())
                .unwrap_or_default(),
            name: meta.name.unwrap_or_default(),
            nip05: meta.nip05.unwrap_or_default(),
            picture: meta.picture.unwrap_or_default(),
            about: meta.about.unwrap_or_default(),
        })
    }
}

/// Batching, deduplicating, TTL-cached profile resolver.
pub struct ProfileCache {
    cache: Cache<String, ActorProfile>,
    client: RelayClient,
    relays: Vec<String>,
    query_timeout: Duration,
}

impl ProfileCache {
    pub fn new(relays: Vec<String>) -> Self {
        Self::with_ttl(relays, DEFAULT_PROFILE_TTL, DEFAULT_PROFILE_CAPACITY)
    }

    pub fn with_ttl(relays: Vec<String>, ttl: Duration, capacity: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            client: RelayClient::default(),
            relays,
            query_timeout: PROFILE_QUERY_TIMEOUT,
        }
    }

    /// Resolve profiles for a set of actor keys.
    ///
    /// Deduplicates the input, serves unexpired entries from cache,
    /// and issues at most one relay query (capped at
    /// [`PROFILE_BATCH_LIMIT`] actors) for the rest. Returns the
    /// union of cached and newly resolved profiles; actors with no
    /// parseable metadata are absent from the map.
    pub async fn resolve(&self, pubkeys: &[String]) -> HashMap<String, ActorProfile> {
        let mut result = HashMap::new();
        let mut to_fetch: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for pk in pubkeys {
            if !seen.insert(pk.as_str()) {
                continue;
            }
            match self.cache.get(pk).await {
                Some(profile) => {
                    result.insert(pk.clone(), profile);
                }
                None => to_fetch.push(pk.clone()),
            }
        }

        if to_fetch.is_empty() || self.relays.is_empty() {
            return result;
        }

        to_fetch.truncate(PROFILE_BATCH_LIMIT);
        tracing::debug!(count = to_fetch.len(), "fetching profiles from relays");

        let filter = Filter::new()
            .kinds([KIND_METADATA])
            .authors(to_fetch.clone())
            .limit(to_fetch.len() * 2);
        let events = self
            .client
            .query(&filter, &self.relays, self.query_timeout)
            .await;
        metrics::counter!("profile_metadata_events_total").increment(events.len() as u64);

        for (pk, profile) in resolve_from_events(&events) {
            self.cache.insert(pk.clone(), profile.clone()).await;
            result.insert(pk, profile);
        }

        result
    }

    /// Insert a profile obtained out-of-band (e.g. embedded in an
    /// aggregation API response) so a later relay fetch is skipped.
    pub async fn prime(&self, profile: ActorProfile) {
        self.cache.insert(profile.pubkey.clone(), profile).await;
    }

    /// Cached profile for one actor, if unexpired.
    pub async fn cached(&self, pubkey: &str) -> Option<ActorProfile> {
        self.cache.get(pubkey).await
    }
}

/// Pick the newest metadata event per actor and parse it.
///
/// Ties on `created_at` break toward the lexicographically smaller
/// event id, so the winner is deterministic regardless of relay
/// arrival order. Actors whose winning event fails to parse are
/// simply absent - one bad profile never affects its siblings.
fn resolve_from_events(events: &[RelayEvent]) -> HashMap<String, ActorProfile> {
    let mut newest: HashMap<&str, &RelayEvent> = HashMap::new();
    for event in events {
        newest
            .entry(event.pubkey.as_str())
            .and_modify(|current| {
                let replace = event.created_at > current.created_at
                    || (event.created_at == current.created_at && event.id < current.id);
                if replace {
                    *current = event;
                }
            })
            .or_insert(event);
    }

    newest
        .into_values()
        .filter_map(|event| {
            let profile = ActorProfile::from_metadata_event(event);
            if profile.is_none() {
                tracing::debug!(pubkey = %event.pubkey, "unparseable profile metadata");
            }
            profile.map(|p| (event.pubkey.clone(), p))
        })
        .collect()
}

/// Best display string for an actor: verified handle (normalized past
/// the `_@` root marker) > display name > short name > truncated key.
pub fn display_name(profile: Option<&ActorProfile>, pubkey: &str) -> String {
    let Some(profile) = profile else {
        return truncate(pubkey, 12);
    };
    if !profile.nip05.is_empty() {
        return strip_root_marker(&profile.nip05).to_string();
    }
    if !profile.display_name.is_empty() {
        return profile.display_name.clone();
    }
    if !profile.name.is_empty() {
        return profile.name.clone();
    }
    truncate(pubkey, 12)
}

/// Best handle for an actor: verified handle > `@` + short name >
/// truncated key.
pub fn handle(profile: Option<&ActorProfile>, pubkey: &str) -> String {
    let Some(profile) = profile else {
        return truncate(pubkey, 16);
    };
    if !profile.nip05.is_empty() {
        return strip_root_marker(&profile.nip05).to_string();
    }
    if !profile.name.is_empty() {
        return format!("@{}", profile.name);
    }
    truncate(pubkey, 16)
}

/// `_@domain` is the convention for a domain-root identifier; display
/// it as just the domain.
fn strip_root_marker(nip05: &str) -> &str {
    nip05.strip_prefix("_@").unwrap_or(nip05)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
