//! Feed engine configuration.
//!
//! Everything has a sensible default; each knob can be overridden
//! with a `TRIBUTARY_*` environment variable. List-valued variables
//! are comma-separated.

use std::time::Duration;

use tributary_net::{ProxyPolicy, Transport};

/// General-purpose relays for content and profile queries.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.primal.net",
    "wss://nostr.wine",
];

/// Curated relays with a better signal-to-noise ratio, tried first
/// for untopiced text feeds.
pub const DEFAULT_CURATED_RELAYS: &[&str] = &["wss://140.f7z.io"];

/// Known mirror hosts for the Twitter frontend. Individually
/// unreliable; the fallback resolver shuffles and walks them.
pub const DEFAULT_NITTER_MIRRORS: &[&str] = &[
    "xcancel.com",
    "nitter.space",
    "nitter.poast.org",
    "nitter.moomoo.me",
    "nitter.privacydev.net",
    "nuku.trabun.org",
    "lightbrd.com",
    "nitter.no-logs.com",
    "nitter.cz",
    "nitter.rawbit.ninja",
    "nitter.uni-sonia.com",
    "nitter.tinfoil-hat.net",
    "nitter.privacy.com.de",
];

/// Feeds pulled by the generic RSS adapter when none are configured.
pub const DEFAULT_RSS_FEEDS: &[&str] = &[
    "https://hnrss.org/frontpage",
    "https://lobste.rs/rss",
];

/// Runtime configuration for the feed engine.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// General-purpose relays.
    pub relays: Vec<String>,
    /// Curated relays, tried before the general pool for text feeds.
    pub curated_relays: Vec<String>,
    /// Mirror hosts for the Twitter frontend.
    pub nitter_mirrors: Vec<String>,
    /// CORS indirection proxy prefix. `None` (the default) routes all
    /// requests directly, which is correct for server-side use.
    pub proxy_base: Option<String>,
    /// Hosts that bypass the proxy even when one is configured.
    pub direct_hosts: Vec<String>,
    /// How long resolved actor profiles stay fresh.
    pub profile_ttl: Duration,
    /// Hard deadline for each source adapter per fetch cycle.
    pub adapter_timeout: Duration,
    pub mastodon_instance: String,
    pub misskey_instance: String,
    pub lemmy_instance: String,
    /// Subreddit queried when no topic is given.
    pub default_subreddit: String,
    pub rss_feeds: Vec<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            relays: to_owned(DEFAULT_RELAYS),
            curated_relays: to_owned(DEFAULT_CURATED_RELAYS),
            nitter_mirrors: to_owned(DEFAULT_NITTER_MIRRORS),
            proxy_base: None,
            direct_hosts: vec!["misskey.io".to_string(), "misskey.design".to_string()],
            profile_ttl: Duration::from_secs(600),
            adapter_timeout: Duration::from_secs(20),
            mastodon_instance: "https://mastodon.social".to_string(),
            misskey_instance: "https://misskey.io".to_string(),
            lemmy_instance: "https://lemmy.world".to_string(),
            default_subreddit: "popular".to_string(),
            rss_feeds: to_owned(DEFAULT_RSS_FEEDS),
        }
    }
}

fn to_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn env_list(key: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default,
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> anyhow::Result<Duration> {
    match std::env::var(key) {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid {key}={raw}: {e}"))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}

impl FeedConfig {
    /// Load configuration from the environment, on top of defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            relays: env_list("TRIBUTARY_RELAYS", defaults.relays),
            curated_relays: env_list("TRIBUTARY_CURATED_RELAYS", defaults.curated_relays),
            nitter_mirrors: env_list("TRIBUTARY_NITTER_MIRRORS", defaults.nitter_mirrors),
            proxy_base: std::env::var("TRIBUTARY_PROXY_BASE").ok().filter(|s| !s.is_empty()),
            direct_hosts: env_list("TRIBUTARY_DIRECT_HOSTS", defaults.direct_hosts),
            profile_ttl: env_secs("TRIBUTARY_PROFILE_TTL_SECS", defaults.profile_ttl)?,
            adapter_timeout: env_secs(
                "TRIBUTARY_ADAPTER_TIMEOUT_SECS",
                defaults.adapter_timeout,
            )?,
            mastodon_instance: env_string(
                "TRIBUTARY_MASTODON_INSTANCE",
                defaults.mastodon_instance,
            ),
            misskey_instance: env_string(
                "TRIBUTARY_MISSKEY_INSTANCE",
                defaults.misskey_instance,
            ),
            lemmy_instance: env_string("TRIBUTARY_LEMMY_INSTANCE", defaults.lemmy_instance),
            default_subreddit: env_string(
                "TRIBUTARY_DEFAULT_SUBREDDIT",
                defaults.default_subreddit,
            ),
            rss_feeds: env_list("TRIBUTARY_RSS_FEEDS", defaults.rss_feeds),
        };

        tracing::info!(
            relays = config.relays.len(),
            nitter_mirrors = config.nitter_mirrors.len(),
            rss_feeds = config.rss_feeds.len(),
            proxied = config.proxy_base.is_some(),
            adapter_timeout_secs = config.adapter_timeout.as_secs(),
            "feed configuration loaded"
        );
        Ok(config)
    }

    /// HTTP transport honoring this configuration's proxy policy.
    pub fn transport(&self) -> tributary_net::Result<Transport> {
        let policy = match &self.proxy_base {
            Some(base) => ProxyPolicy::new(base.clone(), self.direct_hosts.iter().cloned()),
            None => ProxyPolicy::direct(),
        };
        Transport::new(policy)
    }
}
