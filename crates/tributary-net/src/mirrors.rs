//! Multi-endpoint fallback resolver.
//!
//! Many of the upstream services are fronted by interchangeable,
//! independently operated mirrors of wildly varying quality: any one
//! may be down, rate-limited, or serving a bot-block page with a 200
//! status. The resolver walks a freshly shuffled mirror list, retries
//! each mirror against a small budget, validates the body when asked,
//! and falls through to the indirection proxy as a last resort.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{NetError, Result};
use crate::transport::Transport;

/// Attempts per mirror before moving on.
pub const DEFAULT_ATTEMPTS_PER_MIRROR: u32 = 2;

/// Initial backoff between attempts on the same mirror; doubles per
/// attempt.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Body sanity predicate. Returning false marks the mirror as failed
/// even though it answered 200 (block pages, CAPTCHA interstitials).
pub type Validator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Per-call options for [`FallbackResolver::fetch_with_fallback`].
#[derive(Clone, Default)]
pub struct FallbackOptions {
    /// Optional content validation predicate.
    pub validate: Option<Validator>,
    /// After exhausting all mirrors, try once more through the
    /// indirection proxy against the first mirror's URL shape.
    pub proxy_last_resort: bool,
    /// Seed for the mirror shuffle. `None` uses ambient entropy;
    /// tests inject a seed for a reproducible order.
    pub shuffle_seed: Option<u64>,
}

impl FallbackOptions {
    pub fn validated(validate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            validate: Some(Arc::new(validate)),
            ..Self::default()
        }
    }

    pub fn with_proxy_last_resort(mut self) -> Self {
        self.proxy_last_resort = true;
        self
    }
}

/// Resolves one logical path against a set of interchangeable mirrors.
#[derive(Debug, Clone)]
pub struct FallbackResolver {
    transport: Transport,
    attempts_per_mirror: u32,
    initial_backoff: Duration,
}

impl FallbackResolver {
    pub fn new(transport: Transport) -> Self {
        Self::with_retry(
            transport,
            DEFAULT_ATTEMPTS_PER_MIRROR,
            DEFAULT_INITIAL_BACKOFF,
        )
    }

    pub fn with_retry(
        transport: Transport,
        attempts_per_mirror: u32,
        initial_backoff: Duration,
    ) -> Self {
        Self {
            transport,
            attempts_per_mirror: attempts_per_mirror.max(1),
            initial_backoff,
        }
    }

    /// Try each mirror in a fresh shuffled order until one yields
    /// acceptable text. Only exhaustion of every mirror (plus the
    /// optional proxy attempt) is fatal.
    pub async fn fetch_with_fallback(
        &self,
        path: &str,
        mirrors: &[String],
        options: FallbackOptions,
    ) -> Result<String> {
        let mut shuffled: Vec<&String> = mirrors.iter().collect();
        let mut rng = match options.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        shuffled.shuffle(&mut rng);

        for mirror in &shuffled {
            let url = mirror_url(mirror, path);

            match self.try_mirror(&url, options.validate.as_ref()).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    metrics::counter!("mirror_failures_total").increment(1);
                    tracing::warn!(mirror = %mirror, error = %err, "mirror failed");
                }
            }
        }

        if options.proxy_last_resort {
            if let Some(first) = mirrors.first() {
                let url = mirror_url(first, path);
                tracing::info!(url = %url, "all mirrors failed, trying proxy fallback");
                if let Ok(text) = self.transport.fetch_text_via_proxy(&url).await {
                    return Ok(text);
                }
            }
        }

        Err(NetError::AllMirrorsFailed {
            attempted: mirrors.len(),
        })
    }

    /// One mirror, with its retry budget. Transport failures are
    /// retried with exponential backoff; a validation failure is not,
    /// since the mirror is answering but serving garbage.
    async fn try_mirror(&self, url: &str, validate: Option<&Validator>) -> Result<String> {
        let mut backoff = self.initial_backoff;

        for attempt in 0..self.attempts_per_mirror {
            metrics::counter!("mirror_attempts_total").increment(1);

            match self.transport.fetch_text(url).await {
                Ok(text) => {
                    if let Some(validate) = validate {
                        if !validate(&text) {
                            tracing::warn!(url = %url, "mirror answered 200 but failed validation");
                            return Err(NetError::InvalidUrl(format!(
                                "content validation failed for {url}"
                            )));
                        }
                    }
                    return Ok(text);
                }
                Err(err) => {
                    tracing::debug!(url = %url, attempt, error = %err, "mirror attempt failed");
                    if attempt + 1 < self.attempts_per_mirror {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    } else {
                        return Err(err);
                    }
                }
            }
        }

        unreachable!("retry loop always returns")
    }
}

/// Build an absolute URL for a mirror entry. Entries are hostnames;
/// explicit schemes are accepted so tests can point at local servers.
fn mirror_url(mirror: &str, path: &str) -> String {
    let base = if mirror.starts_with("http://") || mirror.starts_with("https://") {
        mirror.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", mirror.trim_end_matches('/'))
    };
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ProxyPolicy;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver() -> FallbackResolver {
        let transport = Transport::new(ProxyPolicy::direct()).unwrap();
        FallbackResolver::with_retry(transport, 2, Duration::from_millis(1))
    }

    #[test]
    fn mirror_url_inserts_scheme_and_slash() {
        assert_eq!(mirror_url("xcancel.com", "/search"), "https://xcancel.com/search");
        assert_eq!(mirror_url("xcancel.com", "search"), "https://xcancel.com/search");
        assert_eq!(
            mirror_url("http://127.0.0.1:9000", "/search"),
            "http://127.0.0.1:9000/search"
        );
    }

    #[tokio::test]
    async fn first_healthy_mirror_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let mirrors = vec![server.uri()];
        let text = resolver()
            .fetch_with_fallback("/feed", &mirrors, FallbackOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn exhausts_every_mirror_with_full_retry_budget() {
        let a = MockServer::start().await;
        let b = MockServer::start().await;
        for server in [&a, &b] {
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(500))
                .expect(2) // retry budget per mirror
                .mount(server)
                .await;
        }

        let mirrors = vec![a.uri(), b.uri()];
        let err = resolver()
            .fetch_with_fallback("/feed", &mirrors, FallbackOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::AllMirrorsFailed { attempted: 2 }));
    }

    #[tokio::test]
    async fn validation_failure_moves_to_next_mirror() {
        let blocked = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Verify your request"))
            .mount(&blocked)
            .await;
        let healthy = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss>real</rss>"))
            .mount(&healthy)
            .await;

        let mirrors = vec![blocked.uri(), healthy.uri()];
        let text = resolver()
            .fetch_with_fallback(
                "/feed",
                &mirrors,
                FallbackOptions::validated(|body| body.contains("<rss")),
            )
            .await
            .unwrap();
        assert_eq!(text, "<rss>real</rss>");
    }

    #[tokio::test]
    async fn all_invalid_mirrors_fail_without_proxy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("bot protection"))
            .mount(&server)
            .await;

        let mirrors = vec![server.uri()];
        let err = resolver()
            .fetch_with_fallback(
                "/feed",
                &mirrors,
                FallbackOptions::validated(|body| body.contains("<rss")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::AllMirrorsFailed { attempted: 1 }));
    }

    #[tokio::test]
    async fn proxy_last_resort_rescues_exhausted_mirrors() {
        let dead = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&dead)
            .await;

        let proxy = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/get"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"contents":"rescued"}"#),
            )
            .mount(&proxy)
            .await;

        // Local mirrors are on the direct list so the normal attempts
        // hit them (and fail); force_proxy ignores the direct list.
        let policy = ProxyPolicy::new(
            format!("{}/get?url=", proxy.uri()),
            vec!["127.0.0.1".to_string()],
        );
        let transport = Transport::new(policy).unwrap();
        let resolver = FallbackResolver::with_retry(transport, 1, Duration::from_millis(1));

        let mirrors = vec![dead.uri()];
        let text = resolver
            .fetch_with_fallback(
                "/feed",
                &mirrors,
                FallbackOptions::default().with_proxy_last_resort(),
            )
            .await
            .unwrap();
        assert_eq!(text, "rescued");
    }

    #[tokio::test]
    async fn shuffle_seed_gives_reproducible_order() {
        // Two mirrors, both healthy but with different bodies: the
        // same seed must pick the same winner every time.
        let a = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a"))
            .mount(&a)
            .await;
        let b = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("b"))
            .mount(&b)
            .await;

        let mirrors = vec![a.uri(), b.uri()];
        let opts = FallbackOptions {
            shuffle_seed: Some(7),
            ..FallbackOptions::default()
        };
        let first = resolver()
            .fetch_with_fallback("/feed", &mirrors, opts.clone())
            .await
            .unwrap();
        let second = resolver()
            .fetch_with_fallback("/feed", &mirrors, opts)
            .await
            .unwrap();
        assert_eq!(first, second);
    }
}
