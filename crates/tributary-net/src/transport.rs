//! Single-request HTTP transport with proxy routing.
//!
//! One call, one outbound request, one hard wall-clock timeout. Retry
//! and fallback logic lives in [`crate::mirrors`]; this layer only
//! decides whether a request goes direct or through the generic
//! indirection proxy, and maps failures into distinguishable errors.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{NetError, Result};

/// Hard wall-clock ceiling for a single request, enforced by
/// cancellation. Distinct from any caller-level deadline.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Where a request should be routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Fetch the target URL directly.
    Direct(String),
    /// Fetch through the indirection proxy; the response body is a
    /// JSON envelope whose `contents` field holds the real body.
    Proxied(String),
}

/// Injectable direct-vs-proxied routing decision.
///
/// Some hosts are known to allow direct cross-origin access (and some
/// actively block the proxy), so they bypass indirection entirely.
/// With no proxy base configured every request goes direct, which is
/// the natural setup for a server-side deployment.
#[derive(Debug, Clone, Default)]
pub struct ProxyPolicy {
    proxy_base: Option<String>,
    direct_hosts: Vec<String>,
}

impl ProxyPolicy {
    /// Route everything directly (no indirection proxy).
    pub fn direct() -> Self {
        Self::default()
    }

    /// Route through `proxy_base` except for `direct_hosts`.
    ///
    /// `proxy_base` is a prefix the URL-encoded target is appended to,
    /// e.g. `https://api.allorigins.win/get?url=`.
    pub fn new(
        proxy_base: impl Into<String>,
        direct_hosts: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            proxy_base: Some(proxy_base.into()),
            direct_hosts: direct_hosts.into_iter().collect(),
        }
    }

    /// Decide the route for a target URL.
    pub fn route(&self, target_url: &str) -> Route {
        let Some(base) = &self.proxy_base else {
            return Route::Direct(target_url.to_string());
        };

        if let Ok(parsed) = url::Url::parse(target_url) {
            if let Some(host) = parsed.host_str() {
                if self.direct_hosts.iter().any(|d| host.ends_with(d.as_str())) {
                    return Route::Direct(target_url.to_string());
                }
            }
        }

        Route::Proxied(format!("{base}{}", urlencoding::encode(target_url)))
    }

    /// Force the proxied route, regardless of host. Used by the
    /// fallback resolver's last-resort attempt.
    pub fn force_proxy(&self, target_url: &str) -> Option<Route> {
        self.proxy_base
            .as_ref()
            .map(|base| Route::Proxied(format!("{base}{}", urlencoding::encode(target_url))))
    }
}

/// JSON envelope returned by the indirection proxy.
#[derive(Debug, Deserialize)]
struct ProxyEnvelope {
    contents: String,
}

/// HTTP transport: performs one routed request with a bounded lifetime.
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    policy: ProxyPolicy,
    timeout: Duration,
}

impl Transport {
    pub fn new(policy: ProxyPolicy) -> Result<Self> {
        Self::with_timeout(policy, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(policy: ProxyPolicy, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("tributary/0.1")
            .build()?;
        Ok(Self {
            http,
            policy,
            timeout,
        })
    }

    pub fn policy(&self) -> &ProxyPolicy {
        &self.policy
    }

    /// Fetch a URL as text, routed per the proxy policy.
    pub async fn fetch_text(&self, target_url: &str) -> Result<String> {
        self.execute(self.policy.route(target_url)).await
    }

    /// Fetch a URL as text, forcing the indirection proxy.
    ///
    /// Fails with `InvalidUrl` when no proxy is configured.
    pub async fn fetch_text_via_proxy(&self, target_url: &str) -> Result<String> {
        let route = self
            .policy
            .force_proxy(target_url)
            .ok_or_else(|| NetError::InvalidUrl("no proxy configured".to_string()))?;
        self.execute(route).await
    }

    /// POST a JSON body and return the response text.
    ///
    /// POST always goes direct: the indirection proxy only relays GET.
    pub async fn post_json(&self, target_url: &str, body: &serde_json::Value) -> Result<String> {
        let request = self.http.post(target_url).json(body);
        let millis = self.timeout.as_millis() as u64;

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| NetError::Timeout { millis })??;

        let status = response.status();
        if !status.is_success() {
            return Err(NetError::Http {
                status: status.as_u16(),
            });
        }

        let text = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| NetError::Timeout { millis })??;
        Ok(text)
    }

    async fn execute(&self, route: Route) -> Result<String> {
        let (url, enveloped) = match route {
            Route::Direct(url) => (url, false),
            Route::Proxied(url) => (url, true),
        };
        let millis = self.timeout.as_millis() as u64;

        let response = tokio::time::timeout(self.timeout, self.http.get(&url).send())
            .await
            .map_err(|_| NetError::Timeout { millis })??;

        let status = response.status();
        if !status.is_success() {
            return Err(NetError::Http {
                status: status.as_u16(),
            });
        }

        let text = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| NetError::Timeout { millis })??;

        if enveloped {
            let envelope: ProxyEnvelope = serde_json::from_str(&text)?;
            Ok(envelope.contents)
        } else {
            Ok(text)
        }
    }
}
