//! Concurrent relay query client.
//!
//! Connections to all relays are opened concurrently and each runs
//! against its own deadline, bounded by the caller's global timeout.
//! A single slow or dead relay never blocks collection from the
//! others, and any subset of relays may fail without failing the
//! query: the worst case is simply fewer events.
//!
//! Per-connection lifecycle: connect (one immediate retry on
//! failure), send the subscription once, buffer incoming events until
//! EOSE, the deadline, or a socket error. Events already delivered
//! before the EOSE frame is processed count; frames after it do not -
//! EOSE closes that relay's collection.

use std::collections::HashSet;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use tributary_core::{Filter, RelayEvent};

use super::wire::{self, RelayMessage};

/// Queries a set of relays with bounded retry and latency.
#[derive(Debug, Clone)]
pub struct RelayClient {
    /// Extra connection attempts after the first failure.
    connect_retries: u32,
}

impl Default for RelayClient {
    fn default() -> Self {
        Self { connect_retries: 1 }
    }
}

/// Query all relays with the default client. See [`RelayClient::query`].
pub async fn query_relays(
    filter: &Filter,
    relay_urls: &[String],
    timeout: Duration,
) -> Vec<RelayEvent> {
    RelayClient::default().query(filter, relay_urls, timeout).await
}

impl RelayClient {
    pub fn new(connect_retries: u32) -> Self {
        Self { connect_retries }
    }

    /// Issue the same subscription to every relay concurrently and
    /// return the merged result: deduplicated by event id (first seen
    /// wins - ids are content-addressed, so duplicates are identical)
    /// and sorted by `created_at` descending.
    ///
    /// Never fails; relays that cannot be reached contribute zero
    /// events.
    pub async fn query(
        &self,
        filter: &Filter,
        relay_urls: &[String],
        timeout: Duration,
    ) -> Vec<RelayEvent> {
        let sub_id: String = {
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(8)
                .map(char::from)
                .collect();
            format!("sub_{suffix}")
        };

        let req = match wire::req_frame(&sub_id, filter) {
            Ok(req) => req,
            Err(err) => {
                tracing::error!(error = %err, "failed to encode subscription");
                return Vec::new();
            }
        };

        let deadline = Instant::now() + timeout;
        metrics::counter!("relay_queries_total").increment(1);

        let queries = relay_urls
            .iter()
            .map(|url| self.query_one(url.clone(), req.clone(), sub_id.clone(), deadline));
        let buffers = futures::future::join_all(queries).await;

        let merged = merge_events(buffers);
        tracing::debug!(
            relays = relay_urls.len(),
            events = merged.len(),
            "relay query complete"
        );
        merged
    }

    /// One relay connection, bounded by `deadline`. Always resolves;
    /// failures contribute an empty buffer.
    async fn query_one(
        &self,
        url: String,
        req: String,
        sub_id: String,
        deadline: Instant,
    ) -> Vec<RelayEvent> {
        // Bounded connect loop: first attempt plus `connect_retries`
        // immediate retries, all under the deadline.
        let mut remaining = self.connect_retries + 1;
        let ws = loop {
            match timeout_at(deadline, connect_async(url.as_str())).await {
                Ok(Ok((ws, _response))) => break ws,
                Ok(Err(err)) => {
                    remaining -= 1;
                    metrics::counter!("relay_connect_failures_total").increment(1);
                    if remaining == 0 {
                        tracing::warn!(relay = %url, error = %err, "relay unreachable");
                        return Vec::new();
                    }
                    tracing::debug!(relay = %url, error = %err, "connect failed, retrying");
                }
                Err(_) => {
                    tracing::warn!(relay = %url, "relay connect timed out");
                    return Vec::new();
                }
            }
        };

        let (mut sink, mut stream) = ws.split();
        if let Err(err) = sink.send(Message::Text(req)).await {
            tracing::warn!(relay = %url, error = %err, "failed to send subscription");
            return Vec::new();
        }

        let mut events = Vec::new();
        loop {
            let frame = match timeout_at(deadline, stream.next()).await {
                // Per-relay deadline: give up waiting, keep what we have.
                Err(_) => {
                    tracing::debug!(relay = %url, "relay deadline reached");
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(err))) => {
                    tracing::debug!(relay = %url, error = %err, "relay socket error");
                    break;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => break,
                // Pings are answered by the protocol layer on the next
                // write; nothing to collect from them.
                _ => continue,
            };

            match RelayMessage::parse(&text) {
                Ok(RelayMessage::Event { sub_id: sid, event }) if sid == sub_id => {
                    metrics::counter!("relay_events_total").increment(1);
                    events.push(event);
                }
                Ok(RelayMessage::Eose { sub_id: sid }) if sid == sub_id => {
                    tracing::debug!(relay = %url, events = events.len(), "EOSE");
                    break;
                }
                Ok(RelayMessage::Closed { reason, .. }) => {
                    tracing::debug!(relay = %url, reason = %reason, "subscription closed by relay");
                    break;
                }
                Ok(RelayMessage::Notice { message }) => {
                    tracing::debug!(relay = %url, notice = %message, "relay notice");
                }
                Ok(_) => {}
                Err(err) => {
                    // One bad frame never aborts the stream.
                    tracing::debug!(relay = %url, error = %err, "unparseable frame");
                }
            }
        }

        // Best-effort subscription teardown; the connection is
        // ephemeral either way.
        if let Ok(close) = wire::close_frame(&sub_id) {
            let _ = sink.send(Message::Text(close)).await;
        }
        let _ = sink.close().await;

        events
    }
}

/// Merge per-relay buffers: first-seen dedupe by id, then sort by
/// `created_at` descending with id as a deterministic tiebreak.
pub(crate) fn merge_events(buffers: Vec<Vec<RelayEvent>>) -> Vec<RelayEvent> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged: Vec<RelayEvent> = Vec::new();

    for buffer in buffers {
        for event in buffer {
            if seen.insert(event.id.clone()) {
                merged.push(event);
            }
        }
    }

    merged.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, created_at: u64) -> RelayEvent {
        RelayEvent {
            id: id.to_string(),
            pubkey: "pk".to_string(),
            created_at,
            kind: 1,
            tags: Vec::new(),
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn merge_deduplicates_by_id_first_seen_wins() {
        let merged = merge_events(vec![
            vec![event("a", 10), event("b", 20)],
            vec![event("a", 10), event("c", 5)],
        ]);
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn merge_sorts_newest_first() {
        let merged = merge_events(vec![vec![event("a", 1), event("b", 3), event("c", 2)]]);
        let times: Vec<_> = merged.iter().map(|e| e.created_at).collect();
        assert_eq!(times, vec![3, 2, 1]);
        for pair in merged.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }

    #[test]
    fn merge_breaks_timestamp_ties_by_id() {
        let merged = merge_events(vec![vec![event("z", 5), event("a", 5)]]);
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "z"]);
    }

    #[tokio::test]
    async fn unreachable_relays_contribute_zero_events() {
        // Nothing listens on this port; both connect attempts fail fast.
        let relays = vec!["ws://127.0.0.1:1".to_string()];
        let events = query_relays(
            &Filter::new().kinds([1]),
            &relays,
            Duration::from_millis(500),
        )
        .await;
        assert!(events.is_empty());
    }
}
