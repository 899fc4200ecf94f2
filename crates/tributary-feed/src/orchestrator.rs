//! Aggregation orchestrator.
//!
//! Fans one fetch request out to every eligible adapter, each under
//! its own hard deadline, and streams a freshly merged and re-sorted
//! snapshot to the consumer as each adapter lands. A fetch cycle is
//! tagged with a generation number; starting a new cycle supersedes
//! the previous one, whose late snapshots are silently dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Mutex;

use tributary_core::{filter_by_category, Category, UnifiedPost};

use crate::adapters::{FetchOptions, SourceAdapter};
use crate::error::{FeedError, Result};

/// Hard per-adapter deadline. A hung upstream loses its slot; the
/// cycle completes with whatever the others produced.
pub const ADAPTER_TIMEOUT: Duration = Duration::from_secs(20);

/// One aggregation request.
#[derive(Debug, Clone, Default)]
pub struct FeedRequest {
    pub topic: Option<String>,
    pub category: Category,
    /// Restrict to one source by name (as serialized, e.g.
    /// "nostr-photos"). Case-insensitive.
    pub source: Option<String>,
    pub force_refresh: bool,
}

/// Outcome counts for a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub posts: usize,
}

/// Streamed progress of one fetch cycle.
#[derive(Debug)]
pub enum FeedUpdate {
    /// The full merged feed so far, re-sorted. Each snapshot replaces
    /// the previous one.
    Snapshot(Vec<UnifiedPost>),
    /// Terminal message. `Err` only when every adapter failed.
    Done(Result<FeedSummary>),
}

pub struct FeedOrchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    generation: Arc<AtomicU64>,
    adapter_timeout: Duration,
}

/// Merge order: newest first, with a stable tiebreak so equal
/// timestamps don't shuffle between snapshots.
fn sort_merged(posts: &mut [UnifiedPost]) {
    posts.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.id.cmp(&b.id))
    });
}

impl FeedOrchestrator {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self::with_timeout(adapters, ADAPTER_TIMEOUT)
    }

    pub fn with_timeout(adapters: Vec<Arc<dyn SourceAdapter>>, adapter_timeout: Duration) -> Self {
        Self {
            adapters,
            generation: Arc::new(AtomicU64::new(0)),
            adapter_timeout,
        }
    }

    /// Adapters eligible for a request: an explicit source selects
    /// exactly that adapter, otherwise category support decides.
    fn select(&self, request: &FeedRequest) -> Vec<Arc<dyn SourceAdapter>> {
        match &request.source {
            Some(name) => self
                .adapters
                .iter()
                .filter(|a| a.source().as_str().eq_ignore_ascii_case(name))
                .cloned()
                .collect(),
            None => self
                .adapters
                .iter()
                .filter(|a| a.supports(request.category))
                .cloned()
                .collect(),
        }
    }

    /// Start a fetch cycle. Returns a stream of [`FeedUpdate`]s;
    /// the channel closes after `Done` (or earlier if this cycle is
    /// superseded by a newer one).
    pub fn fetch(&self, request: FeedRequest) -> mpsc::Receiver<FeedUpdate> {
        let (tx, rx) = mpsc::channel(16);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.generation);
        let adapters = self.select(&request);
        let adapter_timeout = self.adapter_timeout;

        tracing::info!(
            generation,
            adapters = adapters.len(),
            topic = request.topic.as_deref().unwrap_or(""),
            category = ?request.category,
            "starting fetch cycle"
        );

        tokio::spawn(async move {
            let attempted = adapters.len();
            let merged: Arc<Mutex<Vec<UnifiedPost>>> = Arc::new(Mutex::new(Vec::new()));
            let succeeded = Arc::new(AtomicU64::new(0));
            let options = FetchOptions {
                force_refresh: request.force_refresh,
                category: request.category,
            };

            let tasks = adapters.into_iter().map(|adapter| {
                let merged = Arc::clone(&merged);
                let succeeded = Arc::clone(&succeeded);
                let current = Arc::clone(&current);
                let tx = tx.clone();
                let topic = request.topic.clone();
                let options = options.clone();
                let category = request.category;

                async move {
                    let name = adapter.source().as_str();
                    let outcome = tokio::time::timeout(
                        adapter_timeout,
                        adapter.fetch_posts(topic.as_deref(), &options),
                    )
                    .await;

                    let posts = match outcome {
                        Ok(Ok(posts)) => posts,
                        Ok(Err(err)) => {
                            tracing::warn!(source = name, error = %err, "adapter failed");
                            metrics::counter!("adapter_failures_total", "source" => name)
                                .increment(1);
                            return;
                        }
                        Err(_) => {
                            tracing::warn!(source = name, "adapter timed out");
                            metrics::counter!("adapter_timeouts_total", "source" => name)
                                .increment(1);
                            return;
                        }
                    };

                    // An empty result is still a success; the source
                    // simply had nothing for this request.
                    succeeded.fetch_add(1, Ordering::SeqCst);
                    metrics::counter!("adapter_posts_total", "source" => name)
                        .increment(posts.len() as u64);

                    let snapshot = {
                        let mut merged = merged.lock().await;
                        merged.extend(filter_by_category(posts, category));
                        sort_merged(&mut merged);
                        merged.clone()
                    };

                    if current.load(Ordering::SeqCst) == generation {
                        let _ = tx.send(FeedUpdate::Snapshot(snapshot)).await;
                    }
                }
            });

            futures::future::join_all(tasks).await;

            if current.load(Ordering::SeqCst) != generation {
                tracing::debug!(generation, "fetch cycle superseded, dropping result");
                return;
            }

            let succeeded = succeeded.load(Ordering::SeqCst) as usize;
            let result = if succeeded == 0 && attempted > 0 {
                Err(FeedError::AllAdaptersFailed { attempted })
            } else {
                let posts = merged.lock().await.len();
                Ok(FeedSummary {
                    attempted,
                    succeeded,
                    posts,
                })
            };
            let _ = tx.send(FeedUpdate::Done(result)).await;
        });

        rx
    }

    /// Sources this orchestrator can serve, with descriptions.
    pub fn sources(&self) -> Vec<(&'static str, &'static str)> {
        self.adapters
            .iter()
            .map(|a| (a.source().as_str(), a.description()))
            .collect()
    }
}

/// Drive a cycle to completion and return the final merged feed.
pub async fn collect_feed(
    orchestrator: &FeedOrchestrator,
    request: FeedRequest,
) -> Result<Vec<UnifiedPost>> {
    let mut rx = orchestrator.fetch(request);
    let mut latest = Vec::new();
    while let Some(update) = rx.recv().await {
        match update {
            FeedUpdate::Snapshot(posts) => latest = posts,
            FeedUpdate::Done(Ok(_)) => return Ok(latest),
            FeedUpdate::Done(Err(err)) => return Err(err),
        }
    }
    Ok(latest)
}

// =============================================================================
// Tests
// =============================================================================
