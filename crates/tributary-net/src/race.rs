//! First-non-empty strategy racing.
//!
//! A logical fetch often has several independent acquisition
//! strategies: a centralized aggregation API (fast when it works,
//! frequently blocked) and direct relay queries (slower, more
//! reliable). Racing them adopts whichever produces data first
//! instead of paying the slow path's latency up front.

use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};

/// Run every strategy concurrently and resolve with the first
/// non-empty result. Strategies that complete later are abandoned and
/// their results discarded.
///
/// Errors and empty results are equivalent here: a strategy that
/// fails simply never wins. When every strategy ends empty or failed
/// the race resolves to an empty vec - never an error, since "nothing
/// found anywhere" is a valid terminal state.
pub async fn first_non_empty<T, E, F>(strategies: impl IntoIterator<Item = F>) -> Vec<T>
where
    F: Future<Output = Result<Vec<T>, E>>,
    E: std::fmt::Display,
{
    let mut pending: FuturesUnordered<F> = strategies.into_iter().collect();

    while let Some(outcome) = pending.next().await {
        match outcome {
            Ok(items) if !items.is_empty() => return items,
            Ok(_) => {}
            Err(err) => tracing::debug!(error = %err, "strategy lost the race"),
        }
    }

    Vec::new()
}
