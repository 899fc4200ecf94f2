//! Error types for the feed aggregation layer.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Errors that can occur while assembling a unified feed.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Every selected adapter failed this cycle. The only
    /// orchestrator-level error a caller ever sees.
    #[error("all {attempted} feed sources failed")]
    AllAdaptersFailed {
        /// Number of adapters that were attempted.
        attempted: usize,
    },

    /// Acquisition failure bubbled up from the engine.
    #[error(transparent)]
    Net(#[from] tributary_net::NetError),

    /// A response body could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// JSON decode failure for a whole response (single malformed
    /// items are skipped, not errored).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_adapters_failed_display() {
        let err = FeedError::AllAdaptersFailed { attempted: 5 };
        assert_eq!(err.to_string(), "all 5 feed sources failed");
    }

    #[test]
    fn net_error_passes_through() {
        let err: FeedError = tributary_net::NetError::Http { status: 429 }.into();
        assert_eq!(err.to_string(), "HTTP 429");
    }
}
