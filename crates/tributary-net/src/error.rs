//! Error types for the acquisition engine.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors that can occur while acquiring data from upstream sources.
#[derive(Error, Debug)]
pub enum NetError {
    /// The response status was not successful.
    #[error("HTTP {status}")]
    Http {
        /// The non-2xx status code.
        status: u16,
    },

    /// The hard wall-clock timeout elapsed before a response arrived.
    #[error("request timed out after {millis}ms")]
    Timeout {
        /// The timeout that elapsed.
        millis: u64,
    },

    /// Transport-level request failure (DNS, connect, TLS, body read).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// WebSocket-level failure on a relay connection.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A URL could not be parsed or built.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Every mirror (and the proxy fallback, if enabled) failed.
    #[error("all {attempted} mirrors failed")]
    AllMirrorsFailed {
        /// Number of mirrors attempted before giving up.
        attempted: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_includes_status() {
        let err = NetError::Http { status: 503 };
        assert_eq!(err.to_string(), "HTTP 503");
    }

    #[test]
    fn timeout_display_includes_millis() {
        let err = NetError::Timeout { millis: 15000 };
        assert!(err.to_string().contains("15000ms"));
    }

    #[test]
    fn all_mirrors_failed_display() {
        let err = NetError::AllMirrorsFailed { attempted: 11 };
        assert_eq!(err.to_string(), "all 11 mirrors failed");
    }

    #[test]
    fn from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        let err: NetError = json_err.into();
        assert!(matches!(err, NetError::Json(_)));
    }
}
