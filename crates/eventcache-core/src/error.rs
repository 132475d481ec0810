//! Error types for the event cache.

use thiserror::Error;

/// Errors that can occur when fetching events from the remote service.
#[derive(Debug, Error)]
pub enum EventCacheError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rate limited.
    #[error("rate limited{}", match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    })]
    RateLimited {
        /// Seconds to wait before retrying (from Retry-After header, optional).
        retry_after_secs: Option<u64>,
    },

    /// Error reported by the remote service.
    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Invalid response from server.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
