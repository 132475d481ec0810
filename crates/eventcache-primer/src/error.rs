//! Error types for the cache primer.

use thiserror::Error;

/// Errors that can occur in primer operations.
#[derive(Debug, Error)]
pub enum PrimerError {
    /// Events service error.
    #[error("events service error: {0}")]
    Source(#[from] eventcache_core::EventCacheError),

    /// A batch fetch failed for a reason outside the events client.
    #[error("batch fetch failed: {0}")]
    FetchFailed(String),

    /// The background primer task is no longer running.
    #[error("cache primer has shut down")]
    ShutDown,
}
