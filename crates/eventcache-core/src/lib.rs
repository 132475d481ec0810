//! Chat event streams, local caching and reconciliation.
//!
//! This crate provides the pieces shared by every consumer of chat events:
//!
//! ## Features
//!
//! - **Types**: chat identities, partitions and the closed event model
//! - **Reconcile**: works out which indices of a requested range are cached
//!   and which still need fetching, in linear or windowed scans
//! - **Cache**: thread-safe sparse per-chat event store built on the reconciler
//! - **Bookmarks**: monotonic per-chat "last updated" markers
//! - **Client**: HTTP client for the batched events endpoint

pub mod bookmarks;
pub mod cache;
mod client;
mod error;
pub mod reconcile;
mod requests;
mod types;

pub use bookmarks::BookmarkStore;
pub use cache::{CacheUpdate, EventCache};
pub use client::EventsClient;
pub use error::EventCacheError;
pub use reconcile::{
    CachedEvents, MAX_EVENTS, MAX_MESSAGES, ReconcileLimits, process_cached_events,
    process_cached_events_window,
};
pub use requests::{EventsArgs, EventsRequest, EventsResponse, EventsSuccess};
pub use types::*;
