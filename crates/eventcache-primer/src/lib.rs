//! Background cache priming for chat event streams.
//!
//! This crate keeps local event caches warm without blocking the foreground:
//! - Picks the chats whose server state moved past their stored bookmark
//! - Primes the stalest chats first
//! - Batches requests per partition, never mixing partitions in one call
//! - Advances bookmarks and hands newly seen users to a loader
//! - Runs as a single background task, pausing between batches

mod error;
mod primer;
mod queue;
mod source;
mod types;

pub use error::PrimerError;
pub use primer::{BatchOutcome, BatchReport, CachePrimer, CachePrimerHandle, PrimerStatus};
pub use queue::{PrimerQueue, events_args, should_enqueue_chat};
pub use source::{EventsSource, UserLoader};
pub use types::{
    Batch, ChannelSummary, ChatStateSnapshot, ChatSummary, CommunitySummary, DirectChatSummary,
    GroupChatSummary, GroupSubtype, Membership, PrimerConfig, QueuedChat,
};

pub use eventcache_core::{EventsArgs, EventsRequest, EventsResponse, EventsSuccess};
