//! In-memory cache of chat event streams.
//!
//! Each chat's stream is stored sparsely: only the indices that have been
//! fetched are present. Reads go through the reconciler so callers learn which
//! indices they still need from the network.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::reconcile::{CachedEvents, ReconcileLimits, scan_range, scan_window};
use crate::{ChatId, EventEntry, EventIndex};

/// Broadcast channel capacity for cache updates.
const BROADCAST_CHANNEL_CAPACITY: usize = 1024;

/// Update event for cache subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheUpdate {
    /// Events were written for a chat.
    EventsStored { chat_id: ChatId, count: usize },
    /// A chat's stream was dropped.
    ChatCleared { chat_id: ChatId },
}

/// Thread-safe sparse event cache keyed by chat.
pub struct EventCache {
    chats: DashMap<ChatId, BTreeMap<EventIndex, EventEntry>>,
    limits: ReconcileLimits,
    updates_tx: broadcast::Sender<CacheUpdate>,
}

impl EventCache {
    /// Create a new empty cache with the default read limits.
    pub fn new() -> Arc<Self> {
        Self::with_limits(ReconcileLimits::default())
    }

    /// Create a new empty cache with custom read limits.
    pub fn with_limits(limits: ReconcileLimits) -> Arc<Self> {
        let (updates_tx, _) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        Arc::new(Self {
            chats: DashMap::new(),
            limits,
            updates_tx,
        })
    }

    /// Subscribe to cache updates.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.updates_tx.subscribe()
    }

    fn broadcast(&self, update: CacheUpdate) {
        if self.updates_tx.send(update).is_err() {
            trace!("no subscribers for cache update");
        }
    }

    /// Store events for a chat, replacing any cached event at the same index.
    ///
    /// Returns the number of events written.
    pub fn insert_events(
        &self,
        chat_id: &ChatId,
        entries: impl IntoIterator<Item = EventEntry>,
    ) -> usize {
        let entries: Vec<EventEntry> = entries.into_iter().collect();
        let count = entries.len();
        if count == 0 {
            return 0;
        }

        {
            let mut stream = self.chats.entry(chat_id.clone()).or_default();
            for entry in entries {
                stream.insert(entry.index, entry);
            }
        }

        debug!(chat = %chat_id, count, "stored events");
        self.broadcast(CacheUpdate::EventsStored {
            chat_id: chat_id.clone(),
            count,
        });
        count
    }

    /// Read a linear page of events for a chat.
    ///
    /// # Panics
    ///
    /// Panics if `from_index > to_index`.
    pub fn read_page(
        &self,
        chat_id: &ChatId,
        from_index: EventIndex,
        to_index: EventIndex,
        ascending: bool,
    ) -> CachedEvents {
        match self.chats.get(chat_id) {
            Some(stream) => scan_range(from_index, to_index, ascending, self.limits, |i| {
                stream.get(&i)
            }),
            None => scan_range(from_index, to_index, ascending, self.limits, |_| None),
        }
    }

    /// Read a window of events centred on `mid_point`.
    ///
    /// # Panics
    ///
    /// Panics if `from_index > to_index` or `mid_point` is outside the range.
    pub fn read_window(
        &self,
        chat_id: &ChatId,
        from_index: EventIndex,
        to_index: EventIndex,
        mid_point: EventIndex,
    ) -> CachedEvents {
        match self.chats.get(chat_id) {
            Some(stream) => scan_window(from_index, to_index, mid_point, self.limits, |i| {
                stream.get(&i)
            }),
            None => scan_window(from_index, to_index, mid_point, self.limits, |_| None),
        }
    }

    /// Highest cached index for a chat.
    pub fn latest_cached_index(&self, chat_id: &ChatId) -> Option<EventIndex> {
        self.chats
            .get(chat_id)
            .and_then(|stream| stream.keys().next_back().copied())
    }

    /// Drop everything cached for a chat.
    pub fn clear_chat(&self, chat_id: &ChatId) {
        if self.chats.remove(chat_id).is_some() {
            self.broadcast(CacheUpdate::ChatCleared {
                chat_id: chat_id.clone(),
            });
        }
    }

    /// Number of chats with at least one cached event.
    pub fn chat_count(&self) -> usize {
        self.chats.len()
    }

    /// Number of events cached for a chat.
    pub fn event_count(&self, chat_id: &ChatId) -> usize {
        self.chats.get(chat_id).map(|s| s.len()).unwrap_or(0)
    }
}
