//! Per-chat "last updated" bookmarks.
//!
//! A bookmark records the newest server-side change the primer has synced
//! past for a chat. Bookmarks only ever move forward.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use crate::{ChatId, Timestamp};

/// Thread-safe map of chat bookmarks.
#[derive(Debug, Default)]
pub struct BookmarkStore {
    bookmarks: DashMap<ChatId, Timestamp>,
}

impl BookmarkStore {
    /// Create a new empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a store seeded with existing bookmarks.
    pub fn from_map(bookmarks: HashMap<ChatId, Timestamp>) -> Arc<Self> {
        Arc::new(Self {
            bookmarks: bookmarks.into_iter().collect(),
        })
    }

    /// Stored bookmark for a chat, if any.
    pub fn get(&self, chat_id: &ChatId) -> Option<Timestamp> {
        self.bookmarks.get(chat_id).map(|t| *t)
    }

    /// Move a chat's bookmark forward to `timestamp`.
    ///
    /// Returns false (and leaves the bookmark untouched) if the stored value is
    /// already at or past `timestamp`.
    pub fn advance(&self, chat_id: &ChatId, timestamp: Timestamp) -> bool {
        match self.bookmarks.entry(chat_id.clone()) {
            Entry::Occupied(mut existing) => {
                if timestamp > *existing.get() {
                    existing.insert(timestamp);
                    true
                } else {
                    trace!(chat = %chat_id, stored = *existing.get(), timestamp, "bookmark not advanced");
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(timestamp);
                true
            }
        }
    }

    /// Copy of every bookmark.
    pub fn snapshot(&self) -> HashMap<ChatId, Timestamp> {
        self.bookmarks
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }
}
