//! Priming work queue and batch assembly.

use std::collections::HashSet;

use eventcache_core::{
    BookmarkStore, ChatId, EventsArgs, EventsRequest, PartitionId, Timestamp,
};
use tracing::{debug, trace};

use crate::{Batch, ChatStateSnapshot, ChatSummary, PrimerConfig, QueuedChat};

/// Whether a chat needs priming given its stored bookmark.
///
/// Archived chats and proposals feeds are never primed. Anything else is
/// primed if it has never been primed, or if the server reports a change newer
/// than the bookmark.
pub fn should_enqueue_chat(chat: &ChatSummary, stored_last_updated: Option<Timestamp>) -> bool {
    if chat.archived || chat.is_proposals {
        return false;
    }
    stored_last_updated.is_none_or(|stored| chat.last_updated > stored)
}

/// Expand a queued chat into the requests that prime it.
///
/// Always produces a descending page from the latest event. When the unread
/// backlog is more than half a message page, a window request centred just
/// after the last read message is emitted first so the unread boundary is
/// ready too.
pub fn events_args(chat: &QueuedChat, max_messages: usize) -> Vec<EventsRequest> {
    let event_index_range = (chat.min_visible_event_index, chat.latest_event_index);
    let latest = chat.latest_message_index.map_or(-1, i64::from);
    let read = chat.read_by_me_up_to.map_or(-1, i64::from);
    let unread_count = latest - read;

    let mut requests = Vec::with_capacity(2);
    if unread_count > (max_messages / 2) as i64 {
        requests.push(EventsRequest {
            chat_id: chat.chat_id.clone(),
            args: EventsArgs::Window {
                mid_point: chat.read_by_me_up_to.map_or(0, |r| r.saturating_add(1)),
                event_index_range,
            },
            latest_known_update: Some(chat.last_updated),
        });
    }

    requests.push(EventsRequest {
        chat_id: chat.chat_id.clone(),
        args: EventsArgs::Page {
            start_index: chat.latest_event_index,
            ascending: false,
            event_index_range,
        },
        latest_known_update: Some(chat.last_updated),
    });

    requests
}

/// Scheduling state of the primer: what is waiting and what is in flight.
#[derive(Debug)]
pub struct PrimerQueue {
    /// Newest first, so the stalest chat sits at the tail.
    pending: Vec<QueuedChat>,
    in_progress: HashSet<ChatId>,
    batch_size: usize,
    max_messages: usize,
}

impl PrimerQueue {
    pub fn new(config: &PrimerConfig) -> Self {
        Self {
            pending: Vec::new(),
            in_progress: HashSet::new(),
            batch_size: config.batch_size.max(1),
            max_messages: config.max_messages,
        }
    }

    /// Replace the pending queue with the chats in `snapshot` that need priming.
    ///
    /// Chats reserved by an in-flight batch are skipped. Returns the number of
    /// chats queued.
    pub fn rebuild(&mut self, snapshot: &ChatStateSnapshot, bookmarks: &BookmarkStore) -> usize {
        self.pending.clear();

        let mut seen = HashSet::new();
        for chat in snapshot.chats() {
            if self.in_progress.contains(&chat.chat_id) {
                trace!(chat = %chat.chat_id, "skipping chat with batch in flight");
                continue;
            }
            if !seen.insert(chat.chat_id.clone()) {
                continue;
            }
            if should_enqueue_chat(&chat, bookmarks.get(&chat.chat_id)) {
                self.pending.push(chat.into());
            }
        }

        self.pending.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));

        debug!(
            chats = snapshot.chat_count(),
            queued = self.pending.len(),
            in_progress = self.in_progress.len(),
            "rebuilt priming queue"
        );
        self.pending.len()
    }

    /// Take the next batch off the queue.
    ///
    /// The stalest chat fixes the batch's partition; chats on other partitions
    /// stay queued. Taken chats are reserved until [`release`](Self::release).
    /// A batch never exceeds the configured size unless a single chat needs
    /// more requests than that on its own.
    pub fn next_batch(&mut self) -> Option<Batch> {
        let mut partition: Option<PartitionId> = None;
        let mut chats = Vec::new();
        let mut requests: Vec<EventsRequest> = Vec::new();

        let mut i = self.pending.len();
        while i > 0 {
            i -= 1;

            let candidate = &self.pending[i];
            if partition
                .as_ref()
                .is_some_and(|p| *p != candidate.local_user_index)
            {
                continue;
            }

            let args = events_args(candidate, self.max_messages);
            if !requests.is_empty() && requests.len() + args.len() > self.batch_size {
                break;
            }

            let chat = self.pending.remove(i);
            if partition.is_none() {
                partition = Some(chat.local_user_index.clone());
            }
            self.in_progress.insert(chat.chat_id.clone());
            chats.push(chat.chat_id);
            requests.extend(args);

            if requests.len() >= self.batch_size {
                break;
            }
        }

        partition.map(|local_user_index| Batch {
            local_user_index,
            chats,
            requests,
        })
    }

    /// Drop the reservations held by a finished batch.
    pub fn release(&mut self, batch: &Batch) {
        for chat_id in &batch.chats {
            self.in_progress.remove(chat_id);
        }
    }

    /// Queued chats in priming order (stalest first).
    pub fn pending(&self) -> impl Iterator<Item = &QueuedChat> {
        self.pending.iter().rev()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_in_progress(&self, chat_id: &ChatId) -> bool {
        self.in_progress.contains(chat_id)
    }

    pub fn in_progress_len(&self) -> usize {
        self.in_progress.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
