//! Batched event fetch requests and their responses.

use serde::{Deserialize, Serialize};

use crate::{ChatId, EventEntry, EventIndex, Timestamp, UserId};

/// How a single chat's events should be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventsArgs {
    /// Read from `start_index` in one direction.
    Page {
        start_index: EventIndex,
        ascending: bool,
        /// Inclusive bounds the read must stay within.
        event_index_range: (EventIndex, EventIndex),
    },
    /// Read outward from `mid_point` in both directions.
    Window {
        mid_point: EventIndex,
        event_index_range: (EventIndex, EventIndex),
    },
}

/// One entry in a batched events call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsRequest {
    pub chat_id: ChatId,
    pub args: EventsArgs,
    /// Lets the server skip work when nothing changed since this update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_known_update: Option<Timestamp>,
}

/// Events returned for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsSuccess {
    pub events: Vec<EventEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_known_update: Option<Timestamp>,
}

impl EventsSuccess {
    /// Every user referenced by the returned events.
    pub fn user_ids(&self) -> impl Iterator<Item = &UserId> {
        self.events.iter().flat_map(|e| e.event.user_ids())
    }
}

/// Result of one request within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventsResponse {
    Success(EventsSuccess),
    Failure { reason: String },
}

impl EventsResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
