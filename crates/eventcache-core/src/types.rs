//! Core types for chat event streams.

use serde::{Deserialize, Serialize};

/// Position of an event within its chat's stream.
pub type EventIndex = u32;

/// Position of a message among the message-kind events of a chat.
pub type MessageIndex = u32;

/// Logical server-side change counter. Monotonic per chat.
pub type Timestamp = u64;

/// A user principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Shard that serves a set of chats (the "local user index").
///
/// Batched event requests may only combine chats that share a partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(pub String);

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartitionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PartitionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identity of one event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatId {
    /// One-to-one chat, keyed by the other participant.
    Direct { user_id: UserId },
    /// Standalone group chat.
    Group { group_id: String },
    /// Channel inside a community.
    Channel {
        community_id: String,
        channel_id: String,
    },
}

impl ChatId {
    pub fn direct(user_id: impl Into<UserId>) -> Self {
        Self::Direct {
            user_id: user_id.into(),
        }
    }

    pub fn group(group_id: impl Into<String>) -> Self {
        Self::Group {
            group_id: group_id.into(),
        }
    }

    pub fn channel(community_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self::Channel {
            community_id: community_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct { user_id } => write!(f, "direct:{}", user_id),
            Self::Group { group_id } => write!(f, "group:{}", group_id),
            Self::Channel {
                community_id,
                channel_id,
            } => write!(f, "channel:{}/{}", community_id, channel_id),
        }
    }
}

/// The payload of a chat event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A message sent to the chat.
    Message {
        message_index: MessageIndex,
        sender: UserId,
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        mentioned: Vec<UserId>,
    },
    /// Users were added to the chat.
    MembersAdded {
        added_by: UserId,
        user_ids: Vec<UserId>,
    },
    /// Users were removed from the chat.
    MembersRemoved {
        removed_by: UserId,
        user_ids: Vec<UserId>,
    },
    /// A reaction was added to a message.
    Reaction {
        message_index: MessageIndex,
        user_id: UserId,
        reaction: String,
    },
    /// The chat was created.
    ChatCreated { created_by: UserId },
    /// Any event kind this crate doesn't model individually.
    Other { name: String },
}

impl ChatEvent {
    /// Whether this event carries message content.
    pub fn is_message(&self) -> bool {
        matches!(self, Self::Message { .. })
    }

    /// Every user referenced by this event.
    pub fn user_ids(&self) -> Vec<&UserId> {
        match self {
            Self::Message {
                sender, mentioned, ..
            } => std::iter::once(sender).chain(mentioned).collect(),
            Self::MembersAdded { added_by, user_ids } => {
                std::iter::once(added_by).chain(user_ids).collect()
            }
            Self::MembersRemoved {
                removed_by,
                user_ids,
            } => std::iter::once(removed_by).chain(user_ids).collect(),
            Self::Reaction { user_id, .. } => vec![user_id],
            Self::ChatCreated { created_by } => vec![created_by],
            Self::Other { .. } => Vec::new(),
        }
    }
}

/// An event together with its position in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    pub index: EventIndex,
    pub timestamp: Timestamp,
    pub event: ChatEvent,
}

impl EventEntry {
    pub fn new(index: EventIndex, timestamp: Timestamp, event: ChatEvent) -> Self {
        Self {
            index,
            timestamp,
            event,
        }
    }

    pub fn is_message(&self) -> bool {
        self.event.is_message()
    }
}
