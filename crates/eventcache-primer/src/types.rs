//! Primer types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use eventcache_core::{
    ChatId, EventIndex, EventsRequest, MAX_MESSAGES, MessageIndex, PartitionId, Timestamp, UserId,
};

/// Default number of requests per batch.
const DEFAULT_BATCH_SIZE: usize = 20;

/// Default pause between batches.
const DEFAULT_BATCH_DELAY_MS: u64 = 500;

/// Primer tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimerConfig {
    /// Maximum number of requests sent in one batch.
    pub batch_size: usize,
    /// Pause between batches, in milliseconds.
    pub batch_delay_ms: u64,
    /// Message page size used by readers. Chats with more than half this many
    /// unread messages also get a window request at the unread boundary.
    pub max_messages: usize,
}

impl Default for PrimerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            max_messages: MAX_MESSAGES,
        }
    }
}

impl PrimerConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// The caller's membership state for a chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Membership {
    pub archived: bool,
}

/// Special-purpose group chats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSubtype {
    /// Governance proposals feed. Never primed.
    GovernanceProposals,
}

/// A direct chat as known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectChatSummary {
    pub them: UserId,
    pub local_user_index: PartitionId,
    pub last_updated: Timestamp,
    pub latest_event_index: EventIndex,
    #[serde(default)]
    pub latest_message_index: Option<MessageIndex>,
    #[serde(default)]
    pub read_by_me_up_to: Option<MessageIndex>,
    #[serde(default)]
    pub membership: Membership,
}

/// A group chat as known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupChatSummary {
    pub group_id: String,
    pub local_user_index: PartitionId,
    pub last_updated: Timestamp,
    pub latest_event_index: EventIndex,
    #[serde(default)]
    pub latest_message_index: Option<MessageIndex>,
    #[serde(default)]
    pub read_by_me_up_to: Option<MessageIndex>,
    #[serde(default)]
    pub min_visible_event_index: EventIndex,
    #[serde(default)]
    pub subtype: Option<GroupSubtype>,
    #[serde(default)]
    pub membership: Membership,
}

/// A channel inside a community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel_id: String,
    pub last_updated: Timestamp,
    pub latest_event_index: EventIndex,
    #[serde(default)]
    pub latest_message_index: Option<MessageIndex>,
    #[serde(default)]
    pub read_by_me_up_to: Option<MessageIndex>,
    #[serde(default)]
    pub min_visible_event_index: EventIndex,
    #[serde(default)]
    pub subtype: Option<GroupSubtype>,
    #[serde(default)]
    pub membership: Membership,
}

/// A community and its channels. Channels are served by the community's partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunitySummary {
    pub community_id: String,
    pub local_user_index: PartitionId,
    #[serde(default)]
    pub channels: Vec<ChannelSummary>,
}

/// Every chat the client currently knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatStateSnapshot {
    pub direct_chats: Vec<DirectChatSummary>,
    pub group_chats: Vec<GroupChatSummary>,
    pub communities: Vec<CommunitySummary>,
}

/// A chat of any kind, flattened to the fields priming needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub chat_id: ChatId,
    pub local_user_index: PartitionId,
    pub last_updated: Timestamp,
    pub latest_event_index: EventIndex,
    pub latest_message_index: Option<MessageIndex>,
    pub read_by_me_up_to: Option<MessageIndex>,
    pub min_visible_event_index: EventIndex,
    pub archived: bool,
    pub is_proposals: bool,
}

impl ChatStateSnapshot {
    /// Direct chats, then group chats, then community channels.
    pub fn chats(&self) -> impl Iterator<Item = ChatSummary> + '_ {
        let direct = self.direct_chats.iter().map(|c| ChatSummary {
            chat_id: ChatId::Direct {
                user_id: c.them.clone(),
            },
            local_user_index: c.local_user_index.clone(),
            last_updated: c.last_updated,
            latest_event_index: c.latest_event_index,
            latest_message_index: c.latest_message_index,
            read_by_me_up_to: c.read_by_me_up_to,
            min_visible_event_index: 0,
            archived: c.membership.archived,
            is_proposals: false,
        });

        let groups = self.group_chats.iter().map(|g| ChatSummary {
            chat_id: ChatId::group(g.group_id.clone()),
            local_user_index: g.local_user_index.clone(),
            last_updated: g.last_updated,
            latest_event_index: g.latest_event_index,
            latest_message_index: g.latest_message_index,
            read_by_me_up_to: g.read_by_me_up_to,
            min_visible_event_index: g.min_visible_event_index,
            archived: g.membership.archived,
            is_proposals: g.subtype == Some(GroupSubtype::GovernanceProposals),
        });

        let channels = self.communities.iter().flat_map(|community| {
            community.channels.iter().map(move |c| ChatSummary {
                chat_id: ChatId::channel(community.community_id.clone(), c.channel_id.clone()),
                local_user_index: community.local_user_index.clone(),
                last_updated: c.last_updated,
                latest_event_index: c.latest_event_index,
                latest_message_index: c.latest_message_index,
                read_by_me_up_to: c.read_by_me_up_to,
                min_visible_event_index: c.min_visible_event_index,
                archived: c.membership.archived,
                is_proposals: c.subtype == Some(GroupSubtype::GovernanceProposals),
            })
        });

        direct.chain(groups).chain(channels)
    }

    /// Total number of chats in the snapshot.
    pub fn chat_count(&self) -> usize {
        self.direct_chats.len()
            + self.group_chats.len()
            + self
                .communities
                .iter()
                .map(|c| c.channels.len())
                .sum::<usize>()
    }
}

/// A chat waiting to be primed. Fixed at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedChat {
    pub chat_id: ChatId,
    pub local_user_index: PartitionId,
    pub last_updated: Timestamp,
    pub latest_event_index: EventIndex,
    pub latest_message_index: Option<MessageIndex>,
    pub read_by_me_up_to: Option<MessageIndex>,
    pub min_visible_event_index: EventIndex,
}

impl From<ChatSummary> for QueuedChat {
    fn from(chat: ChatSummary) -> Self {
        Self {
            chat_id: chat.chat_id,
            local_user_index: chat.local_user_index,
            last_updated: chat.last_updated,
            latest_event_index: chat.latest_event_index,
            latest_message_index: chat.latest_message_index,
            read_by_me_up_to: chat.read_by_me_up_to,
            min_visible_event_index: chat.min_visible_event_index,
        }
    }
}

/// Requests for one partition, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub local_user_index: PartitionId,
    /// Chats reserved by this batch.
    pub chats: Vec<ChatId>,
    pub requests: Vec<EventsRequest>,
}
