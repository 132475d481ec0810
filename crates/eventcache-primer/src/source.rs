//! Collaborators the primer depends on.

use async_trait::async_trait;

use eventcache_core::{EventsClient, EventsRequest, EventsResponse, PartitionId, UserId};

use crate::PrimerError;

/// Remote source of chat events.
#[async_trait]
pub trait EventsSource: Send + Sync {
    /// Fetch events for a batch of requests served by one partition.
    ///
    /// Implementations must return one response per request, in order.
    async fn get_events_batch(
        &self,
        local_user_index: &PartitionId,
        requests: Vec<EventsRequest>,
    ) -> Result<Vec<EventsResponse>, PrimerError>;
}

#[async_trait]
impl EventsSource for EventsClient {
    async fn get_events_batch(
        &self,
        local_user_index: &PartitionId,
        requests: Vec<EventsRequest>,
    ) -> Result<Vec<EventsResponse>, PrimerError> {
        Ok(EventsClient::get_events_batch(self, local_user_index, &requests).await?)
    }
}

/// Receives users that appeared in primed events. Fire-and-forget.
pub trait UserLoader: Send + Sync {
    fn load_users(&self, user_ids: Vec<UserId>);
}

impl<F> UserLoader for F
where
    F: Fn(Vec<UserId>) + Send + Sync,
{
    fn load_users(&self, user_ids: Vec<UserId>) {
        self(user_ids)
    }
}
