//! HTTP client for the batched events endpoint.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{EventCacheError, EventsRequest, EventsResponse, PartitionId};

/// Client for fetching events from a partition's events service.
#[derive(Clone)]
pub struct EventsClient {
    http: Client,
    base_url: String,
}

impl EventsClient {
    /// Create a new client for the given service URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the service URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch events for several chats served by the same partition.
    ///
    /// The returned responses line up one-to-one with `requests`. Failed
    /// requests are not retried.
    pub async fn get_events_batch(
        &self,
        partition: &PartitionId,
        requests: &[EventsRequest],
    ) -> Result<Vec<EventsResponse>, EventCacheError> {
        #[derive(Serialize)]
        struct BatchRequest<'a> {
            requests: &'a [EventsRequest],
        }

        #[derive(Deserialize)]
        struct BatchResponse {
            responses: Vec<EventsResponse>,
        }

        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/v1/partitions/{}/events:batch",
            self.base_url, partition
        );
        debug!(partition = %partition, requests = requests.len(), "fetching events batch");

        let response = self
            .http
            .post(&url)
            .json(&BatchRequest { requests })
            .send()
            .await?;

        let body: BatchResponse = self.handle_response(response).await?;
        if body.responses.len() != requests.len() {
            return Err(EventCacheError::InvalidResponse(format!(
                "expected {} responses, got {}",
                requests.len(),
                body.responses.len()
            )));
        }

        Ok(body.responses)
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, EventCacheError> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(EventCacheError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let text = response.text().await.map_err(|e| {
                EventCacheError::InvalidResponse(format!(
                    "request failed ({}): failed to read response: {}",
                    status, e
                ))
            })?;

            let message = match serde_json::from_str::<ServiceError>(&text) {
                Ok(err) => format!("{} - {}", err.error, err.message),
                Err(_) => text,
            };
            return Err(EventCacheError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json().await?;
        Ok(body)
    }
}

/// Error body returned by the events service.
#[derive(Debug, Deserialize)]
struct ServiceError {
    error: String,
    message: String,
}
