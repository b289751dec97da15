//! HTTP client for the Hedera Mirror Node and the backend topic registry.

use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

use crate::models::{MirrorMessagesPage, RawTopicMessage};

/// Messages fetched per topic per request.
pub const MESSAGES_PER_TOPIC: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum MirrorNodeError {
    #[error("mirror node request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Shape of the backend `/api/hcs/topics` registry response.
#[derive(Debug, Deserialize)]
struct BackendTopicsResponse {
    #[serde(default)]
    success: bool,
    #[serde(rename = "hcsService")]
    hcs_service: Option<BackendHcsService>,
}

#[derive(Debug, Deserialize)]
struct BackendHcsService {
    #[serde(default)]
    topics: HashMap<String, BackendTopicEntry>,
}

#[derive(Debug, Deserialize)]
struct BackendTopicEntry {
    id: String,
}

#[derive(Clone)]
pub struct MirrorNodeClient {
    http: Client,
    mirror_node_url: String,
    backend_url: String,
}

impl MirrorNodeClient {
    pub fn new(http: Client, mirror_node_url: String, backend_url: String) -> Self {
        Self {
            http,
            mirror_node_url,
            backend_url,
        }
    }

    /// Fetches the most recent messages for one topic, newest first.
    ///
    /// Caching is disabled explicitly; the dashboard expects every request
    /// to reflect the current topic tail.
    pub async fn fetch_topic_messages(
        &self,
        topic_id: &str,
    ) -> Result<Vec<RawTopicMessage>, MirrorNodeError> {
        let url = format!(
            "{}/api/v1/topics/{}/messages?limit={}&order=desc",
            self.mirror_node_url, topic_id, MESSAGES_PER_TOPIC
        );

        let page = self
            .http
            .get(&url)
            .header("Cache-Control", "no-cache")
            .send()
            .await?
            .error_for_status()?
            .json::<MirrorMessagesPage>()
            .await?;

        // The Mirror Node omits topic_id from message bodies.
        let messages = page
            .messages
            .into_iter()
            .map(|mut message| {
                message.topic_id = topic_id.to_string();
                message
            })
            .collect();

        Ok(messages)
    }

    /// Asks the backend for dynamically registered topic IDs.
    ///
    /// Best-effort: any failure degrades to an empty list so the known
    /// topics can still be scanned.
    pub async fn discover_backend_topics(&self) -> Vec<String> {
        let url = format!("{}/api/hcs/topics", self.backend_url);

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "backend topic discovery unreachable");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "backend topic discovery returned non-OK");
            return Vec::new();
        }

        match response.json::<BackendTopicsResponse>().await {
            Ok(body) if body.success => body
                .hcs_service
                .map(|service| {
                    service
                        .topics
                        .into_values()
                        .map(|entry| entry.id)
                        .filter(|id| !id.trim().is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            Ok(_) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "backend topic discovery response malformed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_topics_response_parses_registry_shape() {
        let raw = serde_json::json!({
            "success": true,
            "hcsService": {
                "topics": {
                    "priceFeed": { "id": "0.0.111" },
                    "weather": { "id": "0.0.222" }
                }
            }
        });

        let parsed: BackendTopicsResponse = serde_json::from_value(raw).unwrap();
        assert!(parsed.success);
        let topics = parsed.hcs_service.unwrap().topics;
        assert_eq!(topics.len(), 2);
        assert_eq!(topics["priceFeed"].id, "0.0.111");
    }

    #[tokio::test]
    async fn discovery_failure_degrades_to_empty() {
        // Unroutable port: connection refused, not a hang.
        let client = MirrorNodeClient::new(
            Client::new(),
            "http://127.0.0.1:9".to_string(),
            "http://127.0.0.1:9".to_string(),
        );

        assert!(client.discover_backend_topics().await.is_empty());
    }
}
