//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use reqwest::Client;

use crate::config::TopicsConfig;
use crate::services::{HistoryAggregator, MirrorNodeClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub aggregator: HistoryAggregator,
    pub config: Arc<TopicsConfig>,
    /// Bare client for proxying requests to the Oracle Manager backend.
    pub http: Client,
}

impl AppState {
    pub fn from_config(config: TopicsConfig) -> Self {
        let config = Arc::new(config);
        let http = Client::new();
        let client = MirrorNodeClient::new(
            http.clone(),
            config.mirror_node_url.clone(),
            config.backend_url.clone(),
        );

        Self {
            aggregator: HistoryAggregator::new(client, config.clone()),
            config,
            http,
        }
    }
}

impl FromRef<AppState> for HistoryAggregator {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.aggregator.clone()
    }
}

impl FromRef<AppState> for Arc<TopicsConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.config.clone()
    }
}
