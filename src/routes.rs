//! Route definitions for the OracleHub API

use axum::{routing::get, routing::post, Router};

use crate::app_state::AppState;
use crate::handlers::*;

// Query history routes
pub fn history_routes() -> Router<AppState> {
    Router::new().route("/api/query-history", get(get_query_history))
}

// Oracle Manager proxy routes
pub fn oracle_routes() -> Router<AppState> {
    Router::new().route("/api/oracle-manager/query", post(proxy_oracle_query))
}
