//! API handlers for the OracleHub aggregation server

use std::collections::HashMap;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use tracing::error;

use crate::app_state::AppState;
use crate::models::{
    ApiResponse, OracleManagerQuery, QueryHistoryMeta, QueryHistoryResponse,
};
use crate::services::history_aggregator::DEFAULT_LIMIT;

/// Error body for the one failure mode the history endpoint surfaces.
#[derive(Debug, serde::Serialize)]
pub struct QueryHistoryError {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// `GET /api/query-history?limit&offset`
///
/// Almost always answers 200 with best-effort data; unreachable topics and
/// undecodable messages shrink the result instead of failing it. Only a
/// malformed request itself produces a 500.
pub async fn get_query_history(
    State(app_state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<QueryHistoryResponse>, (StatusCode, Json<QueryHistoryError>)> {
    let (limit, offset) = match parse_pagination(&params) {
        Ok(pagination) => pagination,
        Err(err) => {
            error!(error = %err, "query history request rejected");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(QueryHistoryError {
                    success: false,
                    error: "Failed to fetch query history".to_string(),
                    details: Some(format!("{err:#}")),
                }),
            ));
        }
    };

    let result = app_state.aggregator.collect(limit, offset).await;

    Ok(Json(QueryHistoryResponse {
        success: true,
        meta: QueryHistoryMeta {
            total: result.total,
            limit,
            offset,
            source: "hedera-blockchain-universal-topics",
            topics_count: result.stats.topics_scanned.len(),
            topics_scanned: result.stats.topics_scanned,
            backend_topics: result.stats.backend_topics,
            known_topics: result.stats.known_topics,
        },
        data: result.records,
    }))
}

fn parse_pagination(params: &HashMap<String, String>) -> anyhow::Result<(usize, usize)> {
    let limit = match params.get("limit") {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("invalid limit parameter: {raw:?}"))?,
        None => DEFAULT_LIMIT,
    };

    let offset = match params.get("offset") {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("invalid offset parameter: {raw:?}"))?,
        None => 0,
    };

    Ok((limit, offset))
}

/// `POST /api/oracle-manager/query`
///
/// Thin proxy to the Oracle Manager backend; the consensus engine lives
/// there, this server only relays the query and the verdict.
pub async fn proxy_oracle_query(
    State(app_state): State<AppState>,
    Json(request): Json<OracleManagerQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ApiResponse<serde_json::Value>>)> {
    let url = format!("{}/api/oracle-manager/query", app_state.config.backend_url);

    let response = app_state
        .http
        .post(&url)
        .json(&request)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status);

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, provider = %request.provider, "oracle manager query failed");
            return Err((
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse {
                    success: false,
                    data: None,
                    error: Some(format!("Oracle Manager unavailable: {err}")),
                }),
            ));
        }
    };

    match response.json::<serde_json::Value>().await {
        Ok(body) => Ok(Json(body)),
        Err(err) => {
            error!(error = %err, "oracle manager response malformed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse {
                    success: false,
                    data: None,
                    error: Some(format!("Oracle Manager returned malformed JSON: {err}")),
                }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_apply() {
        let params = HashMap::new();
        assert_eq!(parse_pagination(&params).unwrap(), (DEFAULT_LIMIT, 0));
    }

    #[test]
    fn pagination_parses_explicit_values() {
        let params: HashMap<String, String> = [
            ("limit".to_string(), "5".to_string()),
            ("offset".to_string(), "10".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(parse_pagination(&params).unwrap(), (5, 10));
    }

    #[test]
    fn pagination_rejects_garbage() {
        let params: HashMap<String, String> =
            [("limit".to_string(), "not-a-number".to_string())]
                .into_iter()
                .collect();
        assert!(parse_pagination(&params).is_err());

        let params: HashMap<String, String> =
            [("offset".to_string(), "-3".to_string())].into_iter().collect();
        assert!(parse_pagination(&params).is_err());
    }
}
