//! Data models for the OracleHub aggregation server

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// Raw HCS message as returned by the Mirror Node REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTopicMessage {
    pub consensus_timestamp: String,
    /// Base64-encoded payload.
    pub message: String,
    #[serde(default)]
    pub payer_account_id: Option<String>,
    pub sequence_number: i64,
    /// Not present in the Mirror Node body; filled in from the request path.
    #[serde(default)]
    pub topic_id: String,
}

/// One page of the Mirror Node `/topics/{id}/messages` response.
#[derive(Debug, Deserialize)]
pub struct MirrorMessagesPage {
    #[serde(default)]
    pub messages: Vec<RawTopicMessage>,
}

/// Producers publish correlation IDs as strings or bare numbers; accept
/// both so a numeric ID never disqualifies an otherwise valid message.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// A query submitted to the oracle network, published on HCS by the backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleQueryMessage {
    #[serde(deserialize_with = "id_string")]
    pub query_id: String,
    #[serde(default)]
    pub input_prompt: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// The compute result published for a previously seen query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeOperationMessage {
    #[serde(deserialize_with = "id_string")]
    pub operation_id: String,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub ai_response: Option<String>,
    /// Upstream JSON numbers are floats; truncation happens at render time.
    #[serde(default)]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub cost: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

/// Classification of a decoded HCS payload.
///
/// Payloads carry no reliable schema, so classification is by field
/// presence. Anything that matches no known shape lands in `Unrecognized`
/// and is dropped on purpose rather than silently.
#[derive(Debug, Clone)]
pub enum DecodedPayload {
    OracleQuery(OracleQueryMessage),
    /// Typed view plus the raw payload; latency heuristics read the raw
    /// field spellings the typed shape does not model.
    ComputeOperation(ComputeOperationMessage, Value),
    /// Self-contained oracle response with no separate query/result pair.
    DirectOracle(Value),
    Unrecognized(Value),
}

/// A numeric field that is either taken from the message or synthesized.
///
/// Execution times and confidences are frequently absent upstream; the
/// aggregator fills them with estimates, and this tag keeps estimates
/// distinguishable from measurements all the way to the wire format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Measured(f64),
    Estimated(f64),
}

impl Metric {
    pub fn value(self) -> f64 {
        match self {
            Metric::Measured(v) | Metric::Estimated(v) => v,
        }
    }

    pub fn is_estimated(self) -> bool {
        matches!(self, Metric::Estimated(_))
    }
}

/// One reconciled query-history record.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedQueryHistory {
    /// Query ID when the message carries one, consensus timestamp otherwise.
    pub id: String,
    pub query: String,
    pub provider: String,
    pub result: String,
    /// ISO-8601, normalized from whatever format the message used.
    pub timestamp: String,
    pub blockchain_hash: String,
    pub blockchain_link: String,
    pub consensus_timestamp: String,
    pub sequence_number: i64,
    /// Milliseconds.
    pub execution_time: u64,
    pub execution_time_estimated: bool,
    pub success: bool,
    /// 0-100.
    pub confidence: f64,
    pub confidence_estimated: bool,
    pub sources: Vec<String>,
}

/// Metadata block of the query-history response.
#[derive(Debug, Serialize)]
pub struct QueryHistoryMeta {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub source: &'static str,
    pub topics_scanned: Vec<String>,
    pub topics_count: usize,
    pub backend_topics: usize,
    pub known_topics: usize,
}

#[derive(Debug, Serialize)]
pub struct QueryHistoryResponse {
    pub success: bool,
    pub data: Vec<ParsedQueryHistory>,
    pub meta: QueryHistoryMeta,
}

/// Query forwarded to the Oracle Manager backend.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleManagerQuery {
    pub provider: String,
    pub query: String,
    #[serde(default)]
    pub user_id: Option<String>,
}
