//! Request-scoped aggregation of oracle query history from HCS topics.
//!
//! Every request runs the full pipeline: discover topics, fan out fetches,
//! decode and classify each message, reconcile query/result pairs, sort and
//! slice. Nothing is cached between requests; the Mirror Node is the only
//! source of truth.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::TopicsConfig;
use crate::models::{
    ComputeOperationMessage, DecodedPayload, Metric, OracleQueryMessage, ParsedQueryHistory,
    RawTopicMessage,
};
use crate::services::embedded_json::{extract_embedded_object, EMBEDDED_RESULT_MARKER};
use crate::services::mirror_node::MirrorNodeClient;
use crate::services::normalize;

const HASHSCAN_BASE_URL: &str = "https://hashscan.io/testnet/transaction";

pub const DEFAULT_LIMIT: usize = 20;

/// Topic scan statistics reported in the response metadata.
#[derive(Debug, Clone)]
pub struct ScanStats {
    pub topics_scanned: Vec<String>,
    pub backend_topics: usize,
    pub known_topics: usize,
}

#[derive(Debug)]
pub struct AggregationResult {
    pub records: Vec<ParsedQueryHistory>,
    /// Record count before the offset/limit slice.
    pub total: usize,
    pub stats: ScanStats,
}

#[derive(Clone)]
pub struct HistoryAggregator {
    client: MirrorNodeClient,
    config: Arc<TopicsConfig>,
}

impl HistoryAggregator {
    pub fn new(client: MirrorNodeClient, config: Arc<TopicsConfig>) -> Self {
        Self { client, config }
    }

    /// Runs the full pipeline and returns the sliced, newest-first records.
    ///
    /// Best-effort throughout: unreachable topics, undecodable messages and
    /// unrecognized payloads each degrade the result instead of failing it.
    pub async fn collect(&self, limit: usize, offset: usize) -> AggregationResult {
        let (topics, stats) = self.discover_topics().await;
        let messages = self.fetch_all_topics(&topics).await;

        let mut queries: HashMap<String, (OracleQueryMessage, RawTopicMessage)> = HashMap::new();
        let mut operations: HashMap<String, (ComputeOperationMessage, Value, RawTopicMessage)> =
            HashMap::new();
        let mut direct: Vec<(Value, RawTopicMessage)> = Vec::new();
        let mut unrecognized = 0usize;

        for message in messages {
            let Some(payload) = decode_message(&message) else {
                continue;
            };

            match classify_payload(payload) {
                DecodedPayload::OracleQuery(query) => {
                    // Last write wins when the same queryId shows up on
                    // several topics.
                    queries.insert(query.query_id.clone(), (query, message));
                }
                DecodedPayload::ComputeOperation(operation, payload) => {
                    operations
                        .insert(operation.operation_id.clone(), (operation, payload, message));
                }
                DecodedPayload::DirectOracle(value) => direct.push((value, message)),
                DecodedPayload::Unrecognized(_) => unrecognized += 1,
            }
        }

        let mut records: Vec<ParsedQueryHistory> = Vec::with_capacity(queries.len() + direct.len());

        for (query_id, (query, raw)) in &queries {
            let operation = operations.get(query_id);
            records.push(self.build_combined_record(query, raw, operation));
        }

        for (payload, raw) in &direct {
            records.push(self.build_direct_record(payload, raw));
        }

        records.sort_by(|a, b| {
            normalize::sort_key(&b.timestamp).cmp(&normalize::sort_key(&a.timestamp))
        });

        let total = records.len();
        let records: Vec<ParsedQueryHistory> =
            records.into_iter().skip(offset).take(limit).collect();

        info!(
            total,
            returned = records.len(),
            queries = queries.len(),
            operations = operations.len(),
            direct = direct.len(),
            unrecognized,
            topics = stats.topics_scanned.len(),
            "query history aggregation complete"
        );

        AggregationResult {
            records,
            total,
            stats,
        }
    }

    /// Union of backend-registered and known topics, first occurrence wins.
    async fn discover_topics(&self) -> (Vec<String>, ScanStats) {
        let backend_topics = self.client.discover_backend_topics().await;
        let backend_count = backend_topics.len();

        let mut topics: Vec<String> = Vec::new();
        for topic in backend_topics
            .into_iter()
            .chain(self.config.known_topics.iter().cloned())
        {
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }

        let stats = ScanStats {
            topics_scanned: topics.clone(),
            backend_topics: backend_count,
            known_topics: self.config.known_topics.len(),
        };

        (topics, stats)
    }

    /// Fetches every topic concurrently, bounded by a semaphore so the
    /// fan-out stays flat as the topic list grows. Per-topic failures
    /// contribute zero messages.
    async fn fetch_all_topics(&self, topics: &[String]) -> Vec<RawTopicMessage> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_fetches.max(1)));

        let fetches = topics.iter().map(|topic_id| {
            let client = self.client.clone();
            let permits = permits.clone();
            let topic_id = topic_id.clone();
            async move {
                let _permit = match permits.acquire().await {
                    Ok(permit) => permit,
                    // Only possible if the semaphore is closed, which it
                    // never is; treat like a failed fetch.
                    Err(_) => return Vec::new(),
                };
                match client.fetch_topic_messages(&topic_id).await {
                    Ok(messages) => messages,
                    Err(err) => {
                        warn!(topic_id = %topic_id, error = %err, "topic fetch failed, skipping");
                        Vec::new()
                    }
                }
            }
        });

        join_all(fetches).await.into_iter().flatten().collect()
    }

    /// Builds the record for a query, enriched with its operation result
    /// when one arrived.
    fn build_combined_record(
        &self,
        query: &OracleQueryMessage,
        raw: &RawTopicMessage,
        operation: Option<&(ComputeOperationMessage, Value, RawTopicMessage)>,
    ) -> ParsedQueryHistory {
        let mut result = "Processing...".to_string();
        let mut success = false;
        let mut execution_time = Metric::Measured(0.0);
        let mut confidence = Metric::Estimated(95.0);
        let mut sources: Vec<String> = Vec::new();

        if let Some((op, op_payload, _)) = operation {
            success = op.success.unwrap_or(false);

            // The raw payload keeps whichever latency spelling the
            // producer used; the typed struct only models one of them.
            execution_time = normalize::extract_execution_time(op_payload);

            let marked_response = op
                .ai_response
                .as_deref()
                .filter(|text| text.contains(EMBEDDED_RESULT_MARKER));

            if let Some(text) = marked_response {
                // Extraction failure keeps the pre-parse defaults; a half
                // parsed result must not masquerade as a real one.
                match extract_embedded_object(text) {
                    Some(embedded) => {
                        result = normalize::extract_result(&embedded);
                        confidence = normalize::extract_confidence(&embedded);
                        success = true;
                        if let Some(listed) =
                            embedded.pointer("/sources").and_then(Value::as_array)
                        {
                            sources = listed
                                .iter()
                                .filter_map(Value::as_str)
                                .map(ToString::to_string)
                                .collect();
                        }
                    }
                    None => {
                        warn!(
                            operation_id = %op.operation_id,
                            "embedded result extraction failed, keeping defaults"
                        );
                    }
                }
            } else if let Some(op_result) = &op.result {
                result = normalize::extract_result(&serde_json::json!({ "result": op_result }));
                success = op.success.unwrap_or(true);
            } else if let Some(text) = &op.ai_response {
                result = text.clone();
                success = op.success.unwrap_or(true);
            }
        }

        let provider = normalize::detect_provider(
            &serde_json::json!({ "provider": query.provider }),
            &raw.topic_id,
            &self.config,
        );

        if sources.is_empty() {
            sources.push(provider.clone());
        }

        let timestamp = normalize::normalize_timestamp(query.timestamp.as_ref());

        ParsedQueryHistory {
            id: query.query_id.clone(),
            query: query.input_prompt.clone().unwrap_or_default(),
            provider,
            result,
            timestamp,
            blockchain_hash: raw.consensus_timestamp.clone(),
            blockchain_link: format!("{HASHSCAN_BASE_URL}/{}", raw.consensus_timestamp),
            consensus_timestamp: raw.consensus_timestamp.clone(),
            sequence_number: raw.sequence_number,
            execution_time: execution_time.value() as u64,
            execution_time_estimated: execution_time.is_estimated(),
            success,
            confidence: confidence.value(),
            confidence_estimated: confidence.is_estimated(),
            sources,
        }
    }

    /// Builds the record for a self-contained direct oracle message.
    fn build_direct_record(&self, payload: &Value, raw: &RawTopicMessage) -> ParsedQueryHistory {
        let provider = normalize::detect_provider(payload, &raw.topic_id, &self.config);
        let result = normalize::extract_result(payload);
        let execution_time = normalize::extract_execution_time(payload);
        let confidence = normalize::extract_confidence(payload);
        let timestamp = normalize::normalize_timestamp(payload.get("timestamp"));

        let id = payload
            .get("query_id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            // Consensus timestamps are unique within a topic, which is
            // close enough to an ID here; duplicates across topics are not
            // deduplicated.
            .unwrap_or_else(|| raw.consensus_timestamp.clone());

        let query = payload
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let success = payload.get("answer").is_some()
            || payload.get("result").map(|r| !r.is_null()).unwrap_or(false);

        let sources = payload
            .pointer("/result/sources")
            .and_then(Value::as_array)
            .map(|listed| {
                listed
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|listed| !listed.is_empty())
            .unwrap_or_else(|| vec![provider.clone()]);

        let blockchain_hash = payload
            .get("blockchain_hash")
            .and_then(Value::as_str)
            .unwrap_or(&raw.consensus_timestamp)
            .to_string();

        ParsedQueryHistory {
            id,
            query,
            provider,
            result,
            timestamp,
            blockchain_link: format!("{HASHSCAN_BASE_URL}/{blockchain_hash}"),
            blockchain_hash,
            consensus_timestamp: raw.consensus_timestamp.clone(),
            sequence_number: raw.sequence_number,
            execution_time: execution_time.value() as u64,
            execution_time_estimated: execution_time.is_estimated(),
            success,
            confidence: confidence.value(),
            confidence_estimated: confidence.is_estimated(),
            sources,
        }
    }
}

/// Base64 → UTF-8 → JSON. Failures are logged and the message is skipped;
/// one garbled message never blocks the rest of the scan.
pub fn decode_message(message: &RawTopicMessage) -> Option<Value> {
    let bytes = match BASE64.decode(&message.message) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(
                topic_id = %message.topic_id,
                sequence = message.sequence_number,
                error = %err,
                "message is not valid base64, skipping"
            );
            return None;
        }
    };

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            debug!(
                topic_id = %message.topic_id,
                sequence = message.sequence_number,
                error = %err,
                "message is not valid UTF-8, skipping"
            );
            return None;
        }
    };

    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(
                topic_id = %message.topic_id,
                sequence = message.sequence_number,
                error = %err,
                "message is not valid JSON, skipping"
            );
            None
        }
    }
}

/// Classifies a decoded payload by field presence, first match wins.
pub fn classify_payload(payload: Value) -> DecodedPayload {
    match payload.get("type").and_then(Value::as_str) {
        Some("ORACLE_QUERY") => {
            if let Ok(query) = serde_json::from_value::<OracleQueryMessage>(payload.clone()) {
                return DecodedPayload::OracleQuery(query);
            }
            DecodedPayload::Unrecognized(payload)
        }
        Some("COMPUTE_OPERATION") => {
            if let Ok(operation) =
                serde_json::from_value::<ComputeOperationMessage>(payload.clone())
            {
                return DecodedPayload::ComputeOperation(operation, payload);
            }
            DecodedPayload::Unrecognized(payload)
        }
        _ => {
            let direct = payload.get("oracle_used").is_some()
                || payload.get("answer").is_some()
                || payload.get("raw_data").is_some()
                || (payload.pointer("/result/value").and_then(Value::as_f64).is_some()
                    && payload.get("query").is_some());

            if direct {
                DecodedPayload::DirectOracle(payload)
            } else {
                // Intentional drop: unknown shapes are counted, never
                // surfaced as records.
                DecodedPayload::Unrecognized(payload)
            }
        }
    }
}
