//! Heuristic normalization of decoded oracle payloads.
//!
//! HCS messages come from several producers with no shared schema, so
//! provider names, result strings, and metrics are inferred from field
//! presence. Every function here is total: the worst case is a generic
//! fallback ("unknown", "Processing...", an estimated metric), never an
//! error.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use rand::Rng;
use serde_json::Value;

use crate::config::TopicsConfig;
use crate::models::Metric;

/// Providers checked first when a message lists several sources.
const SOURCE_PRIORITY: &[&str] = &["coingecko", "dia", "chainlink", "weather"];

/// Model identifiers renamed to their user-facing provider name.
const PROVIDER_RENAMES: &[(&str, &str)] = &[("llama-3.3-70b-instruct", "chatbot")];

/// Explicit latency fields, in preference order. Producers never agreed on
/// a spelling.
const EXECUTION_TIME_FIELDS: &[&str] = &[
    "executionTime",
    "execution_time",
    "executionTimeMs",
    "execution_time_ms",
    "latency_ms",
];

const WEATHER_EMOJI: &[&str] = &["🌤", "☀", "⛅", "🌧", "🌦", "❄", "🌩", "🌫"];

/// Unix timestamps below this are seconds, above it milliseconds.
/// The crossover corresponds to roughly year 2096 in seconds.
const UNIX_MILLIS_THRESHOLD: f64 = 4_000_000_000.0;

/// Infers the provider name for a payload.
///
/// Priority: explicit fields, then listed sources, then content patterns,
/// then the per-topic fallback table, then `"unknown"`. Callers must treat
/// `"unknown"` as a valid answer, not a failure.
pub fn detect_provider(payload: &Value, topic_id: &str, config: &TopicsConfig) -> String {
    if let Some(oracle_used) = payload.get("oracle_used").and_then(Value::as_str) {
        return oracle_used.to_string();
    }

    if let Some(provider) = payload.get("provider").and_then(Value::as_str) {
        return rename_provider(provider).to_string();
    }

    if let Some(sources) = payload.pointer("/result/sources").and_then(Value::as_array) {
        let names: Vec<&str> = sources.iter().filter_map(Value::as_str).collect();
        for preferred in SOURCE_PRIORITY {
            if names.contains(preferred) {
                return preferred.to_string();
            }
        }
        if let Some(first) = names.first() {
            return first.to_string();
        }
    }

    if has_temperature_field(payload) {
        return "weather".to_string();
    }

    let query = payload.get("query").and_then(Value::as_str).unwrap_or("");
    if payload.pointer("/result/value").and_then(Value::as_f64).is_some()
        && query.to_lowercase().contains("price")
    {
        return if topic_id == config.dia_price_topic {
            "dia".to_string()
        } else {
            "coingecko".to_string()
        };
    }

    if payload.get("price").is_some() || payload.pointer("/result/price").is_some() {
        return "coingecko".to_string();
    }

    if let Some(answer) = payload.get("answer").and_then(Value::as_str) {
        if WEATHER_EMOJI.iter().any(|emoji| answer.contains(emoji)) {
            return "weather".to_string();
        }
    }

    if let Some(provider) = config.provider_for_topic(topic_id) {
        return provider.to_string();
    }

    "unknown".to_string()
}

fn rename_provider(provider: &str) -> &str {
    PROVIDER_RENAMES
        .iter()
        .find(|(from, _)| *from == provider)
        .map(|(_, to)| *to)
        .unwrap_or(provider)
}

fn has_temperature_field(payload: &Value) -> bool {
    payload.get("temperature").is_some()
        || payload.pointer("/raw_data/temperature").is_some()
        || payload.pointer("/result/temperature").is_some()
}

/// Display string for a payload's result.
///
/// `"Processing..."` doubles as both "not yet resolved" and "shape not
/// understood"; downstream cannot tell the two apart.
pub fn extract_result(payload: &Value) -> String {
    if let Some(answer) = payload.get("answer").and_then(Value::as_str) {
        return answer.to_string();
    }

    if let Some(value) = payload.pointer("/result/value").and_then(Value::as_f64) {
        return format_usd(value);
    }

    if let Some(price) = payload.pointer("/result/price").and_then(Value::as_f64) {
        return format_usd(price);
    }

    if let Some(result) = payload.get("result") {
        match result {
            Value::String(text) => return text.clone(),
            Value::Number(number) => {
                if let Some(value) = number.as_f64() {
                    return format_usd(value);
                }
            }
            Value::Null => {}
            other => return other.to_string(),
        }
    }

    if let Some(temperature) = payload.pointer("/raw_data/temperature").and_then(Value::as_f64) {
        return format!("{temperature}°C");
    }

    "Processing...".to_string()
}

/// USD currency formatting with thousands grouping and two decimals.
pub fn format_usd(value: f64) -> String {
    let negative = value < 0.0;
    let formatted = format!("{:.2}", value.abs());
    let (whole, cents) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::new();
    let digits: Vec<char> = whole.chars().collect();
    for (index, digit) in digits.iter().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*digit);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}${grouped}.{cents}")
}

/// Execution time in milliseconds.
///
/// Explicit latency fields win and are tagged `Measured`. Completed answers
/// with no latency field get a synthetic value in [500, 2000) tagged
/// `Estimated`. Everything else reports `Measured(0)`, the "no timing data"
/// sentinel.
pub fn extract_execution_time(payload: &Value) -> Metric {
    for field in EXECUTION_TIME_FIELDS {
        if let Some(value) = payload.get(*field).and_then(Value::as_f64) {
            return Metric::Measured(value);
        }
    }

    if looks_like_completed_answer(payload) {
        let estimate = rand::thread_rng().gen_range(500..2000);
        return Metric::Estimated(estimate as f64);
    }

    Metric::Measured(0.0)
}

fn looks_like_completed_answer(payload: &Value) -> bool {
    payload.get("answer").and_then(Value::as_str).is_some()
        || payload.get("oracle_used").is_some()
        || payload.pointer("/result/value").and_then(Value::as_f64).is_some()
}

/// Confidence on a 0-100 scale.
///
/// Values at or below 1 are treated as ratios and scaled once; values above
/// 1 are assumed to be percentages already. Absent confidence defaults to
/// an estimated 95.
pub fn extract_confidence(payload: &Value) -> Metric {
    let explicit = payload
        .pointer("/result/confidence")
        .and_then(Value::as_f64)
        .or_else(|| payload.get("confidence").and_then(Value::as_f64));

    match explicit {
        Some(value) if value <= 1.0 => Metric::Measured(value * 100.0),
        Some(value) => Metric::Measured(value),
        None => Metric::Estimated(95.0),
    }
}

/// Normalizes heterogeneous timestamp formats to an ISO-8601 string.
///
/// Malformed input falls back to the current wall-clock time rather than
/// erroring; a wrong-but-sortable timestamp beats losing the record.
pub fn normalize_timestamp(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => {
            if text.contains('T') {
                return text.clone();
            }
            parse_loose_datetime(text).unwrap_or_else(now_iso)
        }
        Some(Value::Number(number)) => number
            .as_f64()
            .and_then(unix_to_iso)
            .unwrap_or_else(now_iso),
        _ => now_iso(),
    }
}

fn unix_to_iso(raw: f64) -> Option<String> {
    let millis = if raw < UNIX_MILLIS_THRESHOLD {
        raw * 1000.0
    } else {
        raw
    };
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn parse_loose_datetime(text: &str) -> Option<String> {
    if let Ok(numeric) = text.parse::<f64>() {
        return unix_to_iso(numeric);
    }

    let with_time = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    Some(
        Utc.from_utc_datetime(&with_time)
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Sort key for output ordering; unparseable timestamps sink to the epoch.
///
/// Zone-less ISO strings pass through `normalize_timestamp` untouched, so
/// they must parse here too; they are read as UTC.
pub fn sort_key(timestamp: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> TopicsConfig {
        TopicsConfig {
            known_topics: vec!["0.0.1".into(), "0.0.2".into()],
            provider_topic_map: [("0.0.7".to_string(), "weather".to_string())]
                .into_iter()
                .collect(),
            dia_price_topic: "0.0.2".into(),
            mirror_node_url: "http://mirror.invalid".into(),
            backend_url: "http://backend.invalid".into(),
            max_concurrent_fetches: 4,
        }
    }

    #[test]
    fn oracle_used_wins_over_everything() {
        let payload = json!({
            "oracle_used": "weather",
            "provider": "coingecko",
            "result": { "sources": ["dia"] }
        });
        assert_eq!(detect_provider(&payload, "0.0.1", &config()), "weather");
    }

    #[test]
    fn provider_field_applies_model_rename() {
        let payload = json!({ "provider": "llama-3.3-70b-instruct" });
        assert_eq!(detect_provider(&payload, "0.0.1", &config()), "chatbot");

        let payload = json!({ "provider": "coingecko" });
        assert_eq!(detect_provider(&payload, "0.0.1", &config()), "coingecko");
    }

    #[test]
    fn sources_respect_priority_order() {
        let payload = json!({ "result": { "sources": ["weather", "dia"] } });
        assert_eq!(detect_provider(&payload, "0.0.1", &config()), "dia");

        let payload = json!({ "result": { "sources": ["custom-feed"] } });
        assert_eq!(detect_provider(&payload, "0.0.1", &config()), "custom-feed");
    }

    #[test]
    fn price_query_provider_depends_on_topic() {
        let payload = json!({ "result": { "value": 45000.0 }, "query": "BTC price" });
        assert_eq!(detect_provider(&payload, "0.0.2", &config()), "dia");
        assert_eq!(detect_provider(&payload, "0.0.1", &config()), "coingecko");
    }

    #[test]
    fn temperature_and_emoji_imply_weather() {
        let payload = json!({ "raw_data": { "temperature": 18 } });
        assert_eq!(detect_provider(&payload, "0.0.1", &config()), "weather");

        let payload = json!({ "answer": "🌤️ 18°C" });
        assert_eq!(detect_provider(&payload, "0.0.1", &config()), "weather");
    }

    #[test]
    fn topic_fallback_then_unknown() {
        let payload = json!({ "note": "nothing identifying" });
        assert_eq!(detect_provider(&payload, "0.0.7", &config()), "weather");
        assert_eq!(detect_provider(&payload, "0.0.99", &config()), "unknown");
    }

    #[test]
    fn result_prefers_answer_then_usd_value() {
        let payload = json!({ "answer": "🌤️ 18°C", "result": { "value": 3.0 } });
        assert_eq!(extract_result(&payload), "🌤️ 18°C");

        let payload = json!({ "result": { "value": 45000 } });
        assert_eq!(extract_result(&payload), "$45,000.00");
    }

    #[test]
    fn result_falls_back_to_temperature_then_placeholder() {
        let payload = json!({ "raw_data": { "temperature": 18.0 } });
        assert_eq!(extract_result(&payload), "18°C");

        let payload = json!({ "unrelated": true });
        assert_eq!(extract_result(&payload), "Processing...");
    }

    #[test]
    fn usd_formatting_groups_thousands() {
        assert_eq!(format_usd(45000.0), "$45,000.00");
        assert_eq!(format_usd(1234567.891), "$1,234,567.89");
        assert_eq!(format_usd(0.5), "$0.50");
        assert_eq!(format_usd(-1200.0), "-$1,200.00");
    }

    #[test]
    fn execution_time_prefers_explicit_fields_in_order() {
        let payload = json!({ "execution_time": 80, "executionTime": 120 });
        assert_eq!(extract_execution_time(&payload), Metric::Measured(120.0));

        let payload = json!({ "latency_ms": 42 });
        assert_eq!(extract_execution_time(&payload), Metric::Measured(42.0));
    }

    #[test]
    fn execution_time_estimates_only_for_completed_answers() {
        let payload = json!({ "answer": "done" });
        let metric = extract_execution_time(&payload);
        assert!(metric.is_estimated());
        assert!((500.0..2000.0).contains(&metric.value()));

        let payload = json!({ "type": "ORACLE_QUERY" });
        assert_eq!(extract_execution_time(&payload), Metric::Measured(0.0));
    }

    #[test]
    fn confidence_scales_ratios_exactly_once() {
        let payload = json!({ "confidence": 0.87 });
        assert_eq!(extract_confidence(&payload).value(), 87.0);

        let payload = json!({ "confidence": 87 });
        assert_eq!(extract_confidence(&payload).value(), 87.0);

        let payload = json!({ "result": { "confidence": 0.5 } });
        assert_eq!(extract_confidence(&payload).value(), 50.0);
    }

    #[test]
    fn confidence_defaults_to_estimated_95() {
        let payload = json!({});
        let metric = extract_confidence(&payload);
        assert_eq!(metric.value(), 95.0);
        assert!(metric.is_estimated());
    }

    #[test]
    fn iso_strings_pass_through_unchanged() {
        let value = json!("2025-01-08T12:00:00Z");
        assert_eq!(normalize_timestamp(Some(&value)), "2025-01-08T12:00:00Z");
    }

    #[test]
    fn unix_seconds_and_millis_are_distinguished() {
        let seconds = json!(1736337600);
        assert_eq!(
            normalize_timestamp(Some(&seconds)),
            "2025-01-08T12:00:00.000Z"
        );

        let millis = json!(1736337600000i64);
        assert_eq!(
            normalize_timestamp(Some(&millis)),
            "2025-01-08T12:00:00.000Z"
        );
    }

    #[test]
    fn malformed_timestamps_fall_back_to_now() {
        let before = Utc::now();
        let value = json!("not a date");
        let normalized = normalize_timestamp(Some(&value));
        let parsed = DateTime::parse_from_rfc3339(&normalized).unwrap();
        assert!(parsed.with_timezone(&Utc) >= before - chrono::Duration::seconds(1));
    }

    #[test]
    fn sort_key_sinks_garbage_to_epoch() {
        assert_eq!(sort_key("garbage").timestamp(), 0);
        assert!(sort_key("2025-01-08T12:00:00Z").timestamp() > 0);
    }

    #[test]
    fn sort_key_orders_zoneless_iso_chronologically() {
        // Zone-less strings survive normalization as-is and must not sink
        // below older zoned timestamps.
        assert!(sort_key("2025-06-01T12:00:00") > sort_key("2020-01-01T00:00:00Z"));
        assert!(sort_key("2025-06-01T12:00:00.500") > sort_key("2025-06-01T12:00:00"));
        assert_eq!(
            sort_key("2025-06-01T12:00:00"),
            sort_key("2025-06-01T12:00:00Z")
        );
    }
}
