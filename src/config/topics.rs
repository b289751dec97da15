use std::collections::HashMap;
use std::env;

/// Default HCS topics the aggregator always scans, even when the backend
/// topic registry is unreachable.
const DEFAULT_KNOWN_TOPICS: &[&str] = &[
    "0.0.6124611",
    "0.0.6124612",
    "0.0.6124613",
    "0.0.6139083",
    "0.0.6139084",
    "0.0.6142091",
    "0.0.6142092",
    "0.0.6147777",
    "0.0.6147778",
    "0.0.6153500",
    "0.0.6153501",
];

/// Topics whose messages can be attributed to a provider purely by origin,
/// used as the last inference step before giving up with "unknown".
const DEFAULT_TOPIC_PROVIDER_MAP: &[(&str, &str)] = &[
    ("0.0.6139083", "weather"),
    ("0.0.6142091", "chatbot"),
];

/// Numeric price results published on this topic come from the DIA feed;
/// the same shape on any other topic is attributed to CoinGecko.
const DEFAULT_DIA_PRICE_TOPIC: &str = "0.0.6124612";

const DEFAULT_MIRROR_NODE_URL: &str = "https://testnet.mirrornode.hedera.com";
const DEFAULT_BACKEND_URL: &str = "http://localhost:4001";
const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Topic-scanning and provider-inference configuration, loaded once at
/// startup so topic sets can change without a rebuild.
#[derive(Clone, Debug)]
pub struct TopicsConfig {
    pub known_topics: Vec<String>,
    pub provider_topic_map: HashMap<String, String>,
    pub dia_price_topic: String,
    pub mirror_node_url: String,
    pub backend_url: String,
    pub max_concurrent_fetches: usize,
}

impl TopicsConfig {
    pub fn from_env() -> Self {
        let known_topics = env::var("KNOWN_TOPIC_IDS")
            .map(|raw| parse_topic_list(&raw))
            .ok()
            .filter(|topics| !topics.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_KNOWN_TOPICS.iter().map(ToString::to_string).collect()
            });

        let provider_topic_map = env::var("TOPIC_PROVIDER_MAP")
            .map(|raw| parse_provider_map(&raw))
            .ok()
            .filter(|map| !map.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_TOPIC_PROVIDER_MAP
                    .iter()
                    .map(|(topic, provider)| (topic.to_string(), provider.to_string()))
                    .collect()
            });

        Self {
            known_topics,
            provider_topic_map,
            dia_price_topic: env::var("DIA_PRICE_TOPIC_ID")
                .unwrap_or_else(|_| DEFAULT_DIA_PRICE_TOPIC.to_string()),
            mirror_node_url: env::var("MIRROR_NODE_URL")
                .unwrap_or_else(|_| DEFAULT_MIRROR_NODE_URL.to_string()),
            backend_url: env::var("ORACLE_BACKEND_URL")
                .unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string()),
            max_concurrent_fetches: env::var("MAX_CONCURRENT_TOPIC_FETCHES")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONCURRENT_FETCHES),
        }
    }

    /// Provider name for a topic, when the topic alone identifies the source.
    pub fn provider_for_topic(&self, topic_id: &str) -> Option<&str> {
        self.provider_topic_map.get(topic_id).map(String::as_str)
    }
}

fn parse_topic_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parses `topic=provider` pairs separated by commas.
fn parse_provider_map(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (topic, provider) = pair.split_once('=')?;
            let topic = topic.trim();
            let provider = provider.trim();
            if topic.is_empty() || provider.is_empty() {
                return None;
            }
            Some((topic.to_string(), provider.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_topic_list_with_whitespace_and_empties() {
        let topics = parse_topic_list("0.0.1, 0.0.2,, 0.0.3 ,");
        assert_eq!(topics, vec!["0.0.1", "0.0.2", "0.0.3"]);
    }

    #[test]
    fn parses_provider_map_pairs() {
        let map = parse_provider_map("0.0.10=weather, 0.0.11=chatbot, bad-entry");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("0.0.10").map(String::as_str), Some("weather"));
        assert_eq!(map.get("0.0.11").map(String::as_str), Some("chatbot"));
    }

    #[test]
    fn defaults_cover_known_topics_and_fallback_map() {
        let config = TopicsConfig::from_env();
        assert!(!config.known_topics.is_empty());
        assert!(config.known_topics.contains(&config.dia_price_topic));
        assert!(config.provider_for_topic("0.0.6139083").is_some());
        assert!(config.provider_for_topic("0.0.9999999").is_none());
    }
}
