//! Business logic services for the OracleHub server

pub mod embedded_json;
pub mod history_aggregator;
pub mod mirror_node;
pub mod normalize;

pub use history_aggregator::HistoryAggregator;
pub use mirror_node::MirrorNodeClient;
