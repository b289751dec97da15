pub mod topics;

pub use topics::TopicsConfig;
