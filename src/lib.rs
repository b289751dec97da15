//! OracleHub Aggregation Server Library
//!
//! This library exports the modules of the OracleHub query-history server.

pub mod app_state;
pub mod config;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
