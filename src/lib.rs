//! Library entrypoint: re‑export modules

pub mod auth;
pub mod config;
pub mod csv_export;
pub mod errors;
pub mod http;
pub mod metrics;
pub mod normalize;
pub mod query;
pub mod search;
pub mod service;
pub mod store;
pub mod table;
