//! HTTP adapter for the Quill credit ledger.
//!
//! Provides the concrete stores ([`db::SqliteLedgerStore`],
//! [`rate_limit::RedisRateLimitStore`]), the admission middleware, and the
//! `/api` handlers. Process bootstrap lives in `main.rs`.

pub mod config;
pub mod db;
pub mod generator;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
