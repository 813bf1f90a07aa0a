//! order-service: order ingestion and lookup
//!
//! Orders arrive on a feed, are persisted transactionally in PostgreSQL and
//! written through to a Redis cache. Lookups are served cache-first over
//! HTTP. On startup the cache is rebuilt from the store before the feed
//! consumer starts.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod generator;
pub mod pipeline;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use error::{OrderError, OrderResult};
pub use pipeline::{OrderPipeline, Outcome, RestoreReport, StoreFailurePolicy};
