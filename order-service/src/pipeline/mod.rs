//! Order pipeline
//!
//! Stateless orchestration over an [`OrderStore`] and an [`OrderCache`]:
//!
//! - **read**: cache first, store on miss, populate the cache
//! - **ingest**: decode → validate → persist → write-through (see [`ingest`])
//! - **warm restore**: copy every stored order into the cache at startup
//!
//! The store is the source of truth. A cache entry only ever holds an order
//! that was committed first.

mod ingest;

pub use ingest::{Outcome, StoreFailurePolicy};

use std::sync::Arc;

use shared::Order;
use tokio_util::sync::CancellationToken;

use crate::cache::OrderCache;
use crate::db::OrderStore;
use crate::error::{OrderError, OrderResult};
use crate::feed::FeedConsumer;

/// Result of a warm restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Orders written to the cache
    pub restored: usize,
    /// Orders whose cache write failed (still served through the store)
    pub failed: usize,
}

#[derive(Clone)]
pub struct OrderPipeline {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCache>,
    store_failure_policy: StoreFailurePolicy,
}

impl OrderPipeline {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<dyn OrderCache>) -> Self {
        Self {
            store,
            cache,
            store_failure_policy: StoreFailurePolicy::default(),
        }
    }

    pub fn with_store_failure_policy(mut self, policy: StoreFailurePolicy) -> Self {
        self.store_failure_policy = policy;
        self
    }

    pub fn store_failure_policy(&self) -> StoreFailurePolicy {
        self.store_failure_policy
    }

    /// Cache-aside point lookup
    ///
    /// A cache read error falls through to the store and a failed cache
    /// populate still returns the order; only store errors propagate.
    pub async fn get_order(&self, order_uid: &str) -> OrderResult<Order> {
        match self.cache.get(order_uid).await {
            Ok(Some(order)) => {
                tracing::debug!(order_uid = %order_uid, "Cache hit");
                return Ok(order);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(order_uid = %order_uid, error = %e, "Cache read failed, using store");
            }
        }

        let order = self
            .store
            .get_order_by_id(order_uid)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_uid.to_string()))?;

        if let Err(e) = self.cache.set(&order).await {
            tracing::warn!(order_uid = %order_uid, error = %e, "Cache populate failed");
        }
        Ok(order)
    }

    /// Warm restore: load every stored order into the cache.
    ///
    /// Must finish before the consumer starts. Enumeration failure is
    /// returned; a failed `set` is logged and counted.
    pub async fn start(&self) -> OrderResult<RestoreReport> {
        let orders = self.store.restore_cache().await?;
        let mut report = RestoreReport::default();

        for order in &orders {
            match self.cache.set(order).await {
                Ok(()) => report.restored += 1,
                Err(e) => {
                    tracing::warn!(order_uid = %order.order_uid, error = %e, "Skipping order in cache restore");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            restored = report.restored,
            failed = report.failed,
            "Cache restored from store"
        );
        Ok(report)
    }

    /// Run the ingest loop on `feed` until `shutdown` is cancelled
    pub async fn run_consumer(
        &self,
        feed: &dyn FeedConsumer,
        shutdown: CancellationToken,
    ) -> OrderResult<()> {
        feed.consume(self, shutdown).await
    }
}
