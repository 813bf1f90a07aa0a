//! In-process order cache

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use shared::Order;

use super::{OrderCache, cache_key};
use crate::error::{OrderError, OrderResult};

/// [`OrderCache`] over a `DashMap`, storing the same JSON bytes Redis would
#[derive(Debug, Default)]
pub struct MemoryOrderCache {
    entries: DashMap<String, Vec<u8>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryOrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, order_uid: &str) -> bool {
        self.entries.contains_key(&cache_key(order_uid))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Successful `set` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Put an arbitrary value under `order_uid`, bypassing serialization
    pub fn insert_raw(&self, order_uid: &str, payload: Vec<u8>) {
        self.entries.insert(cache_key(order_uid), payload);
    }
}

#[async_trait]
impl OrderCache for MemoryOrderCache {
    async fn set(&self, order: &Order) -> OrderResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OrderError::cache("cache unavailable"));
        }
        let payload = order.to_json().map_err(OrderError::cache)?;
        self.entries.insert(cache_key(&order.order_uid), payload);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, order_uid: &str) -> OrderResult<Option<Order>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(OrderError::cache("cache unavailable"));
        }
        let Some(entry) = self.entries.get(&cache_key(order_uid)) else {
            return Ok(None);
        };
        let order = Order::from_json(entry.value()).map_err(OrderError::cache)?;
        Ok(Some(order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::sample_order;

    #[tokio::test]
    async fn test_set_get_overwrite() {
        let cache = MemoryOrderCache::new();
        let mut order = sample_order("ORDER00000000000001");
        assert!(cache.get(&order.order_uid).await.unwrap().is_none());

        cache.set(&order).await.unwrap();
        assert_eq!(cache.get(&order.order_uid).await.unwrap(), Some(order.clone()));

        order.track_number = "WBILMTESTTRACK2".into();
        cache.set(&order).await.unwrap();
        assert_eq!(cache.get(&order.order_uid).await.unwrap(), Some(order));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.write_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_toggles() {
        let cache = MemoryOrderCache::new();
        let order = sample_order("ORDER00000000000001");
        cache.set_fail_writes(true);
        assert!(matches!(cache.set(&order).await, Err(OrderError::Cache(_))));
        assert!(cache.is_empty());

        cache.set_fail_writes(false);
        cache.set(&order).await.unwrap();
        cache.set_fail_reads(true);
        assert!(cache.get(&order.order_uid).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_cache_error() {
        let cache = MemoryOrderCache::new();
        cache.insert_raw("ORDER00000000000001", b"not json".to_vec());
        assert!(matches!(
            cache.get("ORDER00000000000001").await,
            Err(OrderError::Cache(_))
        ));
    }
}
