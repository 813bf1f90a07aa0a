//! Order message feed
//!
//! At-least-once delivery of raw order payloads. A consumer hands each
//! payload to a [`MessageHandler`] and acknowledges it only when the handler
//! returns `Ok`; anything else stays pending and is delivered again, up to
//! a delivery limit. A message that keeps failing past the limit is moved
//! to a dead-letter sink and acknowledged so the messages behind it flow.
//!
//! - [`RedisStreamFeed`]: Redis Streams consumer group
//! - [`MemoryFeed`]: in-process channel with the same ack semantics

pub mod memory;
pub mod redis_stream;

pub use memory::MemoryFeed;
pub use redis_stream::{RedisStreamFeed, StreamSettings};

use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::OrderResult;

/// Receives one payload per delivery
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// `Ok` acknowledges the message, `Err` leaves it for redelivery
    async fn handle(&self, payload: &[u8]) -> OrderResult<()>;
}

/// Source of order messages
#[async_trait]
pub trait FeedConsumer: Send + Sync {
    /// Deliver messages to `handler` until `shutdown` is cancelled.
    ///
    /// A failing handler never stops the loop. Returns `Ok(())` on
    /// cancellation and `Err` only when the feed cannot be set up.
    async fn consume(
        &self,
        handler: &dyn MessageHandler,
        shutdown: CancellationToken,
    ) -> OrderResult<()>;
}

/// Sink for order messages (load generation)
#[async_trait]
pub trait FeedProducer: Send + Sync {
    async fn send(&self, key: &str, payload: &[u8]) -> OrderResult<()>;
}

/// Failed-delivery counts per message
///
/// `max_deliveries == 0` disables the limit.
#[derive(Debug)]
pub struct DeliveryTracker<K> {
    max_deliveries: u32,
    failures: HashMap<K, u32>,
}

impl<K: Hash + Eq + Clone> DeliveryTracker<K> {
    pub fn new(max_deliveries: u32) -> Self {
        Self {
            max_deliveries,
            failures: HashMap::new(),
        }
    }

    /// Count one failed delivery of `key`. Returns `true` once the limit is
    /// reached; the count is forgotten at that point.
    pub fn record_failure(&mut self, key: K) -> bool {
        if self.max_deliveries == 0 {
            return false;
        }
        let count = self.failures.entry(key.clone()).or_insert(0);
        *count += 1;
        if *count < self.max_deliveries {
            return false;
        }
        self.failures.remove(&key);
        true
    }

    /// Forget `key` after it was acknowledged
    pub fn clear(&mut self, key: &K) {
        self.failures.remove(key);
    }

    /// Failures recorded so far for `key`
    pub fn failures(&self, key: &K) -> u32 {
        self.failures.get(key).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_reached_on_last_delivery() {
        let mut tracker = DeliveryTracker::new(3);
        assert!(!tracker.record_failure("a"));
        assert!(!tracker.record_failure("b"));
        assert!(!tracker.record_failure("a"));
        assert!(tracker.record_failure("a"));
        assert_eq!(tracker.failures(&"a"), 0);
        assert_eq!(tracker.failures(&"b"), 1);
    }

    #[test]
    fn test_clear_resets_count() {
        let mut tracker = DeliveryTracker::new(2);
        assert!(!tracker.record_failure(7u64));
        tracker.clear(&7);
        assert!(!tracker.record_failure(7));
        assert!(tracker.record_failure(7));
    }

    #[test]
    fn test_zero_means_unlimited() {
        let mut tracker = DeliveryTracker::new(0);
        for _ in 0..100 {
            assert!(!tracker.record_failure("a"));
        }
    }
}
