//! Order cache
//!
//! Key-value store keyed by `order_uid`, holding the order's JSON form.
//! Entries never expire and are overwritten on every set.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryOrderCache;
pub use redis_store::RedisOrderCache;

use async_trait::async_trait;
use shared::Order;

use crate::error::OrderResult;

/// Key prefix for cached orders
pub const KEY_PREFIX: &str = "order:";

pub fn cache_key(order_uid: &str) -> String {
    format!("{KEY_PREFIX}{order_uid}")
}

/// Order cache, safe for concurrent use
#[async_trait]
pub trait OrderCache: Send + Sync {
    /// Store or overwrite the entry for `order.order_uid`
    async fn set(&self, order: &Order) -> OrderResult<()>;

    /// `Ok(None)` on a miss
    async fn get(&self, order_uid: &str) -> OrderResult<Option<Order>>;
}
