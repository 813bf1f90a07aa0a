//! Redis-backed order cache

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use shared::Order;

use super::{OrderCache, cache_key};
use crate::error::{OrderError, OrderResult};

/// Order cache on a reconnecting Redis connection
#[derive(Clone)]
pub struct RedisOrderCache {
    conn: ConnectionManager,
}

impl RedisOrderCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> OrderResult<Self> {
        let client = redis::Client::open(redis_url).map_err(OrderError::cache)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(OrderError::cache)?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl OrderCache for RedisOrderCache {
    async fn set(&self, order: &Order) -> OrderResult<()> {
        let payload = order.to_json().map_err(OrderError::cache)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(cache_key(&order.order_uid), payload)
            .await
            .map_err(OrderError::cache)
    }

    async fn get(&self, order_uid: &str) -> OrderResult<Option<Order>> {
        let mut conn = self.conn.clone();
        let payload: Option<Vec<u8>> = conn
            .get(cache_key(order_uid))
            .await
            .map_err(OrderError::cache)?;
        payload
            .map(|bytes| Order::from_json(&bytes).map_err(OrderError::cache))
            .transpose()
    }
}
