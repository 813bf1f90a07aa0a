//! Application state for order-service

use std::sync::Arc;

use crate::cache::RedisOrderCache;
use crate::config::Config;
use crate::db::PgOrderStore;
use crate::error::OrderResult;
use crate::feed::{RedisStreamFeed, StreamSettings};
use crate::pipeline::OrderPipeline;

/// Connected collaborators shared by every task
#[derive(Clone)]
pub struct AppState {
    pub pipeline: OrderPipeline,
    /// Consumer group feed
    pub feed: Arc<RedisStreamFeed>,
    /// Generator's producer, on its own connection so a blocking group read
    /// never delays an `XADD`
    pub producer: Arc<RedisStreamFeed>,
    pub store: PgOrderStore,
}

impl AppState {
    /// Connect PostgreSQL (running migrations) and Redis, then assemble the pipeline
    pub async fn new(config: &Config) -> OrderResult<Self> {
        let store =
            PgOrderStore::connect(&config.database_url, config.database_max_connections).await?;
        tracing::info!("Connected to PostgreSQL, migrations applied");

        let cache = RedisOrderCache::connect(&config.redis_url).await?;
        let settings = StreamSettings {
            stream: config.feed_stream.clone(),
            group: config.feed_group.clone(),
            consumer: config.feed_consumer.clone(),
            block: config.feed_block,
            batch: config.feed_batch,
            claim_idle: config.feed_claim_idle,
            max_deliveries: config.feed_max_deliveries,
            dead_letter_stream: config.feed_dead_letter_stream.clone(),
        };
        let feed = RedisStreamFeed::connect(&config.redis_url, settings.clone()).await?;
        let producer = RedisStreamFeed::connect(&config.redis_url, settings).await?;
        tracing::info!("Connected to Redis");

        let pipeline = OrderPipeline::new(Arc::new(store.clone()), Arc::new(cache))
            .with_store_failure_policy(config.store_failure_policy);

        Ok(Self {
            pipeline,
            feed: Arc::new(feed),
            producer: Arc::new(producer),
            store,
        })
    }
}
