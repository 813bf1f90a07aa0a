//! Order service configuration

use std::time::Duration;

use crate::pipeline::StoreFailurePolicy;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Order service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum pooled PostgreSQL connections
    pub database_max_connections: u32,
    /// Redis connection URL (cache and feed)
    pub redis_url: String,
    /// Redis stream carrying order messages
    pub feed_stream: String,
    /// Consumer group name
    pub feed_group: String,
    /// Consumer name within the group; must stay the same across restarts
    /// of one instance so its pending entries are picked up again
    pub feed_consumer: String,
    /// How long one XREADGROUP blocks waiting for messages
    pub feed_block: Duration,
    /// Max messages fetched per read
    pub feed_batch: usize,
    /// Idle time after which another consumer's pending entries are claimed
    pub feed_claim_idle: Duration,
    /// Failed deliveries before a message is dead-lettered (0: unlimited)
    pub feed_max_deliveries: u32,
    /// Stream receiving dead-lettered messages
    pub feed_dead_letter_stream: String,
    /// HTTP port for the read API
    pub http_port: u16,
    /// Synthetic order interval; `None` disables the generator
    pub generator_interval: Option<Duration>,
    /// What the write path does when the store rejects a write
    pub store_failure_policy: StoreFailurePolicy,
    /// Environment: development | staging | production
    pub environment: String,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Consumer name derived from the host name, stable across restarts
fn default_consumer_name(hostname: Option<String>) -> String {
    match hostname.map(|h| h.trim().to_string()) {
        Some(host) if !host.is_empty() => format!("order-service-{host}"),
        _ => "order-service".to_string(),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let generator_secs: u64 = env_or("GENERATOR_INTERVAL_SECS", 10);
        let store_failure_policy = match std::env::var("STORE_FAILURE_POLICY") {
            Ok(v) => v.parse::<StoreFailurePolicy>()?,
            Err(_) => StoreFailurePolicy::default(),
        };

        let feed_stream = std::env::var("FEED_STREAM").unwrap_or_else(|_| "orders".into());
        let feed_dead_letter_stream = std::env::var("FEED_DEAD_LETTER_STREAM")
            .unwrap_or_else(|_| format!("{feed_stream}:dead"));

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".into()),
            feed_stream,
            feed_group: std::env::var("FEED_GROUP")
                .unwrap_or_else(|_| "order-consumer-group".into()),
            feed_consumer: std::env::var("FEED_CONSUMER")
                .unwrap_or_else(|_| default_consumer_name(std::env::var("HOSTNAME").ok())),
            feed_block: Duration::from_millis(env_or("FEED_BLOCK_MS", 1000)),
            feed_batch: env_or("FEED_BATCH", 16),
            feed_claim_idle: Duration::from_millis(env_or("FEED_CLAIM_IDLE_MS", 60_000)),
            feed_max_deliveries: env_or("FEED_MAX_DELIVERIES", 5),
            feed_dead_letter_stream,
            http_port: env_or("HTTP_PORT", 8081),
            generator_interval: (generator_secs > 0).then(|| Duration::from_secs(generator_secs)),
            store_failure_policy,
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        })
    }
}
