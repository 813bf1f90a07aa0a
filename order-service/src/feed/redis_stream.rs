//! Redis Streams feed
//!
//! Entries carry two fields, `key` (the order uid) and `payload` (JSON).
//! Consumption goes through a consumer group: new entries are read with `>`,
//! and after a handler failure the consumer re-reads its own pending list
//! from id `0` until it is drained.
//!
//! Entries idle in another consumer's pending list for longer than
//! `claim_idle` (a crashed or renamed instance) are taken over with
//! `XAUTOCLAIM` at startup and periodically after. An entry that fails
//! `max_deliveries` times is copied to the dead-letter stream and acked.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use tokio_util::sync::CancellationToken;

use super::{DeliveryTracker, FeedConsumer, FeedProducer, MessageHandler};
use crate::error::{OrderError, OrderResult};

const KEY_FIELD: &str = "key";
const PAYLOAD_FIELD: &str = "payload";
const SOURCE_ID_FIELD: &str = "source_id";
const ERROR_FIELD: &str = "error";
/// `XAUTOCLAIM` cursor meaning the scan is complete
const CLAIM_DONE: &str = "0-0";
/// Pause before re-reading the pending list, and after transport errors
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Stream and consumer group coordinates
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    /// Max time one read waits for new entries
    pub block: Duration,
    /// Max entries per read
    pub batch: usize,
    /// Pending entries idle this long in any consumer are claimed
    pub claim_idle: Duration,
    /// Failed deliveries before an entry is dead-lettered (0: unlimited)
    pub max_deliveries: u32,
    /// Stream receiving dead-lettered entries
    pub dead_letter_stream: String,
}

/// Consumer and producer over one Redis stream
#[derive(Clone)]
pub struct RedisStreamFeed {
    conn: ConnectionManager,
    settings: StreamSettings,
    retry_backoff: Duration,
}

impl RedisStreamFeed {
    pub fn new(conn: ConnectionManager, settings: StreamSettings) -> Self {
        Self {
            conn,
            settings,
            retry_backoff: RETRY_BACKOFF,
        }
    }

    pub async fn connect(redis_url: &str, settings: StreamSettings) -> OrderResult<Self> {
        let client = redis::Client::open(redis_url).map_err(OrderError::feed)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(OrderError::feed)?;
        Ok(Self::new(conn, settings))
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    /// Create the consumer group (and the stream) if missing
    pub async fn ensure_group(&self) -> OrderResult<()> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.settings.stream, &self.settings.group, "$")
            .await;
        match created {
            Ok(()) => {
                tracing::info!(
                    stream = %self.settings.stream,
                    group = %self.settings.group,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(OrderError::feed(e)),
        }
    }

    async fn read(&self, from_pending: bool) -> redis::RedisResult<Vec<StreamId>> {
        let mut options = StreamReadOptions::default()
            .group(&self.settings.group, &self.settings.consumer)
            .count(self.settings.batch);
        // BLOCK only applies to `>`; pending reads return immediately
        if !from_pending {
            options = options.block(self.settings.block.as_millis() as usize);
        }
        let start = if from_pending { "0" } else { ">" };

        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.settings.stream], &[start], &options)
            .await?;
        Ok(reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default())
    }

    /// Take over entries idle longer than `claim_idle` in any consumer's
    /// pending list. Claimed entries join this consumer's pending list.
    pub async fn claim_idle(&self) -> OrderResult<usize> {
        let mut conn = self.conn.clone();
        let mut cursor = CLAIM_DONE.to_string();
        let mut claimed = 0usize;

        loop {
            // Reply: [next-cursor, [ids...], [deleted ids...]] (third part on Redis 7+)
            let reply: Vec<redis::Value> = redis::cmd("XAUTOCLAIM")
                .arg(&self.settings.stream)
                .arg(&self.settings.group)
                .arg(&self.settings.consumer)
                .arg(self.settings.claim_idle.as_millis() as u64)
                .arg(&cursor)
                .arg("COUNT")
                .arg(self.settings.batch)
                .arg("JUSTID")
                .query_async(&mut conn)
                .await
                .map_err(OrderError::feed)?;

            let mut parts = reply.into_iter();
            let next: String = match parts.next() {
                Some(value) => redis::from_redis_value(&value).map_err(OrderError::feed)?,
                None => break,
            };
            let ids: Vec<String> = match parts.next() {
                Some(value) => redis::from_redis_value(&value).map_err(OrderError::feed)?,
                None => Vec::new(),
            };
            claimed += ids.len();

            if next == CLAIM_DONE {
                break;
            }
            cursor = next;
        }

        if claimed > 0 {
            tracing::info!(
                claimed,
                consumer = %self.settings.consumer,
                "Claimed idle pending entries"
            );
        }
        Ok(claimed)
    }

    /// Copy a failing entry to the dead-letter stream, then ack it.
    /// Returns `false` (entry still pending) if the copy fails.
    async fn dead_letter(&self, entry: &StreamId, payload: &[u8], error: &OrderError) -> bool {
        let key = entry.get::<Vec<u8>>(KEY_FIELD).unwrap_or_default();
        let error = error.to_string();
        let mut conn = self.conn.clone();
        let copied: redis::RedisResult<String> = conn
            .xadd(
                &self.settings.dead_letter_stream,
                "*",
                &[
                    (KEY_FIELD, key.as_slice()),
                    (PAYLOAD_FIELD, payload),
                    (SOURCE_ID_FIELD, entry.id.as_bytes()),
                    (ERROR_FIELD, error.as_bytes()),
                ],
            )
            .await;
        match copied {
            Ok(dead_id) => {
                tracing::error!(
                    entry_id = %entry.id,
                    dead_letter_id = %dead_id,
                    stream = %self.settings.dead_letter_stream,
                    "Delivery limit reached, entry dead-lettered"
                );
                self.ack(&entry.id).await;
                true
            }
            Err(e) => {
                tracing::warn!(entry_id = %entry.id, error = %e, "Failed to dead-letter entry, left pending");
                false
            }
        }
    }

    async fn ack(&self, id: &str) {
        let mut conn = self.conn.clone();
        let acked: redis::RedisResult<i64> = conn
            .xack(&self.settings.stream, &self.settings.group, &[id])
            .await;
        if let Err(e) = acked {
            // Entry stays pending and will be handled again
            tracing::warn!(entry_id = %id, error = %e, "Failed to ack feed entry");
        }
    }
}

/// Sleep for `duration` unless `shutdown` fires first. Returns `false` on shutdown.
async fn backoff(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[async_trait]
impl FeedConsumer for RedisStreamFeed {
    async fn consume(
        &self,
        handler: &dyn MessageHandler,
        shutdown: CancellationToken,
    ) -> OrderResult<()> {
        self.ensure_group().await?;
        tracing::info!(
            stream = %self.settings.stream,
            group = %self.settings.group,
            consumer = %self.settings.consumer,
            "Feed consumer started"
        );

        let mut tracker = DeliveryTracker::new(self.settings.max_deliveries);
        // Drain this consumer's own pending list (kept across restarts under
        // the same name), then claim idle entries of other consumers
        let mut from_pending = true;
        let mut last_claim: Option<Instant> = None;

        loop {
            let claim_due = last_claim.is_none_or(|at| at.elapsed() >= self.settings.claim_idle);
            if !from_pending && claim_due {
                last_claim = Some(Instant::now());
                match self.claim_idle().await {
                    Ok(0) => {}
                    Ok(_) => from_pending = true,
                    Err(e) => tracing::warn!(error = %e, "Claiming idle entries failed"),
                }
            }

            let read = tokio::select! {
                _ = shutdown.cancelled() => break,
                read = self.read(from_pending) => read,
            };

            let entries = match read {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(error = %e, "Feed read failed, retrying");
                    if !backoff(self.retry_backoff, &shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if from_pending && entries.is_empty() {
                from_pending = false;
                continue;
            }

            let mut failed = 0usize;
            for entry in entries {
                if shutdown.is_cancelled() {
                    break;
                }
                let Some(payload) = entry.get::<Vec<u8>>(PAYLOAD_FIELD) else {
                    tracing::warn!(entry_id = %entry.id, "Feed entry without payload, skipping");
                    self.ack(&entry.id).await;
                    continue;
                };
                match handler.handle(&payload).await {
                    Ok(()) => {
                        tracker.clear(&entry.id);
                        self.ack(&entry.id).await;
                    }
                    Err(e) if tracker.record_failure(entry.id.clone()) => {
                        if !self.dead_letter(&entry, &payload, &e).await {
                            failed += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            entry_id = %entry.id,
                            failures = tracker.failures(&entry.id),
                            error = %e,
                            "Handler failed, entry left pending"
                        );
                        failed += 1;
                    }
                }
            }

            if failed > 0 {
                from_pending = true;
                if !backoff(self.retry_backoff, &shutdown).await {
                    break;
                }
            }
        }

        tracing::info!("Feed consumer stopped");
        Ok(())
    }
}

#[async_trait]
impl FeedProducer for RedisStreamFeed {
    async fn send(&self, key: &str, payload: &[u8]) -> OrderResult<()> {
        let mut conn = self.conn.clone();
        let _: String = conn
            .xadd(
                &self.settings.stream,
                "*",
                &[(KEY_FIELD, key.as_bytes()), (PAYLOAD_FIELD, payload)],
            )
            .await
            .map_err(OrderError::feed)?;
        Ok(())
    }
}
