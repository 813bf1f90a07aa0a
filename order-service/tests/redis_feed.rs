//! Redis Streams feed tests
//!
//! Run with `--features redis-tests` against a disposable Redis named by
//! `REDIS_URL`. Each test uses its own stream.

#![cfg(feature = "redis-tests")]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use order_service::{OrderError, OrderResult};
use order_service::feed::{
    FeedConsumer, FeedProducer, MessageHandler, RedisStreamFeed, StreamSettings,
};
use rand::Rng;
use rand::distributions::Alphanumeric;
use redis::AsyncCommands;
use redis::streams::{StreamPendingReply, StreamRangeReply};
use tokio_util::sync::CancellationToken;

const GROUP: &str = "order-tests";

fn redis_url() -> String {
    std::env::var("REDIS_URL").expect("REDIS_URL must be set for redis-tests")
}

fn settings(consumer: &str) -> StreamSettings {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    let stream = format!("orders-test-{suffix}");
    StreamSettings {
        dead_letter_stream: format!("{stream}:dead"),
        stream,
        group: GROUP.into(),
        consumer: consumer.into(),
        block: Duration::from_millis(200),
        batch: 16,
        claim_idle: Duration::from_secs(60),
        max_deliveries: 5,
    }
}

async fn feed(settings: StreamSettings) -> RedisStreamFeed {
    RedisStreamFeed::connect(&redis_url(), settings)
        .await
        .expect("connect")
        .with_retry_backoff(Duration::from_millis(20))
}

async fn raw() -> redis::aio::MultiplexedConnection {
    redis::Client::open(redis_url())
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap()
}

/// Records payloads; fails on `failing_payload`
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Vec<u8>>>,
    failing_payload: Option<Vec<u8>>,
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle(&self, payload: &[u8]) -> OrderResult<()> {
        if self.failing_payload.as_deref() == Some(payload) {
            return Err(OrderError::store("connection reset"));
        }
        self.seen.lock().unwrap().push(payload.to_vec());
        Ok(())
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn spawn_consumer(
    feed: Arc<RedisStreamFeed>,
    handler: Arc<Recorder>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<OrderResult<()>> {
    tokio::spawn(async move { feed.consume(handler.as_ref(), shutdown).await })
}

#[tokio::test]
async fn test_entries_stranded_under_old_name_are_claimed() {
    let mut settings = settings("order-service-new");
    settings.claim_idle = Duration::ZERO;
    let stream = settings.stream.clone();
    let feed = Arc::new(feed(settings).await);
    feed.ensure_group().await.unwrap();
    feed.send("ORDER00000000000001", b"stranded").await.unwrap();

    // A previous instance read the entry and died before acking it
    let mut conn = raw().await;
    let _: redis::Value = redis::cmd("XREADGROUP")
        .arg("GROUP")
        .arg(GROUP)
        .arg("order-service-old")
        .arg("COUNT")
        .arg(10)
        .arg("STREAMS")
        .arg(&stream)
        .arg(">")
        .query_async(&mut conn)
        .await
        .unwrap();

    let handler = Arc::new(Recorder::default());
    let shutdown = CancellationToken::new();
    let consumer = spawn_consumer(feed.clone(), handler.clone(), shutdown.clone());

    wait_until(|| handler.seen.lock().unwrap().len() == 1).await;
    shutdown.cancel();
    consumer.await.unwrap().unwrap();

    assert_eq!(*handler.seen.lock().unwrap(), vec![b"stranded".to_vec()]);
    let pending: StreamPendingReply = conn.xpending(&stream, GROUP).await.unwrap();
    assert_eq!(pending.count(), 0);
}

#[tokio::test]
async fn test_failing_entry_is_dead_lettered_and_next_is_handled() {
    let mut settings = settings("order-service-a");
    settings.max_deliveries = 2;
    let (stream, dead_stream) = (settings.stream.clone(), settings.dead_letter_stream.clone());
    let feed = Arc::new(feed(settings).await);
    feed.ensure_group().await.unwrap();
    feed.send("ORDER00000000000002", b"stuck").await.unwrap();
    feed.send("ORDER00000000000003", b"good").await.unwrap();

    let handler = Arc::new(Recorder {
        failing_payload: Some(b"stuck".to_vec()),
        ..Recorder::default()
    });
    let shutdown = CancellationToken::new();
    let consumer = spawn_consumer(feed.clone(), handler.clone(), shutdown.clone());

    let mut conn = raw().await;
    for _ in 0..400 {
        let len: usize = conn.xlen(&dead_stream).await.unwrap();
        if len == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    wait_until(|| !handler.seen.lock().unwrap().is_empty()).await;
    shutdown.cancel();
    consumer.await.unwrap().unwrap();

    assert_eq!(*handler.seen.lock().unwrap(), vec![b"good".to_vec()]);

    let dead: StreamRangeReply = conn.xrange_all(&dead_stream).await.unwrap();
    assert_eq!(dead.ids.len(), 1);
    assert_eq!(dead.ids[0].get::<Vec<u8>>("payload"), Some(b"stuck".to_vec()));
    assert_eq!(
        dead.ids[0].get::<String>("key").as_deref(),
        Some("ORDER00000000000002")
    );

    let pending: StreamPendingReply = conn.xpending(&stream, GROUP).await.unwrap();
    assert_eq!(pending.count(), 0);
}

#[tokio::test]
async fn test_send_is_not_held_up_by_a_blocking_read() {
    let mut settings = settings("order-service-a");
    settings.block = Duration::from_secs(2);
    let consumer_feed = Arc::new(feed(settings.clone()).await);
    let producer = feed(settings).await;
    consumer_feed.ensure_group().await.unwrap();

    let handler = Arc::new(Recorder::default());
    let shutdown = CancellationToken::new();
    let consumer = spawn_consumer(consumer_feed, handler.clone(), shutdown.clone());

    // Let the consumer park in XREADGROUP BLOCK
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = Instant::now();
    producer.send("ORDER00000000000004", b"fast").await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));

    wait_until(|| handler.seen.lock().unwrap().len() == 1).await;
    shutdown.cancel();
    consumer.await.unwrap().unwrap();
}
