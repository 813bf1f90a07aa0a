//! Synthetic order generation
//!
//! [`OrderGenerator`] publishes one random, valid order per interval to a
//! [`FeedProducer`]. Used for local load and demos.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::util::now_micros;
use shared::{Delivery, Item, Order, Payment};
use tokio_util::sync::CancellationToken;

use crate::feed::FeedProducer;

/// Length of generated order identifiers
pub const GENERATED_UID_LEN: usize = 20;

fn random_string<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}

/// A fixed, valid order with the given identifier and one item
pub fn sample_order(order_uid: &str) -> Order {
    Order {
        order_uid: order_uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: order_uid.to_string(),
            request_id: None,
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1637907727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items: vec![Item {
            chrt_id: 9934930,
            track_number: "WBILMTESTTRACK".to_string(),
            price: 453,
            rid: "ab4219087a764ae0btest".to_string(),
            name: "Mascaras".to_string(),
            sale: 30,
            size: "0".to_string(),
            total_price: 317,
            nm_id: 2389212,
            brand: "Vivienne Sabo".to_string(),
            status: 202,
        }],
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shardkey: "9".to_string(),
        sm_id: 99,
        date_created: Utc
            .with_ymd_and_hms(2021, 11, 26, 6, 22, 19)
            .single()
            .unwrap_or_default(),
        oof_shard: "1".to_string(),
    }
}

/// A valid order with a random identifier, stamped with the current time
pub fn random_order<R: Rng + ?Sized>(rng: &mut R) -> Order {
    let order_uid = random_string(rng, GENERATED_UID_LEN);
    let mut order = sample_order(&order_uid);
    let now = now_micros();

    order.payment.request_id = Some(format!("REQ{}", rng.gen_range(0..10_000_000)));
    order.payment.payment_dt = now.timestamp();
    if let Some(item) = order.items.first_mut() {
        item.chrt_id = rng.gen_range(0..10_000_000);
        item.rid = random_string(rng, GENERATED_UID_LEN);
    }
    order.date_created = now;
    order
}

/// Periodic producer of random orders
pub struct OrderGenerator {
    producer: Arc<dyn FeedProducer>,
    interval: Duration,
}

impl OrderGenerator {
    pub fn new(producer: Arc<dyn FeedProducer>, interval: Duration) -> Self {
        Self { producer, interval }
    }

    /// Publish until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval = ?self.interval, "Order generator started");
        let mut rng = StdRng::from_entropy();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let order = random_order(&mut rng);
            let payload = match order.to_json() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode generated order");
                    continue;
                }
            };
            match self.producer.send(&order.order_uid, &payload).await {
                Ok(()) => tracing::debug!(order_uid = %order.order_uid, "Generated order published"),
                Err(e) => tracing::warn!(order_uid = %order.order_uid, error = %e, "Failed to publish generated order"),
            }
        }

        tracing::info!("Order generator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedConsumer, MemoryFeed, MessageHandler};
    use crate::error::OrderResult;
    use async_trait::async_trait;
    use shared::is_valid_order_uid;
    use std::sync::Mutex;

    #[test]
    fn test_sample_order_is_valid() {
        let order = sample_order("ORDER00000000000001");
        assert!(order.check().is_ok());
        assert_eq!(order.payment.transaction, order.order_uid);
        assert_eq!(order.items.len(), 1);
    }

    #[test]
    fn test_random_order_is_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let order = random_order(&mut rng);
            assert_eq!(order.order_uid.len(), GENERATED_UID_LEN);
            assert!(is_valid_order_uid(&order.order_uid));
            assert_eq!(order.payment.transaction, order.order_uid);
            assert_eq!(order.date_created.timestamp_subsec_nanos() % 1000, 0);
            assert!(order.check().is_ok(), "{:?}", order.check());
        }
    }

    #[test]
    fn test_seeded_generation_is_deterministic() {
        let a = random_order(&mut StdRng::seed_from_u64(42));
        let b = random_order(&mut StdRng::seed_from_u64(42));
        assert_eq!(a.order_uid, b.order_uid);
        assert_eq!(a.items, b.items);
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<Order>>);

    #[async_trait]
    impl MessageHandler for Collect {
        async fn handle(&self, payload: &[u8]) -> OrderResult<()> {
            self.0.lock().unwrap().push(Order::from_json(payload).unwrap());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_generator_publishes_until_cancelled() {
        let feed = Arc::new(MemoryFeed::new());
        let shutdown = CancellationToken::new();
        let generator = OrderGenerator::new(feed.clone(), Duration::from_millis(5));
        let task = tokio::spawn(generator.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(40)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        let collect = Collect::default();
        let drain = CancellationToken::new();
        let consumer = {
            let drain = drain.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                drain.cancel();
            }
        };
        let (result, ()) = tokio::join!(feed.consume(&collect, drain.clone()), consumer);
        result.unwrap();

        let orders = collect.0.lock().unwrap();
        assert!(!orders.is_empty());
        assert!(orders.iter().all(|o| o.check().is_ok()));
    }
}
