//! In-process order store
//!
//! Mirrors the PostgreSQL layout (delivery, payment, orders, item) so that a
//! failed write can be checked table by table. Writes are staged and applied
//! under one lock only after every step succeeds.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use shared::{Delivery, Item, Order, Payment};

use super::OrderStore;
use crate::error::{OrderError, OrderResult};

/// Step at which an injected failure aborts a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Delivery,
    Payment,
    Order,
    /// Insert of the item at this index
    Item(usize),
    Commit,
}

/// `orders` row: header fields plus references into the other tables
#[derive(Debug, Clone)]
struct OrderRecord {
    header: Order,
    delivery_id: u64,
    payment_id: u64,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    delivery: BTreeMap<u64, Delivery>,
    payment: BTreeMap<u64, Payment>,
    orders: BTreeMap<String, OrderRecord>,
    item: Vec<(String, Item)>,
}

impl Tables {
    fn assemble(&self, record: &OrderRecord) -> Option<Order> {
        let mut order = record.header.clone();
        order.delivery = self.delivery.get(&record.delivery_id)?.clone();
        order.payment = self.payment.get(&record.payment_id)?.clone();
        order.items = self
            .item
            .iter()
            .filter(|(uid, _)| *uid == order.order_uid)
            .map(|(_, item)| item.clone())
            .collect();
        Some(order)
    }
}

/// Row counts per table, for atomicity checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub delivery: usize,
    pub payment: usize,
    pub orders: usize,
    pub item: usize,
}

/// In-memory [`OrderStore`] with fault injection
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    tables: Mutex<Tables>,
    fault: Mutex<Option<FaultPoint>>,
    refused: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
    reads: AtomicUsize,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent write at `fault` until cleared with `None`
    pub fn set_fault(&self, fault: Option<FaultPoint>) {
        if let Ok(mut guard) = self.fault.lock() {
            *guard = fault;
        }
    }

    /// Refuse every write of `order_uid` as a data error (like a CHECK
    /// violation); retrying never helps
    pub fn refuse_order(&self, order_uid: &str) {
        if let Ok(mut refused) = self.refused.lock() {
            refused.insert(order_uid.to_string());
        }
    }

    /// Simulate a lost connection: every operation fails
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of point lookups served
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> TableCounts {
        self.tables
            .lock()
            .map(|t| TableCounts {
                delivery: t.delivery.len(),
                payment: t.payment.len(),
                orders: t.orders.len(),
                item: t.item.len(),
            })
            .unwrap_or_default()
    }

    fn check_available(&self) -> OrderResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OrderError::store("store unavailable"));
        }
        Ok(())
    }

    fn fail_at(&self, step: FaultPoint) -> OrderResult<()> {
        let fault = self.fault.lock().map_err(|_| OrderError::store("fault lock poisoned"))?;
        if *fault == Some(step) {
            return Err(OrderError::store(format!("injected failure at {step:?}")));
        }
        Ok(())
    }

    fn lock_tables(&self) -> OrderResult<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| OrderError::store("store lock poisoned"))
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn save_order(&self, order: &Order) -> OrderResult<()> {
        self.check_available()?;
        let mut tables = self.lock_tables()?;

        // Stage every row first; nothing touches `tables` until commit
        let delivery_id = tables.next_id + 1;
        self.fail_at(FaultPoint::Delivery)?;
        let payment_id = tables.next_id + 2;
        self.fail_at(FaultPoint::Payment)?;

        self.fail_at(FaultPoint::Order)?;
        let refused = self
            .refused
            .lock()
            .map_err(|_| OrderError::store("refused lock poisoned"))?
            .contains(&order.order_uid);
        if refused {
            return Err(OrderError::Rejected(
                format!("order {} violates a table constraint", order.order_uid).into(),
            ));
        }
        if tables.orders.contains_key(&order.order_uid) {
            return Err(OrderError::Duplicate(order.order_uid.clone()));
        }
        let mut header = order.clone();
        header.items.clear();

        let mut staged_items = Vec::with_capacity(order.items.len());
        for (index, item) in order.items.iter().enumerate() {
            self.fail_at(FaultPoint::Item(index))?;
            staged_items.push((order.order_uid.clone(), item.clone()));
        }

        self.fail_at(FaultPoint::Commit)?;

        tables.next_id += 2;
        tables.delivery.insert(delivery_id, order.delivery.clone());
        tables.payment.insert(payment_id, order.payment.clone());
        tables.orders.insert(
            order.order_uid.clone(),
            OrderRecord {
                header,
                delivery_id,
                payment_id,
            },
        );
        tables.item.extend(staged_items);

        tracing::debug!(order_uid = %order.order_uid, "Order committed (memory)");
        Ok(())
    }

    async fn get_order_by_id(&self, order_uid: &str) -> OrderResult<Option<Order>> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let tables = self.lock_tables()?;
        Ok(tables
            .orders
            .get(order_uid)
            .and_then(|record| tables.assemble(record)))
    }

    async fn restore_cache(&self) -> OrderResult<Vec<Order>> {
        self.check_available()?;
        let tables = self.lock_tables()?;
        Ok(tables
            .orders
            .values()
            .filter_map(|record| tables.assemble(record))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::sample_order;

    #[tokio::test]
    async fn test_save_then_get() {
        let store = MemoryOrderStore::new();
        let order = sample_order("ORDER00000000000001");
        store.save_order(&order).await.unwrap();

        let loaded = store.get_order_by_id("ORDER00000000000001").await.unwrap();
        assert_eq!(loaded, Some(order));
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_order_is_none() {
        let store = MemoryOrderStore::new();
        assert!(
            store
                .get_order_by_id("UNKNOWN0000000000001")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_fault_at_every_step_leaves_no_rows() {
        let mut order = sample_order("ORDER00000000000002");
        let extra = order.items[0].clone();
        order.items.push(extra);

        for fault in [
            FaultPoint::Delivery,
            FaultPoint::Payment,
            FaultPoint::Order,
            FaultPoint::Item(0),
            FaultPoint::Item(1),
            FaultPoint::Commit,
        ] {
            let store = MemoryOrderStore::new();
            store.set_fault(Some(fault));
            assert!(store.save_order(&order).await.is_err(), "{fault:?}");
            assert_eq!(store.counts(), TableCounts::default(), "{fault:?}");
            assert!(store.get_order_by_id(&order.order_uid).await.unwrap().is_none());

            store.set_fault(None);
            store.save_order(&order).await.unwrap();
            let counts = store.counts();
            assert_eq!(counts.orders, 1);
            assert_eq!(counts.item, 2);
        }
    }

    #[tokio::test]
    async fn test_duplicate_rejected_without_writes() {
        let store = MemoryOrderStore::new();
        let order = sample_order("ORDER00000000000003");
        store.save_order(&order).await.unwrap();
        let before = store.counts();

        let err = store.save_order(&order).await.unwrap_err();
        assert!(matches!(err, OrderError::Duplicate(uid) if uid == order.order_uid));
        assert_eq!(store.counts(), before);
    }

    #[tokio::test]
    async fn test_refused_order_is_rejected_without_writes() {
        let store = MemoryOrderStore::new();
        let order = sample_order("ORDER00000000000007");
        store.refuse_order(&order.order_uid);

        let err = store.save_order(&order).await.unwrap_err();
        assert!(matches!(err, OrderError::Rejected(_)));
        assert!(err.is_malformed());
        assert_eq!(store.counts(), TableCounts::default());
    }

    #[tokio::test]
    async fn test_unavailable_fails_everything() {
        let store = MemoryOrderStore::new();
        store.set_unavailable(true);
        let order = sample_order("ORDER00000000000004");
        assert!(matches!(
            store.save_order(&order).await,
            Err(OrderError::Store(_))
        ));
        assert!(store.get_order_by_id(&order.order_uid).await.is_err());
        assert!(store.restore_cache().await.is_err());
    }

    #[tokio::test]
    async fn test_restore_returns_all_orders_with_items() {
        let store = MemoryOrderStore::new();
        let a = sample_order("ORDER00000000000005");
        let mut b = sample_order("ORDER00000000000006");
        b.items.clear();
        store.save_order(&a).await.unwrap();
        store.save_order(&b).await.unwrap();

        let mut restored = store.restore_cache().await.unwrap();
        restored.sort_by(|x, y| x.order_uid.cmp(&y.order_uid));
        assert_eq!(restored, vec![a, b]);
    }
}
