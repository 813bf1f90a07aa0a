//! Order store
//!
//! Durable persistence of the order aggregate. An order, its delivery, its
//! payment and all its items commit or roll back together.
//!
//! ```text
//!          ┌──────────────────┐
//!          │ OrderStore trait │
//!          └────────┬─────────┘
//!          ┌────────┴────────┐
//!          ▼                 ▼
//!    PgOrderStore     MemoryOrderStore
//!    (PostgreSQL)     (in-process)
//! ```

pub mod memory;
pub mod orders;

pub use memory::{FaultPoint, MemoryOrderStore, TableCounts};
pub use orders::PgOrderStore;

use async_trait::async_trait;
use shared::Order;

use crate::error::OrderResult;

/// Durable order storage, safe for concurrent use
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist one order and all its sub-entities in a single transaction.
    ///
    /// A second write for an already stored `order_uid` fails with
    /// [`OrderError::Duplicate`](crate::error::OrderError::Duplicate) and
    /// writes nothing.
    async fn save_order(&self, order: &Order) -> OrderResult<()>;

    /// Point lookup. `Ok(None)` when no committed order has this identifier.
    async fn get_order_by_id(&self, order_uid: &str) -> OrderResult<Option<Order>>;

    /// Every stored order, fully populated (warm-restore source)
    async fn restore_cache(&self) -> OrderResult<Vec<Order>>;
}
