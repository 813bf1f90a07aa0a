//! Write path: one feed message → at most one committed order
//!
//! | step fails with           | result                         | acked |
//! |---------------------------|--------------------------------|-------|
//! | decode / validation       | `Outcome::Rejected`            | yes   |
//! | store refuses the data    | `Outcome::Rejected`            | yes   |
//! | duplicate `order_uid`     | `Outcome::Duplicate`           | yes   |
//! | store, policy `Drop`      | `Outcome::Dropped`             | yes   |
//! | store, policy `Redeliver` | `Err(OrderError::Store)`       | no    |
//! | cache write-through       | `Outcome::Persisted` (logged)  | yes   |

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use shared::Order;

use super::OrderPipeline;
use crate::error::{OrderError, OrderResult};
use crate::feed::MessageHandler;

/// What the write path does when the store rejects a write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreFailurePolicy {
    /// Leave the message unacknowledged so the feed delivers it again
    #[default]
    Redeliver,
    /// Log and acknowledge; the order is lost
    Drop,
}

impl FromStr for StoreFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redeliver" => Ok(Self::Redeliver),
            "drop" => Ok(Self::Drop),
            other => Err(format!(
                "invalid store failure policy '{other}', expected 'redeliver' or 'drop'"
            )),
        }
    }
}

impl fmt::Display for StoreFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redeliver => write!(f, "redeliver"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

/// Terminal state of one ingested message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Committed to the store (cache write-through attempted)
    Persisted,
    /// Already stored; nothing written
    Duplicate,
    /// Undecodable, invalid or refused by the store; never retried
    Rejected,
    /// Store failed under [`StoreFailurePolicy::Drop`]
    Dropped,
}

impl OrderPipeline {
    /// Decode, validate and persist one payload
    pub async fn process_message(&self, payload: &[u8]) -> OrderResult<Outcome> {
        let order = match Order::from_json(payload).map_err(OrderError::Malformed) {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(error = %e, bytes = payload.len(), "Rejected order message");
                return Ok(Outcome::Rejected);
            }
        };
        self.save_order(&order).await
    }

    /// Validate and persist an order, then write it through to the cache
    pub async fn save_order(&self, order: &Order) -> OrderResult<Outcome> {
        if let Err(e) = order.check().map_err(OrderError::Invalid) {
            tracing::warn!(order_uid = %order.order_uid, error = %e, "Rejected invalid order");
            return Ok(Outcome::Rejected);
        }

        match self.store.save_order(order).await {
            Ok(()) => {}
            Err(OrderError::Duplicate(order_uid)) => {
                tracing::info!(order_uid = %order_uid, "Order already stored, skipping");
                return Ok(Outcome::Duplicate);
            }
            Err(e @ OrderError::Rejected(_)) => {
                tracing::warn!(order_uid = %order.order_uid, error = %e, "Store refused order, skipping");
                return Ok(Outcome::Rejected);
            }
            Err(e) => match self.store_failure_policy {
                StoreFailurePolicy::Redeliver => {
                    tracing::error!(order_uid = %order.order_uid, error = %e, "Store write failed, awaiting redelivery");
                    return Err(e);
                }
                StoreFailurePolicy::Drop => {
                    tracing::error!(order_uid = %order.order_uid, error = %e, "Store write failed, dropping order");
                    return Ok(Outcome::Dropped);
                }
            },
        }

        if let Err(e) = self.cache.set(order).await {
            tracing::warn!(order_uid = %order.order_uid, error = %e, "Cache write-through failed");
        }

        tracing::info!(
            order_uid = %order.order_uid,
            items = order.items.len(),
            "Order saved"
        );
        Ok(Outcome::Persisted)
    }
}

#[async_trait]
impl MessageHandler for OrderPipeline {
    async fn handle(&self, payload: &[u8]) -> OrderResult<()> {
        self.process_message(payload).await.map(|_| ())
    }
}
