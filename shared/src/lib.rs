//! Shared types for the order pipeline
//!
//! The order aggregate (order, delivery, payment, items), its structural
//! validation, and the client-facing error vocabulary used by the service
//! and its HTTP surface.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use models::{Delivery, Item, Order, Payment, is_valid_order_uid};
