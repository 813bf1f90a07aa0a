//! Order Model
//!
//! The order aggregate as it travels through the feed, the cache and the
//! HTTP surface. Field names are the wire names.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

/// Minimum length of an order identifier
pub const ORDER_UID_MIN_LEN: usize = 16;
/// Maximum length of an order identifier
pub const ORDER_UID_MAX_LEN: usize = 32;

/// Check the identifier format: 16..=32 ASCII alphanumeric characters
pub fn is_valid_order_uid(uid: &str) -> bool {
    (ORDER_UID_MIN_LEN..=ORDER_UID_MAX_LEN).contains(&uid.len())
        && uid.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn validate_order_uid(uid: &str) -> Result<(), ValidationError> {
    if is_valid_order_uid(uid) {
        Ok(())
    } else {
        Err(ValidationError::new("order_uid_format").with_message(Cow::Borrowed(
            "order_uid must be 16-32 ASCII alphanumeric characters",
        )))
    }
}

/// Text that PostgreSQL `TEXT` can store: no NUL bytes
fn validate_text(value: &str) -> Result<(), ValidationError> {
    if value.contains('\0') {
        return Err(ValidationError::new("nul_byte")
            .with_message(Cow::Borrowed("text must not contain NUL bytes")));
    }
    Ok(())
}

/// Recipient of an order (1:1, owned by the order)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Delivery {
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub name: String,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub phone: String,
    #[serde(default)]
    #[validate(custom(function = "validate_text"))]
    pub zip: String,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub city: String,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub address: String,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub region: String,
    #[validate(email, custom(function = "validate_text"))]
    pub email: String,
}

/// Payment of an order (1:1, owned by the order)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Payment {
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub transaction: String,
    #[serde(default)]
    #[validate(custom(function = "validate_text"))]
    pub request_id: Option<String>,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub currency: String,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub provider: String,
    #[validate(range(min = 0))]
    pub amount: i64,
    /// Unix seconds
    #[validate(range(min = 0))]
    pub payment_dt: i64,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub bank: String,
    #[validate(range(min = 0))]
    pub delivery_cost: i64,
    #[validate(range(min = 0))]
    pub goods_total: i64,
    #[validate(range(min = 0))]
    pub custom_fee: i64,
}

/// Order line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Item {
    #[validate(range(min = 0))]
    pub chrt_id: i64,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub track_number: String,
    #[validate(range(min = 0))]
    pub price: i64,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub rid: String,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub name: String,
    /// Sale percentage
    #[validate(range(min = 0))]
    pub sale: i32,
    #[serde(default)]
    #[validate(custom(function = "validate_text"))]
    pub size: String,
    #[validate(range(min = 0))]
    pub total_price: i64,
    #[validate(range(min = 0))]
    pub nm_id: i64,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub brand: String,
    #[validate(range(min = 0))]
    pub status: i32,
}

/// Order aggregate root, keyed by `order_uid`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Order {
    #[validate(custom(function = "validate_order_uid"))]
    pub order_uid: String,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub track_number: String,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub entry: String,
    #[validate(nested)]
    pub delivery: Delivery,
    #[validate(nested)]
    pub payment: Payment,
    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<Item>,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub locale: String,
    #[serde(default)]
    #[validate(custom(function = "validate_text"))]
    pub internal_signature: String,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub customer_id: String,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub delivery_service: String,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub shardkey: String,
    #[validate(range(min = 0))]
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    #[validate(length(min = 1), custom(function = "validate_text"))]
    pub oof_shard: String,
}

impl Order {
    /// Decode a feed payload
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Encode for the feed and the cache
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Run every structural check, collecting all violations
    pub fn check(&self) -> Result<(), ValidationErrors> {
        self.validate()
    }
}
