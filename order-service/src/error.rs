//! Unified service-layer error type for order-service
//!
//! `OrderError` bridges the backend errors (`sqlx::Error`, `redis::RedisError`,
//! serde) and the API-layer error (`AppError`). It enables `?` propagation
//! across the store, cache, feed and pipeline without manual mapping.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Service-layer error
///
/// - `Malformed` / `Invalid` / `Rejected`: bad input, recoverable, never retried
/// - `NotFound`: the identifier has no committed order
/// - `Duplicate`: the identifier was already persisted (rejected insert)
/// - `Store` / `Cache` / `Feed`: infrastructure failures (auto-logged, mapped to 500)
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    /// Payload could not be decoded into an order
    #[error("malformed order payload: {0}")]
    Malformed(serde_json::Error),
    /// Order decoded but failed structural validation
    #[error("invalid order: {0}")]
    Invalid(validator::ValidationErrors),
    /// No order with this identifier
    #[error("order {0} not found")]
    NotFound(String),
    /// The store refused the order's data (constraint or data exception).
    /// Retrying the same payload fails the same way.
    #[error("order rejected by store: {0}")]
    Rejected(BoxError),
    /// An order with this identifier is already stored
    #[error("order {0} already exists")]
    Duplicate(String),
    /// Database or transaction failure
    #[error("store error: {0}")]
    Store(BoxError),
    /// Cache transport or (de)serialization failure
    #[error("cache error: {0}")]
    Cache(BoxError),
    /// Message feed failure
    #[error("feed error: {0}")]
    Feed(BoxError),
    /// Bad or missing configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl OrderError {
    pub fn store(e: impl Into<BoxError>) -> Self {
        OrderError::Store(e.into())
    }

    pub fn cache(e: impl Into<BoxError>) -> Self {
        OrderError::Cache(e.into())
    }

    pub fn feed(e: impl Into<BoxError>) -> Self {
        OrderError::Feed(e.into())
    }

    /// Input that can never succeed on retry
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            OrderError::Malformed(_) | OrderError::Invalid(_) | OrderError::Rejected(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OrderError::NotFound(_))
    }

    /// Stable error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            OrderError::Malformed(_) => ErrorCode::OrderMalformed,
            OrderError::Invalid(_) | OrderError::Rejected(_) => ErrorCode::ValidationFailed,
            OrderError::NotFound(_) => ErrorCode::OrderNotFound,
            OrderError::Duplicate(_) => ErrorCode::OrderDuplicate,
            OrderError::Store(_) => ErrorCode::DatabaseError,
            OrderError::Cache(_) => ErrorCode::CacheError,
            OrderError::Feed(_) => ErrorCode::FeedError,
            OrderError::Config(_) => ErrorCode::ConfigError,
        }
    }
}

impl From<sqlx::Error> for OrderError {
    fn from(e: sqlx::Error) -> Self {
        OrderError::Store(e.into())
    }
}

impl From<redis::RedisError> for OrderError {
    fn from(e: redis::RedisError) -> Self {
        OrderError::Cache(e.into())
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NotFound(order_uid) => AppError::order_not_found(&order_uid),
            OrderError::Duplicate(order_uid) => {
                AppError::new(ErrorCode::OrderDuplicate).with_detail("order_uid", order_uid)
            }
            OrderError::Malformed(err) => {
                AppError::with_message(ErrorCode::OrderMalformed, err.to_string())
            }
            OrderError::Invalid(errors) => AppError::validation(errors.to_string()),
            OrderError::Rejected(err) => AppError::validation(err.to_string()),
            other => {
                tracing::error!(error = %other, "Service infrastructure error");
                AppError::new(ErrorCode::InternalError)
            }
        }
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

/// Convenience type alias for service-layer results
pub type OrderResult<T> = Result<T, OrderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_malformed_classification() {
        let err = OrderError::Malformed(serde_json::from_str::<u8>("x").unwrap_err());
        assert!(err.is_malformed());
        assert!(!OrderError::NotFound("a".into()).is_malformed());
        assert!(OrderError::Rejected("value too long".into()).is_malformed());
        assert!(!OrderError::store("db down").is_malformed());
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let app: AppError = OrderError::NotFound("UNKNOWN0000000000001".into()).into();
        assert_eq!(app.code, ErrorCode::OrderNotFound);
        assert_eq!(app.http_status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_infrastructure_maps_to_500() {
        let app: AppError = OrderError::store("connection refused").into();
        assert_eq!(app.code, ErrorCode::InternalError);
        assert_eq!(app.http_status(), StatusCode::INTERNAL_SERVER_ERROR);

        let app: AppError = OrderError::cache("timeout").into();
        assert_eq!(app.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_codes() {
        assert_eq!(
            OrderError::Duplicate("x".into()).code(),
            ErrorCode::OrderDuplicate
        );
        assert_eq!(OrderError::feed("x").code(), ErrorCode::FeedError);
    }
}
