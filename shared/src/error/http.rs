//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // 404 Not Found
            Self::OrderNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::OrderDuplicate => StatusCode::CONFLICT,

            // 500 Internal Server Error
            Self::InternalError
            | Self::DatabaseError
            | Self::ConfigError
            | Self::CacheError
            | Self::FeedError => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request
            Self::ValidationFailed | Self::OrderMalformed | Self::OrderUidInvalid => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}
