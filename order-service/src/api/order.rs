//! Order lookup handlers

use axum::Json;
use axum::extract::{Path, State};
use shared::error::{AppError, AppResult, ErrorCode};
use shared::{Order, is_valid_order_uid};

use crate::pipeline::OrderPipeline;

/// GET /order/{order_uid}
pub async fn get_order(
    State(pipeline): State<OrderPipeline>,
    Path(order_uid): Path<String>,
) -> AppResult<Json<Order>> {
    if !is_valid_order_uid(&order_uid) {
        return Err(AppError::new(ErrorCode::OrderUidInvalid).with_detail("order_uid", order_uid));
    }
    tracing::debug!(order_uid = %order_uid, "Order lookup");
    let order = pipeline.get_order(&order_uid).await?;
    Ok(Json(order))
}

/// GET /order/ (no identifier)
pub async fn missing_uid() -> AppError {
    AppError::with_message(ErrorCode::OrderUidInvalid, "order_uid is required")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::api::create_router;
    use crate::cache::MemoryOrderCache;
    use crate::db::{MemoryOrderStore, OrderStore};
    use crate::generator::sample_order;
    use crate::pipeline::OrderPipeline;
    use shared::Order;

    fn setup() -> (axum::Router, Arc<MemoryOrderStore>) {
        let store = Arc::new(MemoryOrderStore::new());
        let cache = Arc::new(MemoryOrderCache::new());
        (create_router(OrderPipeline::new(store.clone(), cache)), store)
    }

    async fn get(router: axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_get_existing_order() {
        let (router, store) = setup();
        let order = sample_order("ORDER00000000000001");
        store.save_order(&order).await.unwrap();

        let (status, body) = get(router, "/order/ORDER00000000000001").await;
        assert_eq!(status, StatusCode::OK);
        let returned: Order = serde_json::from_slice(&body).unwrap();
        assert_eq!(returned, order);
    }

    #[tokio::test]
    async fn test_unknown_order_is_404() {
        let (router, _) = setup();
        let (status, body) = get(router, "/order/UNKNOWN0000000000001").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], 4001);
    }

    #[tokio::test]
    async fn test_malformed_uid_is_400() {
        let (router, store) = setup();
        let (status, _) = get(router.clone(), "/order/short").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get(router, "/order/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.read_count(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_500() {
        let (router, store) = setup();
        store.set_unavailable(true);
        let (status, _) = get(router, "/order/ORDER00000000000001").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = setup();
        let (status, body) = get(router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }
}
