//! HTTP read API

pub mod health;
pub mod order;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::OrderPipeline;

/// Build the router with middleware
pub fn create_router(pipeline: OrderPipeline) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/order/", get(order::missing_uid))
        .route("/order/{order_uid}", get(order::get_order))
        .with_state(pipeline)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
