//! API module for the DeviceCheck gateway

pub mod error;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::middleware::{require_device, AxumGate};
use handlers::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Create the API router
///
/// Every `/v1` route sits behind `gate`; `/health` does not.
pub fn create_router(state: Arc<AppState>, gate: Arc<AxumGate>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let gated = Router::new()
        .route("/v1/validate", post(handlers::validate_device))
        .route("/v1/bits/query", post(handlers::query_bits))
        .route("/v1/bits/update", post(handlers::update_bits))
        .route_layer(middleware::from_fn_with_state(gate, require_device));

    Router::new()
        .route("/health", get(health))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
