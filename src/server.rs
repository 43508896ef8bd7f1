use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::AppState;

/// Builds the exporter and load-control routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Metrics ─────────────────────────────────────────────
        .route("/metrics", get(handlers::metrics::exposition))
        .route("/api/metrics", get(handlers::metrics::summary))
        // ── Load generator control ──────────────────────────────
        .route(
            "/api/benchmark/start",
            post(handlers::benchmark::start_benchmark),
        )
        .route(
            "/api/benchmark/stop",
            post(handlers::benchmark::stop_benchmark),
        )
        .route(
            "/api/benchmark/status",
            get(handlers::benchmark::benchmark_status),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
}
