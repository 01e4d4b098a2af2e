//! HTTP API route definitions.

use axum::{routing::get, Router};

use super::handlers::{health, metrics, ready, status, AppState};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Status endpoint
        .route("/api/v1/status", get(status))
        // Prometheus scrape endpoint
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Create a minimal health-only router (for startup).
pub fn health_router() -> Router {
    Router::new().route("/health", get(health))
}
