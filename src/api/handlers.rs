//! HTTP API handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;

use crate::session::SessionStats;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the engine is armed and watching the feed.
    pub ready: Arc<std::sync::atomic::AtomicBool>,
    /// Current market slug.
    pub market_slug: Arc<tokio::sync::RwLock<Option<String>>>,
    /// Live session stats, written by the session controller.
    pub stats: Arc<tokio::sync::RwLock<SessionStats>>,
    /// Prometheus scrape handle, when the recorder installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new() -> Self {
        Self {
            ready: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            market_slug: Arc::new(tokio::sync::RwLock::new(None)),
            stats: Arc::new(tokio::sync::RwLock::new(SessionStats::default())),
            metrics: None,
        }
    }

    /// Attach the Prometheus scrape handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Replace the stats handle with the controller's shared one.
    pub fn with_stats(mut self, stats: Arc<tokio::sync::RwLock<SessionStats>>) -> Self {
        self.stats = stats;
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready
            .store(ready, std::sync::atomic::Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the engine is armed.
    pub ready: bool,
    /// Current market slug if available.
    pub market: Option<String>,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Current market slug.
    pub market: Option<String>,
    /// Session statistics.
    pub stats: SessionStats,
    /// Return on invested dollars, as a percentage string.
    pub return_pct: String,
}

/// Health check handler. Always 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness handler. 200 once armed, 503 before.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let market = state.market_slug.read().await.clone();

    let response = ReadyResponse {
        ready: is_ready,
        market,
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler. Engine state and session statistics.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let market = state.market_slug.read().await.clone();
    let stats = state.stats.read().await.clone();

    let status = if state.is_ready() { "running" } else { "starting" };

    Json(StatusResponse {
        status,
        market,
        return_pct: stats.return_pct().to_string(),
        stats,
    })
}

/// Prometheus scrape handler.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed\n".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_state_ready_toggle() {
        let state = AppState::new();
        assert!(!state.is_ready());

        state.set_ready(true);
        assert!(state.is_ready());

        state.set_ready(false);
        assert!(!state.is_ready());
    }
}
