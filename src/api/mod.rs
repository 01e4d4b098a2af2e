//! HTTP API for health, readiness, status, and Prometheus scraping.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::{create_router, health_router};
