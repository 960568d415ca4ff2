//! API route definitions

use axum::middleware;
use axum::routing::{any, get};
use axum::Router;

use super::handlers;
use super::middleware::RequestLogging;
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api_routes())
        .layer(middleware::from_fn(RequestLogging::log_request))
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Forwarding
        .route("/proxy", any(handlers::forward::forward))
        // Pool views
        .route("/proxy-stats", get(handlers::stats::proxy_stats))
        .route("/proxy-info", get(handlers::info::proxy_info))
        // On-demand tests
        .route("/test-proxy", get(handlers::testing::test_proxy))
        .route("/proxy-test", get(handlers::testing::proxy_test))
}
