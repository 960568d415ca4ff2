//! Health check endpoint

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::api::server::AppState;

/// Liveness check with a short pool summary
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.store.stats();
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "whiskey",
            "version": env!("CARGO_PKG_VERSION"),
            "uptimeSecs": state.started_at.elapsed().as_secs(),
            "proxies": stats.total,
        })),
    )
}
