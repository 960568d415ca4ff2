//! API server using Axum
//!
//! Exposes the forwarding endpoint plus pool statistics and proxy tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use url::Url;

use crate::config::Config;
use crate::error::{Result, WhiskeyError};
use crate::proxy::{ProxyStore, RetryOrchestrator, SelectionPolicy};

use super::middleware::cors_layer;
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<ProxyStore>,
    pub orchestrator: Arc<RetryOrchestrator>,
    /// Policy used when a request names none
    pub default_policy: SelectionPolicy,
    /// Target of on-demand proxy tests
    pub probe_url: Url,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<RetryOrchestrator>) -> Result<Self> {
        let probe_url = Url::parse(&config.health.check_url).map_err(|e| {
            WhiskeyError::InvalidConfig(format!("HEALTH_CHECK_URL is not a valid URL: {}", e))
        })?;

        Ok(Self {
            default_policy: SelectionPolicy::from_str(&config.pool.selection_policy),
            store: orchestrator.selector().store().clone(),
            orchestrator,
            probe_url,
            config,
            started_at: Instant::now(),
        })
    }
}

/// API server
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with CORS and tracing layers applied
    pub fn build_router(&self) -> Router {
        let cors = cors_layer(&self.state.config.api.cors_origins);

        routes::create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until `shutdown` flips to true
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = self.state.config.api_addr().parse().map_err(|e| {
            WhiskeyError::InvalidConfig(format!(
                "Invalid API server address {}: {}",
                self.state.config.api_addr(),
                e
            ))
        })?;

        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| WhiskeyError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
