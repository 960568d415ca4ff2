//! Whiskey - Entry Point
//!
//! Loads the proxy pool, starts the health prober and the API server, and
//! shuts both down on Ctrl+C or SIGTERM.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use whiskey::api::{ApiServer, AppState};
use whiskey::config::{Config, LogConfig};
use whiskey::proxy::{
    loader, Forwarder, HealthProber, HealthProberConfig, PoolSelector, ProxyStore, ProxyTransport,
    ReqwestTransport, RetryConfig, RetryOrchestrator,
};

#[tokio::main]
async fn main() -> whiskey::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log);

    info!("Starting Whiskey");

    // Proxy pool; an unreadable list degrades to an empty pool
    let records = loader::load_or_empty(&config.pool.list_path).await;
    let store = Arc::new(ProxyStore::new(records));
    info!(
        proxies = store.len(),
        path = %config.pool.list_path,
        policy = %config.pool.selection_policy,
        "Proxy pool loaded"
    );

    let transport: Arc<dyn ProxyTransport> =
        Arc::new(ReqwestTransport::new(config.forward.max_redirects));

    let forwarder = Arc::new(Forwarder::new(
        transport.clone(),
        store.clone(),
        config.forward.request_timeout(),
    ));
    let selector = Arc::new(PoolSelector::new(store.clone()));
    let orchestrator = Arc::new(RetryOrchestrator::new(
        selector,
        forwarder,
        RetryConfig::from(&config.forward),
    ));

    // Start health prober
    let prober = Arc::new(HealthProber::new(
        store.clone(),
        transport,
        HealthProberConfig::from_config(&config.health)?,
    ));
    let prober_handle = prober.start();

    // Start API server
    let api_server = ApiServer::new(AppState::new(config.clone(), orchestrator)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut api_task = tokio::spawn(async move { api_server.run(shutdown_rx).await });

    info!("API server started on {}", config.api_addr());

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        result = &mut api_task => {
            match result {
                Ok(Ok(())) => info!("API server exited"),
                Ok(Err(e)) => error!("API server error: {}", e),
                Err(e) => error!("API server task failed: {}", e),
            }
        }
    }

    let _ = shutdown_tx.send(true);
    prober_handle.stop(config.health.shutdown_grace()).await;
    if !api_task.is_finished() {
        let _ = api_task.await;
    }

    info!("Whiskey stopped");
    Ok(())
}

/// Install the global subscriber; `RUST_LOG` overrides `LOG_LEVEL`
fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("whiskey={},tower_http=info", config.level))
    });
    let registry = tracing_subscriber::registry().with(filter);

    if config.format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
