//! Health probing for upstream proxies
//!
//! Periodically sends a probe request through a bounded batch of proxies and
//! records each outcome in the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::HealthConfig;
use crate::error::{Result, WhiskeyError};
use crate::models::{ForwardRequest, HealthReport, ProxyRecord};
use crate::proxy::store::ProxyStore;
use crate::proxy::transport::ProxyTransport;

/// Health prober configuration
#[derive(Debug, Clone)]
pub struct HealthProberConfig {
    /// Endpoint requested through each proxy
    pub check_url: Url,
    /// Interval between probe rounds
    pub check_interval: Duration,
    /// Timeout for each probe
    pub check_timeout: Duration,
    /// Records probed per round, taken from the front of the pool
    pub batch_size: usize,
    /// Run the first round immediately instead of after one interval
    pub check_on_start: bool,
}

impl HealthProberConfig {
    pub fn from_config(config: &HealthConfig) -> Result<Self> {
        let check_url = Url::parse(&config.check_url).map_err(|e| {
            WhiskeyError::InvalidConfig(format!("HEALTH_CHECK_URL is not a valid URL: {}", e))
        })?;

        Ok(Self {
            check_url,
            check_interval: config.check_interval().max(Duration::from_secs(1)),
            check_timeout: config.check_timeout(),
            batch_size: config.batch_size.max(1),
            check_on_start: config.check_on_start,
        })
    }
}

/// Outcome counts of one probe round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub probed: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}

/// Periodic prober sharing the store with live traffic
pub struct HealthProber {
    store: Arc<ProxyStore>,
    transport: Arc<dyn ProxyTransport>,
    config: HealthProberConfig,
}

impl HealthProber {
    pub fn new(
        store: Arc<ProxyStore>,
        transport: Arc<dyn ProxyTransport>,
        config: HealthProberConfig,
    ) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    /// Spawn the periodic task; the returned handle owns its lifetime
    pub fn start(self: Arc<Self>) -> HealthProberHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(shutdown_rx).await });
        HealthProberHandle { shutdown_tx, task }
    }

    /// Run probe rounds until shutdown is signalled
    #[instrument(skip_all)]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.check_interval.as_secs(),
            batch = self.config.batch_size,
            url = %self.config.check_url,
            "Starting health prober"
        );

        let mut ticker = interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.config.check_on_start {
            // The first tick of an interval completes immediately.
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_round().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Health prober shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Probe the first `batch_size` records concurrently
    ///
    /// Completes once every probe has settled; each is bounded by the probe
    /// timeout, so one hanging proxy cannot stall the round.
    pub async fn probe_round(&self) -> ProbeSummary {
        let batch: Vec<ProxyRecord> = self
            .store
            .read(|records| records.iter().take(self.config.batch_size).cloned().collect());

        if batch.is_empty() {
            debug!("No proxies to probe");
            return ProbeSummary::default();
        }

        let concurrency = batch.len();
        let results = futures::stream::iter(batch)
            .map(|proxy| async move { self.probe(&proxy).await.healthy })
            .buffer_unordered(concurrency)
            .collect::<Vec<bool>>()
            .await;

        let healthy = results.iter().filter(|&&ok| ok).count();
        let summary = ProbeSummary {
            probed: results.len(),
            healthy,
            unhealthy: results.len() - healthy,
        };

        info!(
            probed = summary.probed,
            healthy = summary.healthy,
            unhealthy = summary.unhealthy,
            "Health probe round complete"
        );
        summary
    }

    /// Probe one proxy and record the result
    ///
    /// Only 2xx and 3xx answers count as healthy.
    #[instrument(skip(self, proxy), fields(proxy = %proxy.address()))]
    pub async fn probe(&self, proxy: &ProxyRecord) -> HealthReport {
        let request = ForwardRequest::get(self.config.check_url.clone());
        let check_timeout = self.config.check_timeout;

        let start = Instant::now();
        let outcome = timeout(
            check_timeout,
            self.transport.send(Some(proxy), &request, check_timeout),
        )
        .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let healthy = match outcome {
            Ok(Ok(response)) if response.status.is_success() || response.status.is_redirection() => {
                debug!(status = response.status.as_u16(), elapsed_ms, "Probe succeeded");
                true
            }
            Ok(Ok(response)) => {
                debug!(status = response.status.as_u16(), "Probe returned unexpected status");
                false
            }
            Ok(Err(e)) => {
                debug!("Probe failed: {}", e);
                false
            }
            Err(_) => {
                debug!(timeout_secs = check_timeout.as_secs(), "Probe timed out");
                false
            }
        };

        let report = HealthReport {
            healthy,
            response_time_ms: elapsed_ms,
            at: Utc::now(),
        };
        if !self.store.mark_outcome(&proxy.host, proxy.port, &report) {
            warn!("Probed proxy is no longer in the pool");
        }
        report
    }
}

/// Owner of a running prober task
pub struct HealthProberHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HealthProberHandle {
    /// Signal shutdown without waiting
    fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signal shutdown, wait up to `grace` for an in-flight round, then abort
    pub async fn stop(self, grace: Duration) {
        self.shutdown();

        let mut task = self.task;
        match timeout(grace, &mut task).await {
            Ok(Ok(())) => debug!("Health prober stopped"),
            Ok(Err(e)) => warn!("Health prober task failed: {}", e),
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs(),
                    "Health prober did not stop within grace period, abandoning in-flight probes"
                );
                task.abort();
            }
        }
    }
}
