//! Retry loop around the forwarder
//!
//! Each inbound request moves through `Selecting -> Attempting` until an
//! attempt succeeds or the attempt budget (or caller deadline) runs out.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::{ForwardConfig, MAX_REQUEST_DEADLINE};
use crate::error::FailureKind;
use crate::models::{
    ForwardFailure, ForwardRequest, ForwardResult, ForwardSuccess, ProxyFilter, ProxyView,
};
use crate::proxy::forwarder::{AttemptFailure, Forwarder};
use crate::proxy::rotation::{PoolSelector, SelectionPolicy};

/// Per-request forwarding options chosen by the caller
#[derive(Debug, Clone)]
pub struct ForwardOptions {
    pub policy: SelectionPolicy,
    pub filter: ProxyFilter,
    pub use_proxy: bool,
    /// Overrides the configured overall deadline
    pub deadline: Option<Duration>,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::default(),
            filter: ProxyFilter::default(),
            use_proxy: true,
            deadline: None,
        }
    }
}

/// Retry limits for the orchestrator
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub deadline: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&ForwardConfig::default())
    }
}

impl From<&ForwardConfig> for RetryConfig {
    fn from(config: &ForwardConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
            deadline: config.request_deadline(),
        }
    }
}

/// Drives selection and forwarding attempts for one request at a time
///
/// Shared across request tasks; it holds no per-request state.
pub struct RetryOrchestrator {
    selector: Arc<PoolSelector>,
    forwarder: Arc<Forwarder>,
    config: RetryConfig,
}

impl RetryOrchestrator {
    pub fn new(selector: Arc<PoolSelector>, forwarder: Arc<Forwarder>, config: RetryConfig) -> Self {
        Self {
            selector,
            forwarder,
            config,
        }
    }

    pub fn selector(&self) -> &Arc<PoolSelector> {
        &self.selector
    }

    pub fn forwarder(&self) -> &Arc<Forwarder> {
        &self.forwarder
    }

    /// Forward `request`, retrying through other proxies on failure
    #[instrument(
        skip_all,
        fields(url = %request.url, method = %request.method, policy = options.policy.as_str(), use_proxy = options.use_proxy)
    )]
    pub async fn forward(&self, request: ForwardRequest, options: ForwardOptions) -> ForwardResult {
        let started = Instant::now();
        let budget = options
            .deadline
            .unwrap_or(self.config.deadline)
            .min(MAX_REQUEST_DEADLINE);
        let deadline = started + budget;
        let max_attempts = if options.use_proxy {
            self.config.max_attempts
        } else {
            1
        };

        let mut attempts: u32 = 0;
        let mut last_failure: Option<AttemptFailure> = None;

        loop {
            // Selecting
            let proxy = if options.use_proxy {
                match self.selector.select(&options.policy, &options.filter) {
                    Some(proxy) => Some(proxy),
                    None => {
                        return Err(match last_failure {
                            Some(failure) => self.exhausted(failure, attempts, started),
                            None => self.failure(
                                FailureKind::NoProxyAvailable,
                                "no proxy available for the requested policy and filters".into(),
                                attempts,
                                started,
                            ),
                        });
                    }
                }
            } else {
                None
            };

            // Attempting
            attempts += 1;
            let attempt = tokio::time::timeout_at(
                deadline,
                self.forwarder.attempt(proxy.as_ref(), &request),
            )
            .await;

            let failure = match attempt {
                Err(_) => return Err(self.deadline_exceeded(budget, last_failure, attempts, started)),
                Ok(Ok(success)) => {
                    let proxy_used = proxy.map(|p| {
                        let current = self.selector.store().find(&p.host, p.port).unwrap_or(p);
                        ProxyView::from(&current)
                    });
                    info!(
                        attempts,
                        status = success.response.status.as_u16(),
                        proxy = ?proxy_used.as_ref().map(|p| format!("{}:{}", p.host, p.port)),
                        "Request forwarded"
                    );
                    return Ok(ForwardSuccess {
                        response: success.response,
                        proxy_used,
                        attempts,
                        elapsed_ms: elapsed_ms(started),
                    });
                }
                Ok(Err(failure)) => failure,
            };

            if attempts >= max_attempts {
                return Err(self.exhausted(failure, attempts, started));
            }

            warn!(
                attempt = attempts,
                max_attempts,
                kind = %failure.kind,
                "Attempt failed, retrying: {}",
                failure.message
            );
            last_failure = Some(failure);

            if tokio::time::timeout_at(deadline, tokio::time::sleep(self.config.backoff))
                .await
                .is_err()
                || Instant::now() >= deadline
            {
                return Err(self.deadline_exceeded(budget, last_failure, attempts, started));
            }
        }
    }

    fn exhausted(&self, failure: AttemptFailure, attempts: u32, started: Instant) -> ForwardFailure {
        warn!(attempts, kind = %failure.kind, "Retries exhausted: {}", failure.message);
        self.failure(failure.kind, failure.message, attempts, started)
    }

    fn deadline_exceeded(
        &self,
        budget: Duration,
        last: Option<AttemptFailure>,
        attempts: u32,
        started: Instant,
    ) -> ForwardFailure {
        let mut message = format!("request deadline of {:?} exceeded", budget);
        if let Some(last) = last {
            message.push_str(&format!("; last failure: {}", last.message));
        }
        warn!(attempts, "{}", message);
        self.failure(FailureKind::DeadlineExceeded, message, attempts, started)
    }

    fn failure(
        &self,
        kind: FailureKind,
        message: String,
        attempts: u32,
        started: Instant,
    ) -> ForwardFailure {
        ForwardFailure {
            kind,
            message,
            attempts,
            elapsed_ms: elapsed_ms(started),
            pool: self.selector.store().stats(),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
