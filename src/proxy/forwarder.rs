//! Single-attempt forwarding with outcome classification

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::error::{FailureKind, TransportError};
use crate::models::{ForwardRequest, HealthReport, ProxyRecord, UpstreamResponse};
use crate::proxy::store::ProxyStore;
use crate::proxy::transport::ProxyTransport;

/// A response that counts as a working transport (2xx, 3xx or 4xx)
#[derive(Debug, Clone)]
pub struct AttemptSuccess {
    pub response: UpstreamResponse,
    pub elapsed_ms: u64,
}

/// A classified failed attempt
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub kind: FailureKind,
    pub message: String,
    pub elapsed_ms: u64,
    /// The 5xx response, when the target did answer
    pub response: Option<UpstreamResponse>,
}

pub type AttemptResult = std::result::Result<AttemptSuccess, AttemptFailure>;

/// Executes one outbound request and reports its outcome to the store
pub struct Forwarder {
    transport: Arc<dyn ProxyTransport>,
    store: Arc<ProxyStore>,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(transport: Arc<dyn ProxyTransport>, store: Arc<ProxyStore>, timeout: Duration) -> Self {
        Self {
            transport,
            store,
            timeout,
        }
    }

    pub fn store(&self) -> &Arc<ProxyStore> {
        &self.store
    }

    /// Attempt the request with the default per-attempt timeout
    pub async fn attempt(&self, proxy: Option<&ProxyRecord>, request: &ForwardRequest) -> AttemptResult {
        self.attempt_with_timeout(proxy, request, self.timeout).await
    }

    /// Attempt the request through `proxy` (directly when `None`)
    ///
    /// The outcome is recorded with `mark_outcome` for the proxy used. Direct
    /// requests leave the store untouched.
    #[instrument(
        skip_all,
        fields(proxy = %proxy.map(|p| p.address()).unwrap_or_else(|| "direct".into()), method = %request.method)
    )]
    pub async fn attempt_with_timeout(
        &self,
        proxy: Option<&ProxyRecord>,
        request: &ForwardRequest,
        timeout: Duration,
    ) -> AttemptResult {
        let start = Instant::now();
        let sent = tokio::time::timeout(timeout, self.transport.send(proxy, request, timeout)).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let outcome = match sent {
            Err(_) => Err(transport_failure(TransportError::Timeout, elapsed_ms)),
            Ok(Err(e)) => Err(transport_failure(e, elapsed_ms)),
            Ok(Ok(response)) if !response.class().is_transport_success() => Err(AttemptFailure {
                kind: FailureKind::UpstreamServerError,
                message: format!("target responded with {}", response.status),
                elapsed_ms,
                response: Some(response),
            }),
            Ok(Ok(response)) => Ok(AttemptSuccess {
                response,
                elapsed_ms,
            }),
        };

        match &outcome {
            Ok(success) => debug!(
                status = success.response.status.as_u16(),
                elapsed_ms, "Attempt succeeded"
            ),
            Err(failure) => warn!(
                kind = %failure.kind,
                elapsed_ms,
                "Attempt failed: {}",
                failure.message
            ),
        }

        if let Some(proxy) = proxy {
            let report = HealthReport {
                healthy: outcome.is_ok(),
                response_time_ms: elapsed_ms,
                at: Utc::now(),
            };
            self.store.mark_outcome(&proxy.host, proxy.port, &report);
        }

        outcome
    }
}

fn transport_failure(error: TransportError, elapsed_ms: u64) -> AttemptFailure {
    AttemptFailure {
        kind: FailureKind::TransportFailure,
        message: error.to_string(),
        elapsed_ms,
        response: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HealthState, ProxyType};
    use crate::proxy::transport::mock::{Behavior, ScriptedTransport, DIRECT};
    use http::StatusCode;
    use url::Url;

    fn setup(transport: ScriptedTransport) -> (Forwarder, Arc<ScriptedTransport>, Arc<ProxyStore>) {
        let transport = Arc::new(transport);
        let store = Arc::new(ProxyStore::new(vec![
            ProxyRecord::new("a", 8080, ProxyType::Http),
            ProxyRecord::new("b", 1080, ProxyType::Socks5),
        ]));
        let forwarder = Forwarder::new(transport.clone(), store.clone(), Duration::from_secs(30));
        (forwarder, transport, store)
    }

    fn request() -> ForwardRequest {
        ForwardRequest::get(Url::parse("https://httpbin.org/ip").unwrap())
    }

    #[tokio::test]
    async fn test_client_error_is_success_and_marks_healthy() {
        let (forwarder, _, store) = setup(ScriptedTransport::new(Behavior::Status(404)));
        let proxy = store.find("a", 8080).unwrap();

        let success = forwarder.attempt(Some(&proxy), &request()).await.unwrap();
        assert_eq!(success.response.status, StatusCode::NOT_FOUND);

        let record = store.find("a", 8080).unwrap();
        assert_eq!(record.health, HealthState::Healthy);
        assert!(record.response_time_ms >= 1);
        assert!(record.last_checked.is_some());
    }

    #[tokio::test]
    async fn test_server_error_is_failure_and_marks_unhealthy() {
        let (forwarder, _, store) = setup(ScriptedTransport::new(Behavior::Status(503)));
        let proxy = store.find("b", 1080).unwrap();

        let failure = forwarder.attempt(Some(&proxy), &request()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::UpstreamServerError);
        assert_eq!(
            failure.response.map(|r| r.status),
            Some(StatusCode::SERVICE_UNAVAILABLE)
        );
        assert_eq!(store.find("b", 1080).unwrap().health, HealthState::Unhealthy);
    }

    #[tokio::test]
    async fn test_transport_error_is_classified() {
        let (forwarder, _, store) = setup(ScriptedTransport::new(Behavior::Fail(
            TransportError::Connect("connection refused".into()),
        )));
        let proxy = store.find("a", 8080).unwrap();

        let failure = forwarder.attempt(Some(&proxy), &request()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::TransportFailure);
        assert!(failure.message.contains("connection refused"));
        assert!(failure.response.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_transport_times_out() {
        let (forwarder, _, store) = setup(ScriptedTransport::new(Behavior::Hang));
        let proxy = store.find("a", 8080).unwrap();

        let failure = forwarder
            .attempt_with_timeout(Some(&proxy), &request(), Duration::from_secs(15))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::TransportFailure);
        assert_eq!(failure.message, TransportError::Timeout.to_string());
        assert!(failure.elapsed_ms >= 15_000);
        assert_eq!(store.find("a", 8080).unwrap().health, HealthState::Unhealthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_recorded() {
        let (forwarder, _, store) = setup(ScriptedTransport::new(Behavior::Delayed(
            Duration::from_millis(250),
            200,
        )));
        let proxy = store.find("b", 1080).unwrap();

        let success = forwarder.attempt(Some(&proxy), &request()).await.unwrap();
        assert!(success.elapsed_ms >= 250);
        assert_eq!(
            store.find("b", 1080).unwrap().response_time_ms,
            success.elapsed_ms
        );
    }

    #[tokio::test]
    async fn test_direct_request_does_not_touch_store() {
        let (forwarder, transport, store) = setup(ScriptedTransport::new(Behavior::Status(500)));

        let failure = forwarder.attempt(None, &request()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::UpstreamServerError);
        assert_eq!(transport.calls(), vec![DIRECT.to_string()]);

        let stats = store.stats();
        assert_eq!(stats.untested, 2);
    }
}
