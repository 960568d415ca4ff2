//! On-demand proxy test endpoints

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::forward::{forward_options, parse_target};
use super::{body_json, headers_json, parse_flag, parse_number};
use crate::api::server::AppState;
use crate::error::{Result, WhiskeyError};
use crate::models::{ForwardRequest, ProxyView};

const DEFAULT_TEST_COUNT: usize = 3;
const MAX_TEST_COUNT: usize = 10;

/// Query parameters of `/api/test-proxy`
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestProxyQuery {
    pub proxy_index: Option<String>,
}

/// Test one proxy, by load position, against the probe URL
///
/// The outcome is recorded like any other attempt. A failing proxy is still a
/// 200 response with `success: false`.
pub async fn test_proxy(
    State(state): State<AppState>,
    Query(query): Query<TestProxyQuery>,
) -> Result<impl IntoResponse> {
    let index = parse_number("proxyIndex", query.proxy_index.as_deref())?.unwrap_or(0);
    let proxy = state
        .store
        .get(index)
        .ok_or_else(|| WhiskeyError::InvalidRequest("Invalid proxy index".to_string()))?;
    let address = proxy.address();

    info!(proxy = %address, "Testing proxy");

    let request = ForwardRequest::get(state.probe_url.clone());
    let outcome = state
        .orchestrator
        .forwarder()
        .attempt_with_timeout(Some(&proxy), &request, state.config.forward.test_timeout())
        .await;

    let view = state
        .store
        .find(&proxy.host, proxy.port)
        .map(|current| ProxyView::from(&current))
        .unwrap_or_else(|| ProxyView::from(&proxy));

    let body = match outcome {
        Ok(success) => json!({
            "success": true,
            "proxy": view,
            "testResult": {
                "status": success.response.status.as_u16(),
                "responseTime": success.elapsed_ms,
                "data": body_json(&success.response.body),
                "headers": headers_json(&success.response.headers),
            },
            "message": format!("Proxy {} is working", address),
        }),
        Err(failure) => json!({
            "success": false,
            "proxy": view,
            "kind": failure.kind,
            "error": failure.message,
            "responseTime": failure.elapsed_ms,
            "message": format!("Proxy {} failed: {}", address, failure.message),
        }),
    };

    Ok(Json(body))
}

/// Query parameters of `/api/proxy-test`
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyTestQuery {
    pub test_url: Option<String>,
    pub count: Option<String>,
    pub use_proxy: Option<String>,
    pub policy: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TestRun {
    test: usize,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    response_time: u64,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy: Option<ProxyView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct TestSummary {
    total: usize,
    successful: usize,
    failed: usize,
    success_rate: u64,
    avg_response_time: u64,
}

impl TestSummary {
    fn from_runs(runs: &[TestRun]) -> Self {
        let total = runs.len();
        let successful: Vec<&TestRun> = runs.iter().filter(|r| r.success).collect();
        let success_time: u64 = successful.iter().map(|r| r.response_time).sum();

        let success_rate = if total == 0 {
            0
        } else {
            (successful.len() as f64 / total as f64 * 100.0).round() as u64
        };
        let avg_response_time = if successful.is_empty() {
            0
        } else {
            (success_time as f64 / successful.len() as f64).round() as u64
        };

        Self {
            total,
            successful: successful.len(),
            failed: total - successful.len(),
            success_rate,
            avg_response_time,
        }
    }
}

/// Parse `count` leniently: missing, zero or garbage means the default
fn test_count(raw: Option<&str>) -> usize {
    raw.and_then(|c| c.trim().parse::<usize>().ok())
        .filter(|c| *c > 0)
        .unwrap_or(DEFAULT_TEST_COUNT)
        .min(MAX_TEST_COUNT)
}

/// Run several sequential forwards to a test URL and summarize them
///
/// A run succeeds when the target answers with a status below 400.
pub async fn proxy_test(
    State(state): State<AppState>,
    Query(query): Query<ProxyTestQuery>,
) -> Result<impl IntoResponse> {
    let test_url = match query.test_url.as_deref() {
        Some(raw) => parse_target(Some(raw))?,
        None => state.probe_url.clone(),
    };
    let count = test_count(query.count.as_deref());
    let options = forward_options(
        &state,
        query.policy.as_deref(),
        None,
        None,
        None,
        parse_flag("useProxy", query.use_proxy.as_deref())?,
    )?;

    let mut runs = Vec::with_capacity(count);
    for test in 1..=count {
        let request = ForwardRequest::get(test_url.clone());
        let run = match state.orchestrator.forward(request, options.clone()).await {
            Ok(success) => {
                let status = success.response.status;
                let ok = !status.is_client_error();
                TestRun {
                    test,
                    success: ok,
                    status: Some(status.as_u16()),
                    response_time: success.elapsed_ms,
                    attempts: success.attempts,
                    proxy: success.proxy_used,
                    data: Some(body_json(&success.response.body)),
                    error: (!ok).then(|| format!("target responded with {}", status)),
                }
            }
            Err(failure) => TestRun {
                test,
                success: false,
                status: None,
                response_time: failure.elapsed_ms,
                attempts: failure.attempts,
                proxy: None,
                data: None,
                error: Some(failure.to_string()),
            },
        };
        runs.push(run);
    }

    let summary = TestSummary::from_runs(&runs);
    info!(
        total = summary.total,
        successful = summary.successful,
        url = %test_url,
        "Proxy test finished"
    );

    Ok(Json(json!({
        "summary": summary,
        "results": runs,
        "testUrl": test_url.as_str(),
        "timestamp": Utc::now(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::test_support::{app, get};
    use crate::error::TransportError;
    use crate::models::{HealthState, ProxyRecord, ProxyType};
    use crate::proxy::transport::mock::{Behavior, ScriptedTransport, DIRECT};
    use axum::http::StatusCode;

    fn pool() -> Vec<ProxyRecord> {
        vec![
            ProxyRecord::new("10.0.0.1", 8080, ProxyType::Http),
            ProxyRecord::new("10.0.0.2", 1080, ProxyType::Socks5),
        ]
    }

    #[test]
    fn test_count_parsing() {
        assert_eq!(test_count(None), 3);
        assert_eq!(test_count(Some("5")), 5);
        assert_eq!(test_count(Some("50")), 10);
        assert_eq!(test_count(Some("0")), 3);
        assert_eq!(test_count(Some("many")), 3);
    }

    #[test]
    fn test_summary_math() {
        let run = |success: bool, response_time: u64| TestRun {
            test: 1,
            success,
            status: None,
            response_time,
            attempts: 1,
            proxy: None,
            data: None,
            error: None,
        };

        let summary = TestSummary::from_runs(&[run(true, 100), run(true, 201), run(false, 900)]);
        assert_eq!(
            summary,
            TestSummary {
                total: 3,
                successful: 2,
                failed: 1,
                success_rate: 67,
                avg_response_time: 151,
            }
        );
        assert_eq!(TestSummary::from_runs(&[]), TestSummary::default());
    }

    #[tokio::test]
    async fn test_test_proxy_success_marks_healthy() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(200)));

        let (status, body) = get(&app.router, "/api/test-proxy?proxyIndex=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["proxy"]["host"], "10.0.0.2");
        assert_eq!(body["proxy"]["status"], "healthy");
        assert_eq!(body["testResult"]["status"], 200);
        assert_eq!(body["testResult"]["data"]["origin"], "203.0.113.7");
        assert_eq!(app.transport.calls(), vec!["10.0.0.2".to_string()]);
    }

    #[tokio::test]
    async fn test_test_proxy_failure_is_reported() {
        let app = app(
            pool(),
            ScriptedTransport::new(Behavior::Fail(TransportError::Connect("refused".into()))),
        );

        let (status, body) = get(&app.router, "/api/test-proxy").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "transport_failure");
        assert_eq!(
            app.store.find("10.0.0.1", 8080).unwrap().health,
            HealthState::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_test_proxy_index_out_of_range() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(200)));

        let (status, body) = get(&app.router, "/api/test-proxy?proxyIndex=2").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Invalid proxy index"));
        assert_eq!(app.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_test_proxy_negative_index_is_json_bad_request() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(200)));

        let (status, body) = get(&app.router, "/api/test-proxy?proxyIndex=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("proxyIndex"));
        assert_eq!(app.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_proxy_test_summary() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(200)));

        let (status, body) = get(&app.router, "/api/proxy-test?count=4&policy=next").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["total"], 4);
        assert_eq!(body["summary"]["successful"], 4);
        assert_eq!(body["summary"]["successRate"], 100);
        assert_eq!(body["results"].as_array().unwrap().len(), 4);
        assert_eq!(body["results"][1]["proxy"]["host"], "10.0.0.2");
        assert_eq!(body["testUrl"], "https://httpbin.org/ip");
    }

    #[tokio::test]
    async fn test_proxy_test_counts_client_errors_as_failed() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(403)));

        let (_, body) = get(
            &app.router,
            "/api/proxy-test?testUrl=https://example.com/private&count=2",
        )
        .await;
        assert_eq!(body["summary"]["failed"], 2);
        assert_eq!(body["summary"]["successRate"], 0);
        assert_eq!(body["results"][0]["status"], 403);
    }

    #[tokio::test]
    async fn test_proxy_test_direct() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(200)));

        let (_, body) = get(&app.router, "/api/proxy-test?useProxy=0&count=2").await;
        assert_eq!(body["summary"]["successful"], 2);
        assert_eq!(
            app.transport.calls(),
            vec![DIRECT.to_string(), DIRECT.to_string()]
        );
    }

    #[tokio::test]
    async fn test_proxy_test_rejects_bad_url() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(200)));

        let (status, _) = get(&app.router, "/api/proxy-test?testUrl=file:///etc/passwd").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
