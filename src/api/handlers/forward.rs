//! Forwarding endpoint

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::{body_json, headers_json, parse_flag};
use crate::api::server::AppState;
use crate::error::{Result, WhiskeyError};
use crate::models::{ForwardFailure, ForwardRequest, ForwardSuccess, ProxyFilter, ProxyType};
use crate::proxy::{ForwardOptions, SelectionPolicy};

/// Headers that describe the inbound connection rather than the request.
/// Content encoding is negotiated by the outbound client, which decodes it.
const SKIPPED_HEADERS: [HeaderName; 11] = [
    header::HOST,
    header::ACCEPT_ENCODING,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::ORIGIN,
];

/// Query parameters of `/api/proxy`
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ForwardQuery {
    pub url: Option<String>,
    pub policy: Option<String>,
    #[serde(rename = "type")]
    pub proxy_type: Option<String>,
    pub country: Option<String>,
    /// Explicit `host:port` from the pool
    pub proxy: Option<String>,
    pub use_proxy: Option<String>,
}

/// Forward the inbound request to `url` through the pool
pub async fn forward(
    State(state): State<AppState>,
    Query(query): Query<ForwardQuery>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let url = parse_target(query.url.as_deref())?;
    let options = forward_options(
        &state,
        query.policy.as_deref(),
        query.proxy_type.as_deref(),
        query.country.as_deref(),
        query.proxy.as_deref(),
        parse_flag("useProxy", query.use_proxy.as_deref())?,
    )?;

    let request = ForwardRequest::new(method.clone(), url.clone())
        .with_headers(outbound_headers(&headers))
        .with_body(body);

    Ok(match state.orchestrator.forward(request, options).await {
        Ok(success) => success_response(&success, &url, &method),
        Err(failure) => failure_response(failure),
    })
}

/// Validate a target URL: present, absolute and http(s)
pub(crate) fn parse_target(raw: Option<&str>) -> Result<Url> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| WhiskeyError::InvalidRequest("URL parameter is required".to_string()))?;

    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(WhiskeyError::InvalidRequest(format!(
            "Unsupported URL scheme: {}",
            other
        ))),
    }
}

/// Build per-request options from query values, falling back to config
pub(crate) fn forward_options(
    state: &AppState,
    policy: Option<&str>,
    proxy_type: Option<&str>,
    country: Option<&str>,
    explicit: Option<&str>,
    use_proxy: Option<bool>,
) -> Result<ForwardOptions> {
    let policy = match (explicit, policy) {
        (Some(address), _) => SelectionPolicy::explicit(address).ok_or_else(|| {
            WhiskeyError::InvalidRequest(format!("proxy must be host:port, got {}", address))
        })?,
        (None, Some(name)) => SelectionPolicy::from_str(name),
        (None, None) => state.default_policy.clone(),
    };

    let proxy_type = match proxy_type {
        Some(raw) => Some(ProxyType::from_str(raw).ok_or_else(|| {
            WhiskeyError::InvalidRequest(format!("Unknown proxy type: {}", raw))
        })?),
        None => None,
    };

    Ok(ForwardOptions {
        policy,
        filter: ProxyFilter {
            proxy_type,
            country: country
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        },
        use_proxy: use_proxy.unwrap_or(state.config.pool.enabled),
        deadline: None,
    })
}

fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in SKIPPED_HEADERS.iter() {
        headers.remove(name);
    }
    headers
}

fn success_response(success: &ForwardSuccess, url: &Url, method: &Method) -> Response {
    let upstream = &success.response;
    let body = json!({
        "data": body_json(&upstream.body),
        "status": upstream.status.as_u16(),
        "headers": headers_json(&upstream.headers),
        "responseTime": success.elapsed_ms,
        "url": url.as_str(),
        "method": method.as_str(),
        "proxy": success.proxy_used,
        "attempts": success.attempts,
    });

    (upstream.status, Json(body)).into_response()
}

#[derive(Serialize)]
struct FailureBody {
    error: &'static str,
    #[serde(flatten)]
    failure: ForwardFailure,
}

fn failure_response(failure: ForwardFailure) -> Response {
    let status: StatusCode = failure.kind.status_code();
    (
        status,
        Json(FailureBody {
            error: "Request failed",
            failure,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::test_support::{app, get, send};
    use crate::error::TransportError;
    use crate::models::{HealthState, ProxyRecord};
    use crate::proxy::transport::mock::{Behavior, ScriptedTransport, DIRECT};
    use axum::body::Body;
    use axum::http::Request;

    fn pool() -> Vec<ProxyRecord> {
        vec![
            ProxyRecord::new("10.0.0.1", 8080, ProxyType::Http).with_country("US"),
            ProxyRecord::new("10.0.0.2", 1080, ProxyType::Socks5).with_country("DE"),
        ]
    }

    #[test]
    fn test_parse_target() {
        assert!(parse_target(Some("https://httpbin.org/ip")).is_ok());
        assert!(matches!(
            parse_target(None),
            Err(WhiskeyError::InvalidRequest(_))
        ));
        assert!(matches!(
            parse_target(Some("  ")),
            Err(WhiskeyError::InvalidRequest(_))
        ));
        assert!(matches!(
            parse_target(Some("not a url")),
            Err(WhiskeyError::InvalidRequest(_))
        ));
        assert!(matches!(
            parse_target(Some("ftp://example.com/file")),
            Err(WhiskeyError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_outbound_headers_drop_connection_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, "localhost:3000".parse().unwrap());
        inbound.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        inbound.insert(header::ACCEPT, "application/json".parse().unwrap());
        inbound.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        inbound.insert(header::ACCEPT_ENCODING, "gzip, deflate, br".parse().unwrap());

        let outbound = outbound_headers(&inbound);
        assert!(outbound.get(header::HOST).is_none());
        assert!(outbound.get(header::ACCEPT_ENCODING).is_none());
        assert!(outbound.get(header::CONNECTION).is_none());
        assert_eq!(outbound.get(header::ACCEPT).unwrap(), "application/json");
        assert_eq!(outbound.get(header::AUTHORIZATION).unwrap(), "Bearer abc");
    }

    /// `{"origin":"1.2.3.4"}` gzip-encoded
    const GZIP_ORIGIN: [u8; 40] = [
        0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x03, 0xab, 0x56, 0xca, 0x2f, 0xca,
        0x4c, 0xcf, 0xcc, 0x53, 0xb2, 0x52, 0x32, 0xd4, 0x33, 0xd2, 0x33, 0xd6, 0x33, 0x51, 0xaa,
        0x05, 0x00, 0xef, 0x9b, 0x71, 0x44, 0x14, 0x00, 0x00, 0x00,
    ];

    /// Serve one request, gzip-encoding the reply when the client accepts gzip
    async fn serve_gzip_once(listener: tokio::net::TcpListener) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            head.extend_from_slice(&buf[..n]);
        }

        let head = String::from_utf8_lossy(&head).to_ascii_lowercase();
        let accepts_gzip = head
            .lines()
            .any(|line| line.starts_with("accept-encoding:") && line.contains("gzip"));

        let (encoding, body): (&str, &[u8]) = if accepts_gzip {
            ("content-encoding: gzip\r\n", &GZIP_ORIGIN)
        } else {
            ("", br#"{"origin":"1.2.3.4"}"#)
        };
        let reply = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n{}content-length: {}\r\nconnection: close\r\n\r\n",
            encoding,
            body.len()
        );
        socket.write_all(reply.as_bytes()).await.unwrap();
        socket.write_all(body).await.unwrap();
        socket.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_compressed_upstream_body_is_decoded() {
        use crate::proxy::{ProxyTransport, ReqwestTransport};
        use std::time::Duration;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_gzip_once(listener));

        let mut inbound = HeaderMap::new();
        inbound.insert(header::ACCEPT_ENCODING, "gzip, deflate, br".parse().unwrap());
        let url = Url::parse(&format!("http://{}/ip", addr)).unwrap();
        let request = ForwardRequest::get(url).with_headers(outbound_headers(&inbound));

        let response = ReqwestTransport::default()
            .send(None, &request, Duration::from_secs(5))
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(body_json(&response.body)["origin"], "1.2.3.4");
    }

    #[tokio::test]
    async fn test_missing_url_is_bad_request() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(200)));

        let (status, body) = get(&app.router, "/api/proxy").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("URL parameter is required"));
        assert_eq!(app.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_url_is_bad_request() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(200)));

        let (status, _) = get(&app.router, "/api/proxy?url=not-a-url").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_forward_through_proxy() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(200)));

        let (status, body) = get(
            &app.router,
            "/api/proxy?url=https%3A%2F%2Fhttpbin.org%2Fip&policy=next",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], 200);
        assert_eq!(body["data"]["origin"], "203.0.113.7");
        assert_eq!(body["headers"]["content-type"], "application/json");
        assert_eq!(body["url"], "https://httpbin.org/ip");
        assert_eq!(body["method"], "GET");
        assert_eq!(body["attempts"], 1);
        assert_eq!(body["proxy"]["host"], "10.0.0.1");
        assert_eq!(body["proxy"]["isHealthy"], true);
    }

    #[tokio::test]
    async fn test_client_error_status_is_forwarded() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(404)));

        let (status, body) = get(&app.router, "/api/proxy?url=https://example.com/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
        assert_eq!(body["attempts"], 1);
        assert_eq!(app.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_is_bad_gateway() {
        let app = app(
            pool(),
            ScriptedTransport::new(Behavior::Fail(TransportError::Connect(
                "connection refused".into(),
            ))),
        );

        let (status, body) = get(&app.router, "/api/proxy?url=https://example.com/").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Request failed");
        assert_eq!(body["kind"], "transport_failure");
        assert_eq!(body["attempts"], 3);
        assert_eq!(body["pool"]["unhealthy"], 2);
        assert!(body["elapsedMs"].is_u64());
    }

    #[tokio::test]
    async fn test_empty_filter_result_is_service_unavailable() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(200)));

        let (status, body) = get(&app.router, "/api/proxy?url=https://example.com/&country=FR").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["kind"], "no_proxy_available");
        assert_eq!(body["attempts"], 0);
        assert_eq!(app.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_filters_and_explicit_proxy() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(200)));

        let (status, body) = get(&app.router, "/api/proxy?url=https://example.com/&type=socks5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["proxy"]["host"], "10.0.0.2");

        let (status, body) = get(
            &app.router,
            "/api/proxy?url=https://example.com/&proxy=10.0.0.1:8080",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["proxy"]["port"], 8080);

        let (status, _) = get(&app.router, "/api/proxy?url=https://example.com/&type=ftp").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(&app.router, "/api/proxy?url=https://example.com/&proxy=nope").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_flag_is_json_bad_request() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(200)));

        let (status, body) = get(&app.router, "/api/proxy?url=https://example.com/&useProxy=perhaps").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("useProxy"));
        assert_eq!(app.transport.call_count(), 0);

        let (status, body) = get(&app.router, "/api/proxy?url=https://example.com/&useProxy=0").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["proxy"].is_null());
    }

    #[tokio::test]
    async fn test_direct_request_skips_pool() {
        let app = app(pool(), ScriptedTransport::new(Behavior::Status(201)));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/proxy?url=https://example.com/items&useProxy=false")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"x"}"#))
            .unwrap();
        let (status, body) = send(&app.router, request).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["method"], "POST");
        assert!(body["proxy"].is_null());
        assert_eq!(app.transport.calls(), vec![DIRECT.to_string()]);
        assert_eq!(
            app.store.find("10.0.0.1", 8080).unwrap().health,
            HealthState::Untested
        );
    }
}
