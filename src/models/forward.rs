use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use url::Url;

use super::proxy::{PoolStats, ProxyView};
use crate::error::FailureKind;

/// One outbound request to be sent to a target URL
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ForwardRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            url,
            method,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = if body.is_empty() { None } else { Some(body) };
        self
    }
}

/// Response obtained from the target, regardless of its status
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn class(&self) -> ResponseClass {
        ResponseClass::of(self.status)
    }
}

/// How a received status affects the attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    /// 4xx: the target's answer, forwarded verbatim; the proxy worked
    UpstreamClientError,
    /// 5xx: counts as a failed attempt
    UpstreamServerError,
}

impl ResponseClass {
    pub fn of(status: StatusCode) -> Self {
        if status.is_server_error() {
            ResponseClass::UpstreamServerError
        } else if status.is_client_error() {
            ResponseClass::UpstreamClientError
        } else {
            ResponseClass::Success
        }
    }

    pub fn is_transport_success(&self) -> bool {
        !matches!(self, ResponseClass::UpstreamServerError)
    }
}

/// A forwarded request that produced a response worth returning to the caller
#[derive(Debug, Clone)]
pub struct ForwardSuccess {
    pub response: UpstreamResponse,
    pub proxy_used: Option<ProxyView>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// Final, classified failure of a forwarded request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardFailure {
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
    pub elapsed_ms: u64,
    /// Pool health at the moment of failure
    pub pool: PoolStats,
}

impl std::fmt::Display for ForwardFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} after {} attempt(s): {}",
            self.kind, self.attempts, self.message
        )
    }
}

pub type ForwardResult = std::result::Result<ForwardSuccess, ForwardFailure>;
