use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Unified error type for the Whiskey application
#[derive(Error, Debug)]
pub enum WhiskeyError {
    // Proxy list errors
    #[error("Failed to load proxy list from {path}: {reason}")]
    ConfigLoad { path: String, reason: String },

    #[error("Invalid proxy entry: {0}")]
    InvalidProxyEntry(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Whiskey operations
pub type Result<T> = std::result::Result<T, WhiskeyError>;

impl WhiskeyError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            WhiskeyError::InvalidRequest(_)
            | WhiskeyError::InvalidProxyEntry(_)
            | WhiskeyError::InvalidConfig(_)
            | WhiskeyError::Json(_) => StatusCode::BAD_REQUEST,

            // 500 Internal Server Error
            WhiskeyError::ConfigLoad { .. } | WhiskeyError::Io(_) | WhiskeyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WhiskeyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

impl From<url::ParseError> for WhiskeyError {
    fn from(err: url::ParseError) -> Self {
        WhiskeyError::InvalidRequest(format!("Invalid URL provided: {}", err))
    }
}

/// Classified reason a forwarded request did not produce a usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Empty pool, or nothing left after filtering.
    NoProxyAvailable,
    /// Timeout, refused connection, TLS or protocol failure before a response.
    TransportFailure,
    /// The target answered with a 5xx status.
    UpstreamServerError,
    /// The caller's overall deadline elapsed before an attempt succeeded.
    DeadlineExceeded,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NoProxyAvailable => "no_proxy_available",
            FailureKind::TransportFailure => "transport_failure",
            FailureKind::UpstreamServerError => "upstream_server_error",
            FailureKind::DeadlineExceeded => "deadline_exceeded",
        }
    }

    /// HTTP status used when this failure is surfaced to an API client
    pub fn status_code(&self) -> StatusCode {
        match self {
            FailureKind::NoProxyAvailable => StatusCode::SERVICE_UNAVAILABLE,
            FailureKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            FailureKind::TransportFailure | FailureKind::UpstreamServerError => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Low-level outcome of a transport that produced no HTTP response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("too many redirects: {0}")]
    Redirect(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("failed to build client: {0}")]
    Client(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_redirect() {
            TransportError::Redirect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else if err.is_builder() {
            TransportError::Client(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}
