//! API request handlers

pub mod forward;
pub mod health;
pub mod info;
pub mod stats;
pub mod testing;

use axum::http::HeaderMap;
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::{Result, WhiskeyError};

/// Upstream headers as a JSON object; repeated names are joined with ", "
pub(crate) fn headers_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match map.get_mut(name.as_str()) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                map.insert(name.as_str().to_string(), Value::String(value));
            }
        }
    }
    Value::Object(map)
}

/// Upstream body as parsed JSON when possible, otherwise as text
pub(crate) fn body_json(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::String(String::new());
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// Parse an optional boolean query flag (`true`/`false`, `1`/`0`)
pub(crate) fn parse_flag(name: &str, raw: Option<&str>) -> Result<Option<bool>> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(Some(true)),
        "false" | "0" => Ok(Some(false)),
        _ => Err(WhiskeyError::InvalidRequest(format!(
            "{} must be true or false, got {}",
            name, raw
        ))),
    }
}

/// Parse an optional non-negative integer query value
pub(crate) fn parse_number(name: &str, raw: Option<&str>) -> Result<Option<usize>> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<usize>().map(Some).map_err(|_| {
        WhiskeyError::InvalidRequest(format!(
            "{} must be a non-negative integer, got {}",
            name, raw
        ))
    })
}
