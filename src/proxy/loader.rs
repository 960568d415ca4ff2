//! Static proxy list loading
//!
//! The list is a JSON array of `{host, port, type, country, uptime?, responseTime?}`.
//! Entries are validated one by one so a single bad entry does not discard
//! the rest of the pool.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{Result, WhiskeyError};
use crate::models::{ProxyRecord, ProxyType};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProxyEntry {
    host: String,
    port: i64,
    #[serde(rename = "type")]
    proxy_type: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    uptime: Option<f64>,
    #[serde(default)]
    response_time: Option<i64>,
}

impl TryFrom<ProxyEntry> for ProxyRecord {
    type Error = WhiskeyError;

    fn try_from(entry: ProxyEntry) -> Result<Self> {
        let host = entry.host.trim();
        if host.is_empty() {
            return Err(WhiskeyError::InvalidProxyEntry("host is empty".into()));
        }

        let port = u16::try_from(entry.port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                WhiskeyError::InvalidProxyEntry(format!("port {} out of range", entry.port))
            })?;

        let proxy_type = ProxyType::from_str(&entry.proxy_type).ok_or_else(|| {
            WhiskeyError::InvalidProxyEntry(format!(
                "unsupported proxy type: {}",
                entry.proxy_type
            ))
        })?;

        let uptime = entry.uptime.unwrap_or(100.0);
        if !uptime.is_finite() || !(0.0..=100.0).contains(&uptime) {
            return Err(WhiskeyError::InvalidProxyEntry(format!(
                "uptime {} outside [0, 100]",
                uptime
            )));
        }

        let response_time_ms = match entry.response_time {
            Some(ms) if ms < 0 => {
                return Err(WhiskeyError::InvalidProxyEntry(format!(
                    "negative responseTime {}",
                    ms
                )))
            }
            Some(ms) => ms as u64,
            None => 0,
        };

        let mut record = ProxyRecord::new(host, port, proxy_type)
            .with_country(entry.country.trim())
            .with_uptime(uptime);
        record.response_time_ms = response_time_ms;
        Ok(record)
    }
}

/// Parse a proxy list document, dropping malformed and duplicate entries
pub fn load_from_str(raw: &str) -> Result<Vec<ProxyRecord>> {
    let entries: Vec<Value> = serde_json::from_str(raw)?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(entries.len());

    for (position, value) in entries.into_iter().enumerate() {
        let record = serde_json::from_value::<ProxyEntry>(value)
            .map_err(WhiskeyError::from)
            .and_then(ProxyRecord::try_from);

        match record {
            Ok(record) => {
                if !seen.insert((record.host.to_ascii_lowercase(), record.port)) {
                    warn!(position, proxy = %record.address(), "Skipping duplicate proxy entry");
                    continue;
                }
                records.push(record);
            }
            Err(e) => {
                warn!(position, error = %e, "Skipping malformed proxy entry");
            }
        }
    }

    Ok(records)
}

/// Read and parse the proxy list at `path`
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<Vec<ProxyRecord>> {
    let path = path.as_ref();
    let display = path.display().to_string();

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| WhiskeyError::ConfigLoad {
            path: display.clone(),
            reason: e.to_string(),
        })?;

    load_from_str(&raw).map_err(|e| WhiskeyError::ConfigLoad {
        path: display,
        reason: e.to_string(),
    })
}

/// Load the proxy list, degrading to an empty pool on any failure
pub async fn load_or_empty(path: impl AsRef<Path>) -> Vec<ProxyRecord> {
    let path = path.as_ref();
    match load_from_path(path).await {
        Ok(records) => {
            info!(path = %path.display(), count = records.len(), "Loaded proxy list");
            records
        }
        Err(e) => {
            error!("{}; continuing with an empty proxy pool", e);
            Vec::new()
        }
    }
}
