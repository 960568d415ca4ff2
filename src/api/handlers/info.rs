//! Proxy listing endpoint

use std::collections::BTreeSet;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::parse_number;
use crate::api::server::AppState;
use crate::error::{Result, WhiskeyError};
use crate::models::{ProxyFilter, ProxyType};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 1000;

/// Query parameters of `/api/proxy-info`
#[derive(Debug, Deserialize, Default)]
pub struct ProxyInfoQuery {
    #[serde(rename = "type")]
    pub proxy_type: Option<String>,
    pub country: Option<String>,
    pub limit: Option<String>,
}

/// List public proxy views, optionally filtered, with the available filters
pub async fn proxy_info(
    State(state): State<AppState>,
    Query(query): Query<ProxyInfoQuery>,
) -> Result<impl IntoResponse> {
    let proxy_type = match query.proxy_type.as_deref() {
        Some(raw) => Some(
            ProxyType::from_str(raw)
                .ok_or_else(|| WhiskeyError::InvalidRequest(format!("Unknown proxy type: {}", raw)))?,
        ),
        None => None,
    };
    let filter = ProxyFilter {
        proxy_type,
        country: query.country.filter(|c| !c.trim().is_empty()),
    };
    let limit = parse_number("limit", query.limit.as_deref())?
        .unwrap_or(DEFAULT_LIMIT)
        .min(MAX_LIMIT);

    let matching = state.store.list(&filter);
    let total = matching.len();
    let proxies: Vec<_> = matching.into_iter().take(limit).collect();

    let (countries, types) = state.store.read(|records| {
        let countries: BTreeSet<String> = records
            .iter()
            .map(|p| p.country.clone())
            .filter(|c| !c.is_empty())
            .collect();
        let types: BTreeSet<&'static str> = records.iter().map(|p| p.proxy_type.as_str()).collect();
        (countries, types)
    });

    Ok(Json(json!({
        "proxies": proxies,
        "count": proxies.len(),
        "total": total,
        "limit": limit,
        "filters": {
            "countries": countries,
            "types": types,
        },
    })))
}
