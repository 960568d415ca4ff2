//! Pool statistics endpoint

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::api::server::AppState;
use crate::models::{PoolStats, ProxyRecord};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    #[serde(flatten)]
    pub stats: PoolStats,
    pub health_percentage: f64,
}

impl From<PoolStats> for Overview {
    fn from(stats: PoolStats) -> Self {
        Self {
            health_percentage: (stats.health_percentage() * 100.0).round() / 100.0,
            stats,
        }
    }
}

/// Aggregate pool health, overall and grouped by type and country
pub async fn proxy_stats(State(state): State<AppState>) -> impl IntoResponse {
    let (overview, by_type, by_country) = state.store.read(|records| {
        (
            PoolStats::from_records(records),
            group_by(records, |p| p.proxy_type.as_str().to_string()),
            group_by(records, |p| p.country.clone()),
        )
    });

    Json(serde_json::json!({
        "overview": Overview::from(overview),
        "byType": by_type,
        "byCountry": by_country,
        "timestamp": Utc::now(),
    }))
}

fn group_by<F>(records: &[ProxyRecord], key: F) -> BTreeMap<String, PoolStats>
where
    F: Fn(&ProxyRecord) -> String,
{
    let mut groups: BTreeMap<String, Vec<&ProxyRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(key(record)).or_default().push(record);
    }
    groups
        .into_iter()
        .map(|(name, members)| (name, PoolStats::from_records(members)))
        .collect()
}
