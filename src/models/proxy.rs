use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Proxy protocol type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    Http,
    Socks4,
    Socks5,
}

impl ProxyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Http => "http",
            ProxyType::Socks4 => "socks4",
            ProxyType::Socks5 => "socks5",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "http" => Some(ProxyType::Http),
            "socks4" => Some(ProxyType::Socks4),
            "socks5" => Some(ProxyType::Socks5),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProxyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Health state of a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// No probe or live attempt has completed yet
    #[default]
    Untested,
    Healthy,
    Unhealthy,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Untested => "untested",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        }
    }

    /// Untested proxies are given the benefit of the doubt
    pub fn is_usable(&self) -> bool {
        !matches!(self, HealthState::Unhealthy)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HealthState::Untested => None,
            HealthState::Healthy => Some(true),
            HealthState::Unhealthy => Some(false),
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One configured upstream proxy and its health bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRecord {
    pub host: String,
    pub port: u16,
    pub proxy_type: ProxyType,
    pub country: String,
    pub health: HealthState,
    /// Most recent latency in milliseconds; 0 means not measured yet
    pub response_time_ms: u64,
    /// Historical reliability score in [0, 100]
    pub uptime: f64,
    pub last_checked: Option<DateTime<Utc>>,
}

impl ProxyRecord {
    pub fn new(host: impl Into<String>, port: u16, proxy_type: ProxyType) -> Self {
        Self {
            host: host.into(),
            port,
            proxy_type,
            country: String::new(),
            health: HealthState::Untested,
            response_time_ms: 0,
            uptime: 100.0,
            last_checked: None,
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn with_uptime(mut self, uptime: f64) -> Self {
        self.uptime = uptime.clamp(0.0, 100.0);
        self
    }

    pub fn with_health(mut self, health: HealthState, response_time_ms: u64) -> Self {
        self.health = health;
        self.response_time_ms = response_time_ms;
        self
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn address(&self) -> String {
        format_addr(&self.host, self.port)
    }

    /// Proxy URL in the form understood by the outbound HTTP client
    pub fn url(&self) -> String {
        format!("{}://{}", self.proxy_type.as_str(), self.address())
    }

    pub fn is_identified_by(&self, host: &str, port: u16) -> bool {
        self.port == port && self.host.eq_ignore_ascii_case(host)
    }

    /// Whether `response_time_ms` carries a usable measurement
    pub fn is_measured(&self) -> bool {
        self.health.is_usable() && self.response_time_ms > 0
    }

    /// Apply one health observation.
    ///
    /// A failure keeps the previous latency so `fastest` still has history to
    /// work with once the proxy recovers. Applying the same report twice is a
    /// no-op the second time.
    pub fn apply(&mut self, report: &HealthReport) {
        if report.healthy {
            self.health = HealthState::Healthy;
            self.response_time_ms = report.response_time_ms.max(1);
        } else {
            self.health = HealthState::Unhealthy;
        }
        self.last_checked = Some(report.at);
    }
}

/// A single health observation, from a probe or from live traffic
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthReport {
    pub healthy: bool,
    pub response_time_ms: u64,
    pub at: DateTime<Utc>,
}

impl HealthReport {
    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            healthy: true,
            response_time_ms,
            at: Utc::now(),
        }
    }

    pub fn unhealthy(response_time_ms: u64) -> Self {
        Self {
            healthy: false,
            response_time_ms,
            at: Utc::now(),
        }
    }
}

/// Optional type/country restriction applied before selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyFilter {
    pub proxy_type: Option<ProxyType>,
    pub country: Option<String>,
}

impl ProxyFilter {
    pub fn by_type(proxy_type: ProxyType) -> Self {
        Self {
            proxy_type: Some(proxy_type),
            country: None,
        }
    }

    pub fn by_country(country: impl Into<String>) -> Self {
        Self {
            proxy_type: None,
            country: Some(country.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.proxy_type.is_none() && self.country.is_none()
    }

    pub fn matches(&self, proxy: &ProxyRecord) -> bool {
        if let Some(proxy_type) = self.proxy_type {
            if proxy.proxy_type != proxy_type {
                return false;
            }
        }

        if let Some(ref country) = self.country {
            if !proxy.country.eq_ignore_ascii_case(country) {
                return false;
            }
        }

        true
    }
}

/// Read-only projection of a proxy for API consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyView {
    pub host: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    pub country: String,
    pub uptime: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    /// `null` while untested
    pub is_healthy: Option<bool>,
    pub status: HealthState,
    pub last_checked: Option<DateTime<Utc>>,
}

impl From<&ProxyRecord> for ProxyView {
    fn from(proxy: &ProxyRecord) -> Self {
        ProxyView {
            host: proxy.host.clone(),
            port: proxy.port,
            proxy_type: proxy.proxy_type,
            country: proxy.country.clone(),
            uptime: proxy.uptime,
            response_time: (proxy.response_time_ms > 0).then_some(proxy.response_time_ms),
            is_healthy: proxy.health.as_bool(),
            status: proxy.health,
            last_checked: proxy.last_checked,
        }
    }
}

/// Aggregate health counts over the pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub untested: usize,
}

impl PoolStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ProxyRecord>) -> Self {
        records
            .into_iter()
            .fold(PoolStats::default(), |mut stats, proxy| {
                stats.total += 1;
                match proxy.health {
                    HealthState::Healthy => stats.healthy += 1,
                    HealthState::Unhealthy => stats.unhealthy += 1,
                    HealthState::Untested => stats.untested += 1,
                }
                stats
            })
    }

    /// Share of healthy proxies as a percentage (0-100)
    pub fn health_percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.healthy as f64 / self.total as f64) * 100.0
        }
    }
}

pub(crate) fn format_addr(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
