use crate::error::{Result, WhiskeyError};
use std::env;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiServerConfig,
    /// Proxy pool source and defaults
    pub pool: PoolConfig,
    /// Forwarding and retry configuration
    pub forward: ForwardConfig,
    /// Health prober configuration
    pub health: HealthConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the API server (default: 3000)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = any origin)
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Path of the JSON proxy list
    pub list_path: String,
    /// Whether requests go through the pool unless told otherwise
    pub enabled: bool,
    /// Default selection policy name (next, random, fastest, next-healthy)
    pub selection_policy: String,
}

#[derive(Debug, Clone)]
pub struct ForwardConfig {
    /// Attempts per request when a proxy is used
    pub max_attempts: u32,
    /// Per-attempt timeout in seconds
    pub request_timeout: u64,
    /// Maximum redirects followed per attempt
    pub max_redirects: usize,
    /// Fixed pause between attempts in milliseconds
    pub retry_backoff_ms: u64,
    /// Overall deadline for one inbound request in seconds
    pub request_deadline: u64,
    /// Timeout for on-demand proxy tests in seconds
    pub test_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Endpoint probed through each proxy
    pub check_url: String,
    /// Seconds between probe rounds
    pub check_interval: u64,
    /// Per-probe timeout in seconds
    pub check_timeout: u64,
    /// Records probed per round
    pub batch_size: usize,
    /// Run a round immediately on startup
    pub check_on_start: bool,
    /// Seconds to wait for in-flight probes on shutdown
    pub shutdown_grace: u64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            api: ApiServerConfig {
                port: get_env_or("API_PORT", "3000").parse().map_err(|_| {
                    WhiskeyError::InvalidConfig("API_PORT must be a valid port number".into())
                })?,
                host: get_env_or("API_HOST", "0.0.0.0"),
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            pool: PoolConfig {
                list_path: get_env_or("PROXY_LIST_PATH", "proxies.json"),
                enabled: get_env_or("PROXY_ENABLED", "true").parse().unwrap_or(true),
                selection_policy: get_env_or("PROXY_SELECTION_POLICY", "random"),
            },
            forward: ForwardConfig {
                max_attempts: get_env_or("PROXY_MAX_ATTEMPTS", "3")
                    .parse()
                    .unwrap_or(3)
                    .max(1),
                request_timeout: get_env_or("PROXY_REQUEST_TIMEOUT", "30")
                    .parse()
                    .unwrap_or(30),
                max_redirects: get_env_or("PROXY_MAX_REDIRECTS", "5").parse().unwrap_or(5),
                retry_backoff_ms: get_env_or("PROXY_RETRY_BACKOFF_MS", "1000")
                    .parse()
                    .unwrap_or(1000),
                request_deadline: get_env_or("PROXY_REQUEST_DEADLINE", "60")
                    .parse()
                    .unwrap_or(60),
                test_timeout: get_env_or("PROXY_TEST_TIMEOUT", "15").parse().unwrap_or(15),
            },
            health: HealthConfig {
                check_url: parse_check_url()?,
                check_interval: get_env_or("HEALTH_CHECK_INTERVAL", "300")
                    .parse()
                    .unwrap_or(300),
                check_timeout: get_env_or("HEALTH_CHECK_TIMEOUT", "10")
                    .parse()
                    .unwrap_or(10),
                batch_size: get_env_or("HEALTH_CHECK_BATCH", "20").parse().unwrap_or(20),
                check_on_start: get_env_or("HEALTH_CHECK_ON_START", "false")
                    .parse()
                    .unwrap_or(false),
                shutdown_grace: get_env_or("HEALTH_CHECK_GRACE", "5").parse().unwrap_or(5),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the API server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

/// Upper bound for the overall per-request deadline
pub const MAX_REQUEST_DEADLINE: Duration = Duration::from_secs(24 * 60 * 60);

impl ForwardConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline.max(1)).min(MAX_REQUEST_DEADLINE)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout.max(1))
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            request_timeout: 30,
            max_redirects: 5,
            retry_backoff_ms: 1000,
            request_deadline: 60,
            test_timeout: 15,
        }
    }
}

impl HealthConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval.max(1))
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_url: DEFAULT_CHECK_URL.to_string(),
            check_interval: 300,
            check_timeout: 10,
            batch_size: 20,
            check_on_start: false,
            shutdown_grace: 5,
        }
    }
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            list_path: "proxies.json".to_string(),
            enabled: true,
            selection_policy: "random".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiServerConfig::default(),
            pool: PoolConfig::default(),
            forward: ForwardConfig::default(),
            health: HealthConfig::default(),
            log: LogConfig::default(),
        }
    }
}

const DEFAULT_CHECK_URL: &str = "https://httpbin.org/ip";

fn parse_check_url() -> Result<String> {
    let raw = get_env_or("HEALTH_CHECK_URL", DEFAULT_CHECK_URL);
    let raw = raw.trim();

    let url = Url::parse(raw).map_err(|e| {
        WhiskeyError::InvalidConfig(format!("HEALTH_CHECK_URL must be a valid URL: {}", e))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(WhiskeyError::InvalidConfig(format!(
            "HEALTH_CHECK_URL has unsupported scheme: {}",
            other
        ))),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
