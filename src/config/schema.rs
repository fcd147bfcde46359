use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Aggregator endpoint being checked
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Evaluation loop settings
    #[serde(default)]
    pub check: CheckConfig,
    /// Status HTTP server
    #[serde(default)]
    pub server: ServerConfig,
    /// Optional Prometheus endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ============================================================================
// Database
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_db_host() -> String {
    "127.0.0.1".to_string()
}

fn default_db_port() -> u16 {
    3306
}

fn default_db_user() -> String {
    "root".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// Get the address string (host:port)
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Check loop
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    /// Whether to evaluate and serve the master aggregator role
    #[serde(default = "default_role_check_enabled")]
    pub role_check_enabled: bool,
    /// Sleep between evaluation cycles (milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Deadline for each diagnostic query (milliseconds)
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Deadline for the KILL issued against a timed-out session (milliseconds)
    #[serde(default = "default_reclaim_timeout_ms")]
    pub reclaim_timeout_ms: u64,
}

fn default_role_check_enabled() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    30_000
}

fn default_query_timeout_ms() -> u64 {
    10_000
}

fn default_reclaim_timeout_ms() -> u64 {
    5_000
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            role_check_enabled: default_role_check_enabled(),
            interval_ms: default_interval_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            reclaim_timeout_ms: default_reclaim_timeout_ms(),
        }
    }
}

impl CheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn reclaim_timeout(&self) -> Duration {
        Duration::from_millis(self.reclaim_timeout_ms)
    }
}

// ============================================================================
// HTTP servers
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    3309
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9309".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
        }
    }
}
