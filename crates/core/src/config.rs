use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `LEADPULSE__` and overridable from the CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub event_store: EventStoreConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Which backing tier the event store factory selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// ClickHouse when a URL is configured, else the embedded file store,
    /// else process memory.
    Auto,
    Durable,
    Embedded,
    Volatile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventStoreConfig {
    #[serde(default = "default_store_mode")]
    pub mode: StoreMode,
    /// ClickHouse endpoint; presence selects the durable tier under `auto`.
    #[serde(default)]
    pub clickhouse_url: Option<String>,
    #[serde(default = "default_clickhouse_db")]
    pub database: String,
    /// Directory for the embedded tier's single-file database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_query_limit")]
    pub default_query_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// JSON row-array endpoint exposed by the spreadsheet collaborator.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_ledger_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_language")]
    pub default_language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_store_mode() -> StoreMode {
    StoreMode::Auto
}
fn default_clickhouse_db() -> String {
    "leadpulse".to_string()
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_query_limit() -> usize {
    100
}
fn default_ledger_timeout_secs() -> u64 {
    15
}
fn default_language() -> String {
    "ar".to_string()
}
fn default_cache_ttl_secs() -> u64 {
    20
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            mode: default_store_mode(),
            clickhouse_url: None,
            database: default_clickhouse_db(),
            data_dir: default_data_dir(),
            default_query_limit: default_query_limit(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_ledger_timeout_secs(),
            default_language: default_language(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            event_store: EventStoreConfig::default(),
            ledger: LedgerConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("LEADPULSE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.api.http_port, 8080);
        assert_eq!(cfg.cache.ttl_secs, 20);
        assert_eq!(cfg.event_store.mode, StoreMode::Auto);
        assert_eq!(cfg.event_store.default_query_limit, 100);
        assert_eq!(cfg.ledger.default_language, "ar");
    }
}
