use std::collections::BTreeMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_ERROR_MESSAGE_LIMIT: usize = 2_000;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LOG_FILTER: &str =
    "svenn_gateway=info,svenn_scheduler=info,svenn_batch=info,svenn_units=info,tower_http=debug";

/// Top-level config (svenn.toml + SVENN_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SvennConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Named backing stores the processing units read from and write to.
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Location of the job / execution storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Connection parameters for one named store.
///
/// `path` is required; an empty value is rejected when a connection
/// manager is built from the config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub read_only: bool,
}

impl StoreConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            read_only: false,
        }
    }
}

/// `[stores.<name>]` tables keyed by store name (e.g. `raw_data`, `svenn_products`).
pub type StoresConfig = BTreeMap<String, StoreConfig>;

/// What to do with fire times that elapsed while the scheduler was not running.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MisfirePolicy {
    /// Drop missed fire times and arm the next future one.
    #[default]
    Skip,
    /// Fire a single catch-up run on start, then resume the normal cadence.
    RunOnce,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the evaluation loop checks for due triggers.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub misfire_policy: MisfirePolicy,
    /// When false a firing is skipped while the previous run of the same job
    /// is still in progress.
    #[serde(default)]
    pub allow_overlap: bool,
    /// Maximum number of characters kept from a failed run's error text.
    #[serde(default = "default_error_message_limit")]
    pub error_message_limit: usize,
    /// Chunk size handed to batch units that do not pick their own.
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            misfire_policy: MisfirePolicy::default(),
            allow_overlap: false,
            error_message_limit: DEFAULT_ERROR_MESSAGE_LIMIT,
            default_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}
fn default_error_message_limit() -> usize {
    DEFAULT_ERROR_MESSAGE_LIMIT
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.svenn/svenn.db", home)
}

impl SvennConfig {
    /// Load config from a TOML file with SVENN_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `SVENN_STORES__RAW_DATA__PATH=/data/raw.db`.
    /// A missing file is not an error; every section has defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::SvennError::Configuration(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SVENN_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.svenn/svenn.toml", home)
}
