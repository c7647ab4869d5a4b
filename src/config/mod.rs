use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub fetcher: FetcherConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
}

/// Fetcher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    /// Per-request timeout. The upstream files are small; a hung fetch
    /// must not eat the whole cycle.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// 0 = one attempt per scheduled cycle; the scheduler itself
    /// re-attempts every period.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
}

/// Read-cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// TTL of the all-feeds snapshot.
    #[serde(default = "default_snapshot_ttl_secs")]
    pub snapshot_ttl_secs: u64,

    /// TTL of single-feed reads.
    #[serde(default = "default_feed_ttl_secs")]
    pub feed_ttl_secs: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// How many times a full read is retried while the store is missing
    /// expected collections.
    #[serde(default = "default_read_retry_limit")]
    pub read_retry_limit: u32,

    #[serde(default = "default_read_retry_delay_ms")]
    pub read_retry_delay_ms: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_timeout_ms() -> u64 {
    800
}
fn default_request_delay_ms() -> u64 {
    250
}
fn default_jitter_ms() -> u64 {
    100
}
fn default_max_retries() -> u32 {
    0
}
fn default_retry_base_ms() -> u64 {
    50
}
fn default_user_agent() -> String {
    "epi-etl/0.1 (public dataset acquisition)".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/epidata.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_period_secs() -> u64 {
    60
}
fn default_snapshot_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_feed_ttl_secs() -> u64 {
    60
}
fn default_max_entries() -> usize {
    10
}
fn default_read_retry_limit() -> u32 {
    3
}
fn default_read_retry_delay_ms() -> u64 {
    200
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("EPI").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());
        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fetcher: FetcherConfig::default(),
            storage: StorageConfig {
                db_path: default_db_path(),
                run_migrations: true,
            },
            scheduler: SchedulerConfig { period_secs: default_period_secs() },
            cache: CacheConfig::default(),
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: default_snapshot_ttl_secs(),
            feed_ttl_secs: default_feed_ttl_secs(),
            max_entries: default_max_entries(),
            read_retry_limit: default_read_retry_limit(),
            read_retry_delay_ms: default_read_retry_delay_ms(),
        }
    }
}
