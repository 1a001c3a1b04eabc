use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default = "default_http_url")]
    pub http_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_http_url() -> String {
    "http://127.0.0.1:8545".to_string()
}
fn default_ws_url() -> String {
    "ws://127.0.0.1:8546".to_string()
}
fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            http_url: default_http_url(),
            ws_url: default_ws_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Rpc {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Fetcher {
    /// Nominal blocks per `eth_getLogs` window
    #[serde(default = "default_chunk_span")]
    pub chunk_span: u64,
    /// Windows are never shrunk below this
    #[serde(default = "default_min_span")]
    pub min_span: u64,
    /// Hard cap on a single fetch (~5 days at 12s/block)
    #[serde(default = "default_max_range")]
    pub max_range: u64,
}

fn default_chunk_span() -> u64 {
    2_000
}
fn default_min_span() -> u64 {
    10
}
fn default_max_range() -> u64 {
    35_000
}

impl Default for Fetcher {
    fn default() -> Self {
        Self {
            chunk_span: default_chunk_span(),
            min_span: default_min_span(),
            max_range: default_max_range(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Backfill {
    #[serde(default = "default_backfill_days")]
    pub days: f64,
    #[serde(default = "default_batch_blocks")]
    pub batch_blocks: u64,
    #[serde(default = "default_blocks_per_day")]
    pub blocks_per_day: u64,
}

fn default_backfill_days() -> f64 {
    1.0
}
fn default_batch_blocks() -> u64 {
    100
}
fn default_blocks_per_day() -> u64 {
    7_200 // 12s/block
}

impl Default for Backfill {
    fn default() -> Self {
        Self {
            days: default_backfill_days(),
            batch_blocks: default_batch_blocks(),
            blocks_per_day: default_blocks_per_day(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Tail {
    /// Largest head gap filled block-by-block before giving up on the gap
    #[serde(default = "default_max_catch_up_blocks")]
    pub max_catch_up_blocks: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_delay_secs")]
    pub max_reconnect_delay_secs: u64,
}

fn default_max_catch_up_blocks() -> u64 {
    64
}
fn default_reconnect_delay_ms() -> u64 {
    1_000
}
fn default_max_reconnect_delay_secs() -> u64 {
    60
}

impl Default for Tail {
    fn default() -> Self {
        Self {
            max_catch_up_blocks: default_max_catch_up_blocks(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_secs: default_max_reconnect_delay_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Store {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "data/ingest.db".to_string()
}

impl Default for Store {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Upper bound on `retention.days` (100 years).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Deserialize, Clone)]
pub struct Retention {
    #[serde(default = "default_retention_days")]
    pub days: u32,
    /// Sweep period while tailing; 0 disables the timer
    #[serde(default = "default_retention_interval_secs")]
    pub interval_secs: u64,
}

fn default_retention_days() -> u32 {
    30
}
fn default_retention_interval_secs() -> u64 {
    3_600
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
            interval_secs: default_retention_interval_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub fetcher: Fetcher,
    #[serde(default)]
    pub backfill: Backfill,
    #[serde(default)]
    pub tail: Tail,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub retention: Retention,
}

impl Settings {
    /// Loads `Config.toml` (or `INGEST_CONFIG_FILE`) if present, then applies `INGEST_*` overrides.
    pub fn new() -> Result<Self, ConfigError> {
        let config_file = env::var("INGEST_CONFIG_FILE").unwrap_or_else(|_| "Config.toml".to_string());
        let s = Config::builder()
            .add_source(File::with_name(&config_file).required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides()?;
        settings.validate()?;

        Ok(settings)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(url) = env_string("INGEST_RPC_HTTP_URL") {
            self.rpc.http_url = url;
        }
        if let Some(url) = env_string("INGEST_RPC_WS_URL") {
            self.rpc.ws_url = url;
        }
        if let Some(path) = env_string("INGEST_DB_PATH") {
            self.store.path = path;
        }
        if let Some(days) = env_parse("INGEST_RETENTION_DAYS")? {
            self.retention.days = days;
        }
        if let Some(secs) = env_parse("INGEST_RETENTION_INTERVAL_SECS")? {
            self.retention.interval_secs = secs;
        }
        if let Some(span) = env_parse("INGEST_CHUNK_SPAN")? {
            self.fetcher.chunk_span = span;
        }
        if let Some(max_range) = env_parse("INGEST_MAX_RANGE")? {
            self.fetcher.max_range = max_range;
        }
        if let Some(days) = env_parse("INGEST_BACKFILL_DAYS")? {
            self.backfill.days = days;
        }
        if let Some(blocks) = env_parse("INGEST_BATCH_BLOCKS")? {
            self.backfill.batch_blocks = blocks;
        }
        Ok(())
    }

    /// Rejects values the jobs cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = &self.fetcher;
        if f.min_span == 0 || f.chunk_span == 0 || f.max_range == 0 {
            return Err(ConfigError::Message(
                "fetcher spans must be greater than zero".to_string(),
            ));
        }
        if f.min_span > f.chunk_span {
            return Err(ConfigError::Message(format!(
                "fetcher.min_span ({}) exceeds fetcher.chunk_span ({})",
                f.min_span, f.chunk_span
            )));
        }
        if f.chunk_span > f.max_range {
            return Err(ConfigError::Message(format!(
                "fetcher.chunk_span ({}) exceeds fetcher.max_range ({})",
                f.chunk_span, f.max_range
            )));
        }
        if self.backfill.batch_blocks == 0 || self.backfill.blocks_per_day == 0 {
            return Err(ConfigError::Message(
                "backfill.batch_blocks and backfill.blocks_per_day must be greater than zero"
                    .to_string(),
            ));
        }
        if !self.backfill.days.is_finite() || self.backfill.days < 0.0 {
            return Err(ConfigError::Message(format!(
                "backfill.days must be a non-negative number, got {}",
                self.backfill.days
            )));
        }
        if self.retention.days > MAX_RETENTION_DAYS {
            return Err(ConfigError::Message(format!(
                "retention.days must be at most {}, got {}",
                MAX_RETENTION_DAYS, self.retention.days
            )));
        }
        if self.rpc.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "rpc.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        check_url("rpc.http_url", &self.rpc.http_url, &["http", "https"])?;
        check_url("rpc.ws_url", &self.rpc.ws_url, &["ws", "wss"])?;
        Ok(())
    }
}

fn check_url(field: &str, raw: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::Message(format!("{} is not a valid URL ({}): {}", field, raw, e)))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::Message(format!(
            "{} must use one of {:?}, got {}",
            field,
            schemes,
            url.scheme()
        )));
    }
    Ok(())
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Message(format!("{}={} is invalid: {}", key, raw, e))),
        None => Ok(None),
    }
}
