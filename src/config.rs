//! Configuration types for updown-tracker

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// One tracked asset
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AssetConfig {
    /// Asset symbol, e.g. "BTC"
    pub symbol: String,
    /// Slug prefix, e.g. "bitcoin-up-or-down"
    pub slug_prefix: String,
    /// Series grouping slug used when the venue record carries none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_slug: Option<String>,
}

/// Venue endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VenueConfig {
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,
    #[serde(default = "default_clob_url")]
    pub clob_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}
fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            gamma_url: default_gamma_url(),
            clob_url: default_clob_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Discovery engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// How many hourly slugs to probe, starting with the current hour
    #[serde(default = "default_lookahead_hours")]
    pub lookahead_hours: u32,
}

fn default_lookahead_hours() -> u32 {
    2
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            lookahead_hours: default_lookahead_hours(),
        }
    }
}

/// Largest closing-soon window accepted, one day
pub const MAX_CLOSING_WINDOW_MINUTES: i64 = 24 * 60;

/// Snapshot collector configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    /// Upper bound on markets captured at the same time
    #[serde(default = "default_max_concurrent_markets")]
    pub max_concurrent_markets: usize,
    /// Window used by the dense closing-soon job
    #[serde(default = "default_closing_window_minutes")]
    pub closing_window_minutes: i64,
}

fn default_max_concurrent_markets() -> usize {
    8
}
fn default_closing_window_minutes() -> i64 {
    10
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_markets: default_max_concurrent_markets(),
            closing_window_minutes: default_closing_window_minutes(),
        }
    }
}

/// Resolution engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolutionConfig {
    /// A settlement price strictly above this decides the outcome
    #[serde(default = "default_settlement_threshold")]
    pub settlement_threshold: Decimal,
}

fn default_settlement_threshold() -> Decimal {
    Decimal::new(9, 1) // 0.9
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            settlement_threshold: default_settlement_threshold(),
        }
    }
}

/// Retry bounds applied to every external call
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// Job cadences
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
    #[serde(default = "default_closing_interval")]
    pub closing_interval_secs: u64,
    #[serde(default = "default_resolution_interval")]
    pub resolution_interval_secs: u64,
    /// Fire on wall-clock multiples of the interval instead of process start
    #[serde(default = "default_true")]
    pub align_to_wall_clock: bool,
}

fn default_discovery_interval() -> u64 {
    300
}
fn default_snapshot_interval() -> u64 {
    300
}
fn default_closing_interval() -> u64 {
    60
}
fn default_resolution_interval() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            discovery_interval_secs: default_discovery_interval(),
            snapshot_interval_secs: default_snapshot_interval(),
            closing_interval_secs: default_closing_interval(),
            resolution_interval_secs: default_resolution_interval(),
            align_to_wall_clock: true,
        }
    }
}

/// Persistent store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://tracker.db".to_string()
}
fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus scrape port; metrics stay in-process when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
}

/// Configuration shipped with the binary, used when no file exists
const EXAMPLE_CONFIG: &str = include_str!("../config.toml.example");

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the bundled example when the file does not exist.
    ///
    /// Parse and validation errors are returned, never replaced.
    pub fn load_or_example(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: Config = toml::from_str(&content)
                    .with_context(|| format!("invalid config {}", path.display()))?;
                config
                    .validate()
                    .with_context(|| format!("invalid config {}", path.display()))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, using bundled example");
                Self::example()
            }
            Err(e) => {
                Err(anyhow::Error::new(e).context(format!("cannot read config {}", path.display())))
            }
        }
    }

    /// The bundled example configuration
    pub fn example() -> anyhow::Result<Self> {
        let config: Config = toml::from_str(EXAMPLE_CONFIG)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engines cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.assets.is_empty() {
            anyhow::bail!("at least one [[assets]] entry is required");
        }

        let mut prefixes = HashSet::new();
        for asset in &self.assets {
            if asset.slug_prefix.trim().is_empty() {
                anyhow::bail!("asset {} has an empty slug_prefix", asset.symbol);
            }
            if !prefixes.insert(asset.slug_prefix.as_str()) {
                anyhow::bail!("duplicate slug_prefix {}", asset.slug_prefix);
            }
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.collector.max_concurrent_markets == 0 {
            anyhow::bail!("collector.max_concurrent_markets must be at least 1");
        }
        let window = self.collector.closing_window_minutes;
        if !(1..=MAX_CLOSING_WINDOW_MINUTES).contains(&window) {
            anyhow::bail!(
                "collector.closing_window_minutes must be in 1..={}, got {}",
                MAX_CLOSING_WINDOW_MINUTES,
                window
            );
        }
        let threshold = self.resolution.settlement_threshold;
        if threshold <= Decimal::new(5, 1) || threshold > Decimal::ONE {
            anyhow::bail!(
                "resolution.settlement_threshold must be in (0.5, 1], got {}",
                threshold
            );
        }

        Ok(())
    }
}
