//! Configuration module for feedfun.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::digest::OutputMode;
use crate::{FeedError, Result};

/// Store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite store file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Records published longer ago than this are pruned.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

fn default_db_path() -> String {
    "data/feedfun.db".to_string()
}

fn default_retention() -> u64 {
    30 * 24 * 3600 // 30 days
}

/// Whole seconds as a chrono duration, saturating at the largest span chrono holds.
fn chrono_seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

impl DatabaseConfig {
    /// Retention window as a chrono duration.
    pub fn retention(&self) -> chrono::Duration {
        chrono_seconds(self.retention_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            retention_secs: default_retention(),
        }
    }
}

/// Feed fetching configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
    /// Path to the OPML subscription list.
    #[serde(default = "default_opml")]
    pub opml: String,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Maximum number of feeds fetched at once (0 = one task per feed, no cap).
    #[serde(default)]
    pub max_concurrent_fetches: usize,
}

fn default_opml() -> String {
    "feeds.opml".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            opml: default_opml(),
            connect_timeout_secs: default_connect_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            max_feed_size_bytes: default_max_feed_size(),
            max_concurrent_fetches: 0,
        }
    }
}

/// Summary generation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryConfig {
    /// Whether new items get a generated summary.
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of the Ollama-compatible endpoint.
    #[serde(default = "default_summary_endpoint")]
    pub endpoint: String,
    /// Model name passed to the endpoint.
    #[serde(default = "default_summary_model")]
    pub model: String,
    /// Upper bound for a single summary call in seconds.
    #[serde(default = "default_summary_timeout")]
    pub timeout_secs: u64,
    /// Only items published within this window are summarized.
    #[serde(default = "default_recency_window")]
    pub recency_window_secs: u64,
}

fn default_summary_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_summary_model() -> String {
    "phi3:medium".to_string()
}

fn default_summary_timeout() -> u64 {
    60
}

fn default_recency_window() -> u64 {
    48 * 3600
}

impl SummaryConfig {
    /// Timeout for one summary call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Recency window as a chrono duration.
    pub fn recency_window(&self) -> chrono::Duration {
        chrono_seconds(self.recency_window_secs)
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_summary_endpoint(),
            model: default_summary_model(),
            timeout_secs: default_summary_timeout(),
            recency_window_secs: default_recency_window(),
        }
    }
}

/// Digest output configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DigestConfig {
    /// Output format.
    #[serde(default)]
    pub mode: OutputMode,
    /// Only items published within this many seconds are listed (0 = all).
    #[serde(default = "default_digest_max_age")]
    pub max_age_secs: u64,
    /// Directory the digest file is written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_digest_max_age() -> u64 {
    48 * 3600 // 2 days
}

fn default_output_dir() -> String {
    ".".to_string()
}

impl DigestConfig {
    /// Maximum item age as a chrono duration.
    pub fn max_age(&self) -> chrono::Duration {
        chrono_seconds(self.max_age_secs)
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::default(),
            max_age_secs: default_digest_max_age(),
            output_dir: default_output_dir(),
        }
    }
}

/// HTTP daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Host address to bind.
    #[serde(default = "default_daemon_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_daemon_port")]
    pub port: u16,
    /// Seconds between feed refreshes.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

fn default_daemon_host() -> String {
    "0.0.0.0".to_string()
}

fn default_daemon_port() -> u16 {
    8173
}

fn default_refresh_interval() -> u64 {
    3600 // 1 hour
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_daemon_host(),
            port: default_daemon_port(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/feedfun.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Store configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Feed fetching configuration.
    #[serde(default)]
    pub feeds: FeedsConfig,
    /// Summary configuration.
    #[serde(default)]
    pub summary: SummaryConfig,
    /// Digest configuration.
    #[serde(default)]
    pub digest: DigestConfig,
    /// Daemon configuration.
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FeedError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FeedError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FEEDFUN_DB_PATH`: Override the store path
    /// - `FEEDFUN_OPML`: Override the subscription list path
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FEEDFUN_DB_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(opml) = std::env::var("FEEDFUN_OPML") {
            if !opml.is_empty() {
                self.feeds.opml = opml;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - Summaries are enabled with a zero timeout
    /// - The refresh interval is zero
    /// - The retention window is zero
    pub fn validate(&self) -> Result<()> {
        if self.summary.enabled && self.summary.timeout_secs == 0 {
            return Err(FeedError::Config(
                "summary.timeout_secs must be greater than zero when summaries are enabled"
                    .to_string(),
            ));
        }
        if self.daemon.refresh_interval_secs == 0 {
            return Err(FeedError::Config(
                "daemon.refresh_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.database.retention_secs == 0 {
            return Err(FeedError::Config(
                "database.retention_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
