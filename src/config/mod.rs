// src/config/mod.rs
//! Typed configuration loaded once from TOML and validated up front.
//!
//! Lookup order for the file: `--config`, then `$BOOKING_WATCH_CONFIG`, then
//! `config.toml` in the working directory. `LOG_LEVEL` and `WEBHOOK_URL`
//! override the file so secrets can stay in the environment.

pub mod edit;
pub mod mask;
pub mod reload;

use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

pub use edit::{ConfigEditor, ConfigStatus, DatesChange, EditError};
pub use mask::mask_sensitive_url;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const ENV_CONFIG_PATH: &str = "BOOKING_WATCH_CONFIG";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_WEBHOOK_URL: &str = "WEBHOOK_URL";

pub const DEFAULT_WEBSITE_URL: &str = "https://museum-tickets.nintendo.com/en/calendar";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("at least one target date must be specified")]
    NoTargetDates,
    #[error("invalid date '{0}', use YYYY-MM-DD")]
    InvalidDate(String),
    #[error("{field} must be at least {min}")]
    TooSmall { field: &'static str, min: u64 },
    #[error("invalid {field} URL: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
    #[error("invalid logging level '{0}', expected one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),
    #[error("website.availability_class must not be empty")]
    EmptyAvailabilityClass,
}

fn default_poll_interval() -> u64 {
    10
}
fn default_grace_period() -> u64 {
    300
}
fn default_true() -> bool {
    true
}
fn default_heartbeat_hours() -> u64 {
    24
}
fn default_timeout() -> u64 {
    30
}
fn default_max_retries() -> u8 {
    3
}
fn default_website_url() -> String {
    DEFAULT_WEBSITE_URL.to_string()
}
fn default_availability_class() -> String {
    "sale".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9187))
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_seconds: u64,
    /// Suppression window after a notification, per date.
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,
    /// Re-read `target_dates` when the file changes.
    #[serde(default)]
    pub watch_config: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_poll_interval(),
            grace_period_seconds: default_grace_period(),
            watch_config: false,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 0 disables the heartbeat.
    #[serde(default = "default_heartbeat_hours")]
    pub interval_hours: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: default_heartbeat_hours(),
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }

    pub fn is_active(&self) -> bool {
        self.enabled && self.interval_hours > 0
    }
}

#[derive(Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Attempts per decision, including the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    #[serde(default = "default_true")]
    pub test_on_startup: bool,
}

// Hand-written so the webhook key never lands in a log line.
impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("url", &mask_sensitive_url(&self.url))
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .field("test_on_startup", &self.test_on_startup)
            .finish()
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebsiteConfig {
    #[serde(default = "default_website_url")]
    pub url: String,
    /// Class name that marks a bookable day inside a calendar cell.
    #[serde(default = "default_availability_class")]
    pub availability_class: String,
    #[serde(default = "default_timeout")]
    pub fetch_timeout_seconds: u64,
    /// Optional renderer, e.g. a headless browser with `--dump-dom`.
    /// `{url}` in any element, program included, is replaced by the website URL.
    #[serde(default)]
    pub render_command: Vec<String>,
}

impl Default for WebsiteConfig {
    fn default() -> Self {
        Self {
            url: default_website_url(),
            availability_class: default_availability_class(),
            fetch_timeout_seconds: default_timeout(),
            render_command: Vec::new(),
        }
    }
}

impl WebsiteConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Normalized to a `tracing` level name during validation.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_bind(),
        }
    }
}

/// File shape before validation.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    target_dates: Vec<String>,
    #[serde(default)]
    polling: PollingConfig,
    #[serde(default)]
    heartbeat: HeartbeatConfig,
    webhook: WebhookConfig,
    #[serde(default)]
    website: WebsiteConfig,
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Deduplicated, ascending.
    pub target_dates: BTreeSet<NaiveDate>,
    pub polling: PollingConfig,
    pub heartbeat: HeartbeatConfig,
    pub webhook: WebhookConfig,
    pub website: WebsiteConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Resolve the config path: explicit argument, then env var, then default.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Read, apply process-env overrides, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str_with(&content, |k| std::env::var(k).ok())
    }

    /// Parse and validate without consulting the environment.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Self::from_toml_str_with(s, |_| None)
    }

    /// Parse, apply overrides from `env`, validate.
    pub fn from_toml_str_with<F>(s: &str, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut raw: RawConfig = toml::from_str(s)?;
        raw.apply_env(env);
        raw.validate()
    }

    /// Like [`Config::from_toml_str_with`], but an empty date list passes.
    /// Returns the parsed dates.
    pub(crate) fn check_draft<F>(s: &str, env: F) -> Result<BTreeSet<NaiveDate>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut raw: RawConfig = toml::from_str(s)?;
        raw.apply_env(env);
        let dates = parse_dates(&raw.target_dates)?;
        raw.validate_settings(dates).map(|cfg| cfg.target_dates)
    }
}

impl RawConfig {
    fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = env(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            self.logging.level = level;
        }
        if let Some(url) = env(ENV_WEBHOOK_URL).filter(|v| !v.trim().is_empty()) {
            self.webhook.url = url;
        }
    }

    fn validate(self) -> Result<Config, ConfigError> {
        let target_dates = parse_target_dates(&self.target_dates)?;
        self.validate_settings(target_dates)
    }

    fn validate_settings(
        mut self,
        target_dates: BTreeSet<NaiveDate>,
    ) -> Result<Config, ConfigError> {
        if self.polling.interval_seconds < 1 {
            return Err(ConfigError::TooSmall {
                field: "polling.interval_seconds",
                min: 1,
            });
        }
        if self.webhook.timeout_seconds < 1 {
            return Err(ConfigError::TooSmall {
                field: "webhook.timeout_seconds",
                min: 1,
            });
        }
        if self.webhook.max_retries < 1 {
            return Err(ConfigError::TooSmall {
                field: "webhook.max_retries",
                min: 1,
            });
        }
        if self.website.fetch_timeout_seconds < 1 {
            return Err(ConfigError::TooSmall {
                field: "website.fetch_timeout_seconds",
                min: 1,
            });
        }

        self.webhook.url = self.webhook.url.trim().to_string();
        validate_http_url("webhook", &self.webhook.url)?;
        validate_http_url("website", &self.website.url)?;

        self.website.availability_class = self.website.availability_class.trim().to_string();
        if self.website.availability_class.is_empty() {
            return Err(ConfigError::EmptyAvailabilityClass);
        }

        self.logging.level = normalize_log_level(&self.logging.level)?;

        Ok(Config {
            target_dates,
            polling: self.polling,
            heartbeat: self.heartbeat,
            webhook: self.webhook,
            website: self.website,
            logging: self.logging,
            server: self.server,
        })
    }
}

/// Strict `YYYY-MM-DD`, real calendar dates, deduplicated. At least one.
pub fn parse_target_dates(raw: &[String]) -> Result<BTreeSet<NaiveDate>, ConfigError> {
    let out = parse_dates(raw)?;
    if out.is_empty() {
        return Err(ConfigError::NoTargetDates);
    }
    Ok(out)
}

/// Same rules as [`parse_target_dates`]; an empty input gives an empty set.
pub fn parse_dates(raw: &[String]) -> Result<BTreeSet<NaiveDate>, ConfigError> {
    static RE_DATE: OnceCell<Regex> = OnceCell::new();
    let re = RE_DATE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date regex"));

    let mut out = BTreeSet::new();
    for item in raw {
        let s = item.trim();
        if !re.is_match(s) {
            return Err(ConfigError::InvalidDate(item.clone()));
        }
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| ConfigError::InvalidDate(item.clone()))?;
        out.insert(date);
    }
    Ok(out)
}

pub(crate) fn validate_http_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    if url.is_empty() {
        return Err(ConfigError::InvalidUrl {
            field,
            reason: "must not be empty".into(),
        });
    }
    let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidUrl {
            field,
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

fn normalize_log_level(level: &str) -> Result<String, ConfigError> {
    let norm = match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        _ => return Err(ConfigError::InvalidLogLevel(level.to_string())),
    };
    Ok(norm.to_string())
}
