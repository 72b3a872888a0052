// src/config/edit.rs
//! In-place edits of the config file behind the `dates`, `webhook` and
//! `status` subcommands.
//!
//! The file is read as a plain TOML table, edited, run through the same
//! validation as [`Config::load`] and written back. Comments and key order are
//! not kept; the previous file stays next to it as `<name>.backup`.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use thiserror::Error;
use toml::{Table, Value};

use super::mask::{ifttt_parts, key_preview};
use super::{mask_sensitive_url, parse_dates, validate_http_url, Config, ConfigError};

pub const IFTTT_HOST: &str = "maker.ifttt.com";
/// Event used by `webhook set-key` when neither the flag nor the current URL
/// names one.
pub const DEFAULT_EVENT: &str = "booking_available";
/// Left in sample configs in place of a real key.
pub const KEY_PLACEHOLDER: &str = "YOUR_IFTTT_KEY";

#[derive(Debug, Error)]
pub enum EditError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("writing {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("`{0}` must be a table")]
    NotATable(&'static str),
    #[error("target_dates must be an array of \"YYYY-MM-DD\" strings")]
    TargetDatesShape,
    #[error("expected https://maker.ifttt.com/trigger/<event>/with/key/<key>")]
    IftttShape,
    #[error("webhook key must be non-empty and URL-safe")]
    InvalidKey,
    #[error("invalid event name '{0}', use letters, digits, '_' or '-'")]
    InvalidEvent(String),
}

/// Outcome of a date edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatesChange {
    /// Target dates now in the file.
    pub dates: BTreeSet<NaiveDate>,
    /// Requested dates that are already behind us.
    pub past: Vec<NaiveDate>,
    /// Dates asked to be removed that were not configured.
    pub not_found: Vec<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub dates: BTreeSet<NaiveDate>,
    pub past_dates: usize,
    /// Masked.
    pub webhook_url: String,
    /// Set, and not the sample placeholder.
    pub webhook_configured: bool,
    pub key_preview: Option<String>,
}

impl ConfigStatus {
    pub fn future_dates(&self) -> usize {
        self.dates.len() - self.past_dates
    }
}

pub struct ConfigEditor {
    path: PathBuf,
    today: NaiveDate,
}

impl ConfigEditor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            today: Local::now().date_naive(),
        }
    }

    /// Fix "today" for past-date checks.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".backup");
        self.path.with_file_name(name)
    }

    pub fn dates(&self) -> Result<BTreeSet<NaiveDate>, EditError> {
        read_dates(&self.read()?)
    }

    pub fn add_dates(&self, raw: &[String]) -> Result<DatesChange, EditError> {
        let requested = parse_dates(raw)?;
        let mut table = self.read()?;
        let mut dates = read_dates(&table)?;
        dates.extend(requested.iter().copied());
        write_dates(&mut table, &dates);
        let dates = self.save(&table, false)?;
        Ok(DatesChange {
            past: self.past(&requested),
            dates,
            not_found: Vec::new(),
        })
    }

    /// Removing the last date is allowed; the monitor refuses to start until
    /// one is added back.
    pub fn remove_dates(&self, raw: &[String]) -> Result<DatesChange, EditError> {
        let requested = parse_dates(raw)?;
        let mut table = self.read()?;
        let mut dates = read_dates(&table)?;
        let not_found = requested
            .iter()
            .filter(|d| !dates.remove(*d))
            .copied()
            .collect();
        write_dates(&mut table, &dates);
        let dates = self.save(&table, true)?;
        Ok(DatesChange {
            dates,
            past: Vec::new(),
            not_found,
        })
    }

    pub fn set_dates(&self, raw: &[String]) -> Result<DatesChange, EditError> {
        let requested = parse_dates(raw)?;
        let mut table = self.read()?;
        write_dates(&mut table, &requested);
        let dates = self.save(&table, true)?;
        Ok(DatesChange {
            past: self.past(&requested),
            dates,
            not_found: Vec::new(),
        })
    }

    pub fn clear_dates(&self) -> Result<(), EditError> {
        let mut table = self.read()?;
        write_dates(&mut table, &BTreeSet::new());
        self.save(&table, true)?;
        Ok(())
    }

    /// Any http(s) URL is accepted; one on the IFTTT host must also have
    /// the maker trigger shape with a key.
    pub fn set_webhook_url(&self, url: &str) -> Result<(), EditError> {
        let url = url.trim();
        validate_webhook_url(url)?;
        let mut table = self.read()?;
        webhook_table(&mut table)?.insert("url".into(), Value::String(url.to_string()));
        self.save(&table, true)?;
        Ok(())
    }

    /// Point the webhook at the IFTTT maker endpoint for `key`. Without an
    /// explicit event, the one in the current URL is kept. Returns the new URL.
    pub fn set_webhook_key(&self, key: &str, event: Option<&str>) -> Result<String, EditError> {
        let key = key.trim();
        if key.is_empty() || !key.chars().all(is_url_safe) {
            return Err(EditError::InvalidKey);
        }
        let mut table = self.read()?;
        let current = read_webhook_url(&table);
        let event = match event {
            Some(e) => e.trim().to_string(),
            None => ifttt_parts(&current)
                .map(|(e, _)| e.to_string())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
        };
        if event.is_empty() || !event.chars().all(is_url_safe) {
            return Err(EditError::InvalidEvent(event));
        }

        let url = format!("https://{IFTTT_HOST}/trigger/{event}/with/key/{key}");
        webhook_table(&mut table)?.insert("url".into(), Value::String(url.clone()));
        self.save(&table, true)?;
        Ok(url)
    }

    /// The webhook URL as written in the file, masked.
    pub fn webhook_url(&self) -> Result<String, EditError> {
        Ok(mask_sensitive_url(&read_webhook_url(&self.read()?)))
    }

    pub fn status(&self) -> Result<ConfigStatus, EditError> {
        if !self.path.exists() {
            return Ok(ConfigStatus {
                path: self.path.clone(),
                exists: false,
                dates: BTreeSet::new(),
                past_dates: 0,
                webhook_url: String::new(),
                webhook_configured: false,
                key_preview: None,
            });
        }
        let table = self.read()?;
        let dates = read_dates(&table)?;
        let url = read_webhook_url(&table);
        Ok(ConfigStatus {
            path: self.path.clone(),
            exists: true,
            past_dates: self.past(&dates).len(),
            dates,
            webhook_url: mask_sensitive_url(&url),
            webhook_configured: !url.is_empty() && !url.contains(KEY_PLACEHOLDER),
            key_preview: ifttt_parts(&url)
                .filter(|(_, key)| !key.is_empty())
                .map(|(_, key)| key_preview(key)),
        })
    }

    fn past(&self, dates: &BTreeSet<NaiveDate>) -> Vec<NaiveDate> {
        dates.range(..self.today).copied().collect()
    }

    fn read(&self) -> Result<Table, EditError> {
        if !self.path.exists() {
            return Err(ConfigError::NotFound(self.path.clone()).into());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(toml::from_str(&content).map_err(ConfigError::Parse)?)
    }

    /// Validate the edited document, then swap it in. The old file is copied
    /// to the backup path first.
    fn save(&self, table: &Table, allow_empty: bool) -> Result<BTreeSet<NaiveDate>, EditError> {
        let rendered = toml::to_string_pretty(table)?;
        let dates = Config::check_draft(&rendered, |k| std::env::var(k).ok())?;
        if dates.is_empty() && !allow_empty {
            return Err(ConfigError::NoTargetDates.into());
        }

        let backup = self.backup_path();
        std::fs::copy(&self.path, &backup).map_err(|source| EditError::Write {
            path: backup.clone(),
            source,
        })?;

        let mut tmp = backup.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, rendered).map_err(|source| EditError::Write {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| EditError::Write {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!(
            target: "config",
            path = %self.path.display(),
            backup = %backup.display(),
            "configuration written"
        );
        Ok(dates)
    }
}

fn validate_webhook_url(url: &str) -> Result<(), EditError> {
    validate_http_url("webhook", url)?;
    let host = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
    if host.as_deref() == Some(IFTTT_HOST) {
        match ifttt_parts(url) {
            Some((_, key)) if !key.is_empty() => {}
            _ => return Err(EditError::IftttShape),
        }
    }
    Ok(())
}

fn is_url_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn read_dates(table: &Table) -> Result<BTreeSet<NaiveDate>, EditError> {
    let raw: Vec<String> = match table.get("target_dates") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<_>>()
            .ok_or(EditError::TargetDatesShape)?,
        Some(_) => return Err(EditError::TargetDatesShape),
    };
    Ok(parse_dates(&raw)?)
}

fn write_dates(table: &mut Table, dates: &BTreeSet<NaiveDate>) {
    let items = dates
        .iter()
        .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        .collect();
    table.insert("target_dates".into(), Value::Array(items));
}

fn read_webhook_url(table: &Table) -> String {
    table
        .get("webhook")
        .and_then(|w| w.get("url"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn webhook_table(table: &mut Table) -> Result<&mut Table, EditError> {
    table
        .entry("webhook")
        .or_insert(Value::Table(Table::new()))
        .as_table_mut()
        .ok_or(EditError::NotATable("webhook"))
}
