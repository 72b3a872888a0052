// src/source/mod.rs
pub mod calendar;

use std::collections::BTreeSet;

use chrono::NaiveDate;
use thiserror::Error;

use crate::decision::Snapshot;

pub use calendar::{parse_available_dates, CalendarPageSource};

/// Why a snapshot could not be taken this cycle. Always transient from the
/// monitor's point of view: the cycle is skipped and retried on the next tick.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("calendar request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("calendar page returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("render command could not be started: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("render command exited with {status}: {stderr}")]
    Render { status: String, stderr: String },
    #[error("render command output is not UTF-8")]
    Encoding,
    #[error("calendar fetch timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("page contains no calendar cells")]
    NoCalendar,
}

/// Produces the set of target dates currently shown as bookable.
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, targets: &BTreeSet<NaiveDate>) -> Result<Snapshot, FetchError>;
    fn name(&self) -> &'static str;
}
