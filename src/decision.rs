// src/decision.rs
//! Snapshot input and notification decision output, shared by the tracker,
//! the heartbeat scheduler and the dispatcher.
//!
//! A decision is an owned value: once produced it no longer references tracker
//! state, so the dispatcher can hold it across an `.await` while the next poll
//! cycle mutates the tracker.

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::NaiveDate;

/// Dates observed as available in one poll.
///
/// Dates not contained are treated as unavailable. Dates outside the configured
/// target set are ignored by the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    available: BTreeSet<NaiveDate>,
}

impl Snapshot {
    pub fn new(available: BTreeSet<NaiveDate>) -> Self {
        Self { available }
    }

    /// Snapshot with nothing available.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: &NaiveDate) -> bool {
        self.available.contains(date)
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    pub fn len(&self) -> usize {
        self.available.len()
    }

    pub fn dates(&self) -> &BTreeSet<NaiveDate> {
        &self.available
    }
}

impl FromIterator<NaiveDate> for Snapshot {
    fn from_iter<I: IntoIterator<Item = NaiveDate>>(iter: I) -> Self {
        Self {
            available: iter.into_iter().collect(),
        }
    }
}

/// Outcome of one tracker evaluation or heartbeat tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationDecision {
    NoAction,
    /// At least one date became eligible this cycle.
    AvailabilityAlert {
        /// Every target date available at decision time, not only the new ones.
        dates: BTreeSet<NaiveDate>,
        /// Dates whose unavailable→available edge passed the grace check.
        triggered_by: BTreeSet<NaiveDate>,
        observed_at: Instant,
    },
    Heartbeat {
        observed_at: Instant,
    },
}

impl NotificationDecision {
    /// `true` for anything the dispatcher should send.
    pub fn is_action(&self) -> bool {
        !matches!(self, NotificationDecision::NoAction)
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationDecision::NoAction => "none",
            NotificationDecision::AvailabilityAlert { .. } => "availability",
            NotificationDecision::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Format dates as `YYYY-MM-DD` joined with `", "`.
pub fn join_dates<'a, I>(dates: I) -> String
where
    I: IntoIterator<Item = &'a NaiveDate>,
{
    dates
        .into_iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
