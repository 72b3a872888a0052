// src/tracker.rs
//! Per-date availability state machine with grace-period suppression.
//!
//! Eligibility is edge-triggered: only an unavailable→available transition is
//! checked against the grace window, and the window is anchored to the last
//! notification for that date, not to the last transition. A date that stays
//! available never re-triggers, no matter how much time passes.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use crate::decision::{NotificationDecision, Snapshot};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(300);

/// State kept for one target date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRecord {
    pub currently_available: bool,
    /// Set only by an eligible transition; never cleared.
    pub last_notified_at: Option<Instant>,
}

impl DateRecord {
    /// Grace check for a fresh unavailable→available edge at `now`.
    fn eligible_at(&self, now: Instant, grace: Duration) -> bool {
        match self.last_notified_at {
            None => true,
            Some(ts) => now.saturating_duration_since(ts) >= grace,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AvailabilityTracker {
    grace_period: Duration,
    records: BTreeMap<NaiveDate, DateRecord>,
}

impl AvailabilityTracker {
    pub fn new<I>(targets: I, grace_period: Duration) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let records = targets
            .into_iter()
            .map(|d| (d, DateRecord::default()))
            .collect();
        Self {
            grace_period,
            records,
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Configured target dates, ascending.
    pub fn targets(&self) -> BTreeSet<NaiveDate> {
        self.records.keys().copied().collect()
    }

    /// Target dates seen available in the last evaluated snapshot.
    pub fn available(&self) -> BTreeSet<NaiveDate> {
        self.records
            .iter()
            .filter(|(_, r)| r.currently_available)
            .map(|(d, _)| *d)
            .collect()
    }

    pub fn record(&self, date: &NaiveDate) -> Option<&DateRecord> {
        self.records.get(date)
    }

    pub fn records(&self) -> impl Iterator<Item = (&NaiveDate, &DateRecord)> {
        self.records.iter()
    }

    /// Replace the target set between cycles.
    ///
    /// Retained dates keep their history, new dates start with none, removed
    /// dates are forgotten.
    pub fn set_targets<I>(&mut self, targets: I)
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let wanted: BTreeSet<NaiveDate> = targets.into_iter().collect();
        self.records.retain(|d, _| wanted.contains(d));
        for d in wanted {
            self.records.entry(d).or_default();
        }
    }

    /// Fold one snapshot into the store and decide whether to alert.
    pub fn evaluate(&mut self, snapshot: &Snapshot, now: Instant) -> NotificationDecision {
        let mut available = BTreeSet::new();
        let mut eligible = BTreeSet::new();

        for (date, rec) in self.records.iter_mut() {
            let observed = snapshot.contains(date);

            if observed && !rec.currently_available {
                if rec.eligible_at(now, self.grace_period) {
                    rec.last_notified_at = Some(now);
                    eligible.insert(*date);
                } else {
                    tracing::debug!(
                        target: "tracker",
                        date = %date,
                        "date reappeared inside grace period, suppressed"
                    );
                }
            }

            rec.currently_available = observed;
            if observed {
                available.insert(*date);
            }
        }

        if eligible.is_empty() {
            NotificationDecision::NoAction
        } else {
            NotificationDecision::AvailabilityAlert {
                dates: available,
                triggered_by: eligible,
                observed_at: now,
            }
        }
    }
}
