// src/monitor.rs
//! Poll loop: snapshot, tracker, heartbeat, hand-off.
//!
//! One cycle runs at a time. Decisions are handed to the dispatcher queue in
//! the order availability alert, then heartbeat. A failed snapshot skips the
//! whole cycle, heartbeat included, and leaves tracker state untouched.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use metrics::{counter, gauge};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::decision::{join_dates, NotificationDecision, Snapshot};
use crate::heartbeat::HeartbeatScheduler;
use crate::metrics::{
    AVAILABLE_DATES, DROPPED_DECISIONS_TOTAL, FETCH_ERRORS_TOTAL, LAST_POLL_TS, POLLS_TOTAL,
};
use crate::source::{FetchError, SnapshotSource};
use crate::status::{DateStatus, SharedStatus};
use crate::tracker::AvailabilityTracker;

pub struct Monitor<S> {
    source: S,
    tracker: AvailabilityTracker,
    heartbeat: HeartbeatScheduler,
    interval: Duration,
    outbox: mpsc::Sender<NotificationDecision>,
    status: SharedStatus,
    target_updates: Option<watch::Receiver<BTreeSet<NaiveDate>>>,
}

impl<S: SnapshotSource> Monitor<S> {
    pub fn new(
        source: S,
        tracker: AvailabilityTracker,
        heartbeat: HeartbeatScheduler,
        interval: Duration,
        outbox: mpsc::Sender<NotificationDecision>,
        status: SharedStatus,
    ) -> Self {
        let monitor = Self {
            source,
            tracker,
            heartbeat,
            interval,
            outbox,
            status,
            target_updates: None,
        };
        monitor.publish_dates();
        monitor
    }

    /// Build tracker and heartbeat from config. `started_at` anchors the
    /// first heartbeat.
    pub fn from_config(
        cfg: &Config,
        source: S,
        outbox: mpsc::Sender<NotificationDecision>,
        status: SharedStatus,
        started_at: Instant,
    ) -> Self {
        let tracker =
            AvailabilityTracker::new(cfg.target_dates.iter().copied(), cfg.polling.grace_period());
        let heartbeat = HeartbeatScheduler::new(
            cfg.heartbeat.enabled,
            cfg.heartbeat.interval(),
            started_at,
        );
        Self::new(
            source,
            tracker,
            heartbeat,
            cfg.polling.interval(),
            outbox,
            status,
        )
    }

    /// Receive replacement target sets; applied between cycles.
    pub fn with_target_updates(mut self, rx: watch::Receiver<BTreeSet<NaiveDate>>) -> Self {
        self.target_updates = Some(rx);
        self
    }

    pub fn tracker(&self) -> &AvailabilityTracker {
        &self.tracker
    }

    pub fn heartbeat(&self) -> &HeartbeatScheduler {
        &self.heartbeat
    }

    /// Apply one fetch outcome to tracker and heartbeat and return the
    /// decisions that need sending, alert first.
    pub fn fold(
        &mut self,
        outcome: Result<Snapshot, FetchError>,
        now: Instant,
    ) -> Vec<NotificationDecision> {
        let snapshot = match outcome {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    target: "poller",
                    source = self.source.name(),
                    error = %e,
                    "snapshot failed, skipping cycle"
                );
                counter!(FETCH_ERRORS_TOTAL).increment(1);
                let msg = e.to_string();
                self.status.update(|v| {
                    v.fetch_errors += 1;
                    v.last_poll_at = Some(Utc::now());
                    v.last_poll_ok = Some(false);
                    v.last_error = Some(msg);
                });
                return Vec::new();
            }
        };

        tracing::debug!(
            target: "poller",
            available = %join_dates(snapshot.dates()),
            "snapshot taken"
        );

        let mut out = Vec::with_capacity(2);

        let alert = self.tracker.evaluate(&snapshot, now);
        if let NotificationDecision::AvailabilityAlert {
            dates,
            triggered_by,
            ..
        } = &alert
        {
            tracing::info!(
                target: "poller",
                dates = %join_dates(dates),
                new = %join_dates(triggered_by),
                "availability alert"
            );
        }
        if alert.is_action() {
            out.push(alert);
        }

        let beat = self.heartbeat.tick(now);
        if beat.is_action() {
            tracing::info!(target: "poller", "heartbeat due");
            out.push(beat);
        }

        counter!(POLLS_TOTAL).increment(1);
        gauge!(AVAILABLE_DATES).set(self.tracker.available().len() as f64);
        gauge!(LAST_POLL_TS).set(Utc::now().timestamp() as f64);
        self.status.update(|v| {
            v.polls += 1;
            v.last_poll_at = Some(Utc::now());
            v.last_poll_ok = Some(true);
            v.last_error = None;
        });
        self.publish_dates();

        out
    }

    /// One full cycle without dispatching. `now` is read once the fetch has
    /// completed.
    pub async fn poll_once(&mut self) -> Vec<NotificationDecision> {
        let targets = self.tracker.targets();
        let outcome = self.source.fetch(&targets).await;
        let now = tokio::time::Instant::now().into_std();
        self.fold(outcome, now)
    }

    /// Poll every `interval` until `shutdown` resolves. An in-flight fetch is
    /// abandoned on shutdown and its cycle has no effect.
    ///
    /// Returns the number of decisions still waiting in the dispatch queue.
    pub async fn run<F>(mut self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            target: "poller",
            source = self.source.name(),
            interval_secs = self.interval.as_secs(),
            grace_secs = self.tracker.grace_period().as_secs(),
            heartbeat = self.heartbeat.is_active(),
            "monitor started"
        );

        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            self.apply_target_updates();

            let targets = self.tracker.targets();
            let outcome = tokio::select! {
                _ = &mut shutdown => break,
                res = self.source.fetch(&targets) => res,
            };
            let now = tokio::time::Instant::now().into_std();

            let decisions = self.fold(outcome, now);
            self.dispatch(decisions);
        }

        let pending = self.outbox.max_capacity() - self.outbox.capacity();
        tracing::info!(target: "poller", pending, "monitor stopped");
        pending
    }

    /// Queue without waiting. A full queue drops the decision; tracker state
    /// is not rolled back.
    fn dispatch(&self, decisions: Vec<NotificationDecision>) {
        for decision in decisions {
            let kind = decision.kind();
            match self.outbox.try_send(decision) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(target: "poller", kind, "dispatch queue full, dropping");
                    counter!(DROPPED_DECISIONS_TOTAL).increment(1);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!(target: "poller", kind, "dispatcher gone, dropping");
                    counter!(DROPPED_DECISIONS_TOTAL).increment(1);
                }
            }
        }
    }

    fn apply_target_updates(&mut self) {
        let Some(rx) = self.target_updates.as_mut() else {
            return;
        };
        match rx.has_changed() {
            Ok(true) => {}
            Ok(false) => return,
            Err(_) => {
                // watcher is gone; keep the current targets
                self.target_updates = None;
                return;
            }
        }
        let targets = rx.borrow_and_update().clone();
        if targets == self.tracker.targets() {
            return;
        }
        tracing::info!(
            target: "poller",
            dates = %join_dates(&targets),
            "target dates updated"
        );
        self.tracker.set_targets(targets);
        self.publish_dates();
    }

    fn publish_dates(&self) {
        let dates: Vec<DateStatus> = self
            .tracker
            .records()
            .map(|(date, rec)| DateStatus {
                date: *date,
                available: rec.currently_available,
                notified: rec.last_notified_at.is_some(),
            })
            .collect();
        self.status.update(|v| v.dates = dates);
    }
}
