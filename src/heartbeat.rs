// src/heartbeat.rs
use std::time::{Duration, Instant};

use crate::decision::NotificationDecision;

/// Liveness timer ticked once per poll cycle.
///
/// The first heartbeat is due one full interval after construction, never on
/// the first tick.
#[derive(Debug, Clone)]
pub struct HeartbeatScheduler {
    enabled: bool,
    interval: Duration,
    started_at: Instant,
    last_fired_at: Option<Instant>,
}

impl HeartbeatScheduler {
    pub fn new(enabled: bool, interval: Duration, started_at: Instant) -> Self {
        Self {
            enabled,
            interval,
            started_at,
            last_fired_at: None,
        }
    }

    /// Scheduler that never fires.
    pub fn disabled(started_at: Instant) -> Self {
        Self::new(false, Duration::ZERO, started_at)
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.interval.is_zero()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_fired_at(&self) -> Option<Instant> {
        self.last_fired_at
    }

    pub fn tick(&mut self, now: Instant) -> NotificationDecision {
        if !self.is_active() {
            return NotificationDecision::NoAction;
        }

        let anchor = self.last_fired_at.unwrap_or(self.started_at);
        if now.saturating_duration_since(anchor) >= self.interval {
            self.last_fired_at = Some(now);
            NotificationDecision::Heartbeat { observed_at: now }
        } else {
            NotificationDecision::NoAction
        }
    }
}
