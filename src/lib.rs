// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod app;
pub mod cli;
pub mod config;
pub mod decision;
pub mod dispatch;
pub mod heartbeat;
pub mod logging;
pub mod manage;
pub mod metrics;
pub mod monitor;
pub mod notify;
pub mod source;
pub mod status;
pub mod tracker;

// ---- Re-exports for stable public API ----
pub use crate::config::{Config, ConfigEditor, ConfigError};
pub use crate::decision::{NotificationDecision, Snapshot};
pub use crate::heartbeat::HeartbeatScheduler;
pub use crate::monitor::Monitor;
pub use crate::notify::{Notifier, SendError, WebhookNotifier};
pub use crate::source::{CalendarPageSource, FetchError, SnapshotSource};
pub use crate::tracker::{AvailabilityTracker, DateRecord};
