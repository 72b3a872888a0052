pub mod webhook;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::decision::{join_dates, NotificationDecision};

pub use webhook::WebhookNotifier;

pub const HEARTBEAT_MARKER: &str = "HEARTBEAT - booking-watch";
pub const HEARTBEAT_STATUS: &str = "Monitor is running";
pub const TEST_MARKER: &str = "TEST - booking-watch";
pub const TEST_STATUS: &str = "This is a test notification";

#[derive(Debug, Error)]
pub enum SendError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("nothing to send for a no-action decision")]
    NothingToSend,
}

/// Delivers one decision. Retry and timeout policy belong to the implementor.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, decision: &NotificationDecision) -> Result<(), SendError>;
}

/// IFTTT-style body: three free-form values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub value1: String,
    pub value2: String,
    pub value3: String,
}

impl WebhookPayload {
    /// `None` for `NoAction`.
    pub fn for_decision(
        decision: &NotificationDecision,
        link: &str,
        at: DateTime<Utc>,
    ) -> Option<Self> {
        match decision {
            NotificationDecision::NoAction => None,
            NotificationDecision::AvailabilityAlert { dates, .. } => Some(Self {
                value1: join_dates(dates),
                value2: link.to_string(),
                value3: iso(at),
            }),
            NotificationDecision::Heartbeat { .. } => Some(Self {
                value1: HEARTBEAT_MARKER.to_string(),
                value2: HEARTBEAT_STATUS.to_string(),
                value3: iso(at),
            }),
        }
    }

    pub fn test(at: DateTime<Utc>) -> Self {
        Self {
            value1: TEST_MARKER.to_string(),
            value2: TEST_STATUS.to_string(),
            value3: iso(at),
        }
    }
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use std::time::Instant;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 26, 9, 0, 0).unwrap()
    }

    #[test]
    fn alert_payload_lists_all_dates() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let decision = NotificationDecision::AvailabilityAlert {
            dates: [d("2025-10-27"), d("2025-10-26")].into_iter().collect(),
            triggered_by: [d("2025-10-27")].into_iter().collect(),
            observed_at: Instant::now(),
        };
        let p = WebhookPayload::for_decision(&decision, "https://example.com/cal", at()).unwrap();
        assert_eq!(p.value1, "2025-10-26, 2025-10-27");
        assert_eq!(p.value2, "https://example.com/cal");
        assert_eq!(p.value3, "2025-10-26T09:00:00Z");
    }

    #[test]
    fn heartbeat_and_test_payloads_are_fixed() {
        let hb = NotificationDecision::Heartbeat {
            observed_at: Instant::now(),
        };
        let p = WebhookPayload::for_decision(&hb, "https://example.com/cal", at()).unwrap();
        assert_eq!(p.value1, HEARTBEAT_MARKER);
        assert_eq!(p.value2, HEARTBEAT_STATUS);

        let t = WebhookPayload::test(at());
        assert_eq!(t.value1, TEST_MARKER);
        assert_eq!(t.value3, "2025-10-26T09:00:00Z");

        assert!(
            WebhookPayload::for_decision(&NotificationDecision::NoAction, "x", at()).is_none()
        );
    }
}
