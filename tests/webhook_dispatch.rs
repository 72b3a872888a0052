// tests/webhook_dispatch.rs
//
// Webhook delivery against a local mock endpoint: payload shape, retry
// policy, and the dispatcher's bookkeeping.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use booking_watch::dispatch::{deliver, spawn_dispatcher};
use booking_watch::notify::{HEARTBEAT_MARKER, HEARTBEAT_STATUS, TEST_MARKER, TEST_STATUS};
use booking_watch::status::SharedStatus;
use booking_watch::{NotificationDecision, Notifier, SendError, WebhookNotifier};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LINK: &str = "https://tickets.example.com/calendar";

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
}

fn notifier_for(server: &MockServer) -> WebhookNotifier {
    WebhookNotifier::new(format!("{}/trigger/museum", server.uri()), LINK.to_string())
        .with_timeout(2)
        .with_retries(3)
        .with_backoff(Duration::from_millis(10))
}

fn alert(dates: &[&str], new: &[&str]) -> NotificationDecision {
    NotificationDecision::AvailabilityAlert {
        dates: dates.iter().map(|s| d(s)).collect::<BTreeSet<_>>(),
        triggered_by: new.iter().map(|s| d(s)).collect(),
        observed_at: Instant::now(),
    }
}

async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).expect("json body"))
        .collect()
}

#[tokio::test]
async fn alert_posts_all_available_dates_and_link() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/trigger/museum"))
        .and(body_partial_json(json!({
            "value1": "2025-10-26, 2025-10-27",
            "value2": LINK,
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    notifier_for(&server)
        .send(&alert(&["2025-10-27", "2025-10-26"], &["2025-10-27"]))
        .await
        .expect("alert delivered");

    let bodies = received_bodies(&server).await;
    let stamp = bodies[0]["value3"].as_str().expect("value3 string");
    let parsed = chrono::DateTime::parse_from_rfc3339(stamp).expect("rfc3339 timestamp");
    assert!((Utc::now() - parsed.with_timezone(&Utc)).num_seconds().abs() < 60);
}

#[tokio::test]
async fn heartbeat_and_test_use_fixed_markers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let n = notifier_for(&server);
    n.send(&NotificationDecision::Heartbeat {
        observed_at: Instant::now(),
    })
    .await
    .expect("heartbeat delivered");
    n.send_test().await.expect("test delivered");

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies[0]["value1"], HEARTBEAT_MARKER);
    assert_eq!(bodies[0]["value2"], HEARTBEAT_STATUS);
    assert_eq!(bodies[1]["value1"], TEST_MARKER);
    assert_eq!(bodies[1]["value2"], TEST_STATUS);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    notifier_for(&server)
        .send(&alert(&["2025-10-26"], &["2025-10-26"]))
        .await
        .expect("third attempt succeeds");
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = notifier_for(&server)
        .send(&alert(&["2025-10-26"], &["2025-10-26"]))
        .await
        .expect_err("all attempts fail");
    match err {
        SendError::Status(code) => assert_eq!(code.as_u16(), 500),
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_endpoint_is_a_request_error() {
    // Port 9 (discard) is closed on test hosts.
    let n = WebhookNotifier::new("http://127.0.0.1:9/hook".into(), LINK.into())
        .with_timeout(1)
        .with_retries(1);
    let err = n.send_test().await.expect_err("connection refused");
    assert!(matches!(err, SendError::Request(_)), "{err:?}");
}

#[tokio::test]
async fn deliver_counts_successes_and_failures() {
    let ok = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&ok)
        .await;
    let failing = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&failing)
        .await;

    let status = SharedStatus::new(Utc::now());
    let heartbeat = NotificationDecision::Heartbeat {
        observed_at: Instant::now(),
    };

    deliver(&notifier_for(&ok), &status, &alert(&["2025-10-26"], &["2025-10-26"])).await;
    deliver(&notifier_for(&ok), &status, &heartbeat).await;
    deliver(&notifier_for(&failing), &status, &heartbeat).await;

    let view = status.snapshot();
    assert_eq!(view.alerts_sent, 1);
    assert_eq!(view.heartbeats_sent, 1);
    assert_eq!(view.send_errors, 1);
}

#[tokio::test]
async fn dispatcher_preserves_order_and_drains_on_close() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let status = SharedStatus::new(Utc::now());
    let (tx, worker) = spawn_dispatcher(Arc::new(notifier_for(&server)), status.clone(), 8);

    tx.send(alert(&["2025-10-26"], &["2025-10-26"])).await.unwrap();
    tx.send(NotificationDecision::Heartbeat {
        observed_at: Instant::now(),
    })
    .await
    .unwrap();
    tx.send(alert(&["2025-10-26", "2025-10-27"], &["2025-10-27"]))
        .await
        .unwrap();
    drop(tx);

    tokio::time::timeout(Duration::from_secs(10), worker)
        .await
        .expect("dispatcher drains")
        .expect("dispatcher task");

    let firsts: Vec<String> = received_bodies(&server)
        .await
        .iter()
        .map(|b| b["value1"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        firsts,
        vec![
            "2025-10-26".to_string(),
            HEARTBEAT_MARKER.to_string(),
            "2025-10-26, 2025-10-27".to_string(),
        ]
    );
    assert_eq!(status.snapshot().alerts_sent, 2);
}
