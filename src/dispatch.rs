// src/dispatch.rs
//! Background delivery of decisions, in the order the monitor produced them.
//!
//! The monitor hands decisions over a bounded channel and never waits for the
//! webhook, so a slow or failing target cannot delay the next poll.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::decision::NotificationDecision;
use crate::metrics::{ALERTS_TOTAL, HEARTBEATS_TOTAL, SEND_ERRORS_TOTAL};
use crate::notify::Notifier;
use crate::status::SharedStatus;

pub const DISPATCH_QUEUE: usize = 32;

/// Spawn the delivery task. It stops after every sender is dropped and the
/// queue is drained.
pub fn spawn_dispatcher<N>(
    notifier: Arc<N>,
    status: SharedStatus,
    queue: usize,
) -> (mpsc::Sender<NotificationDecision>, JoinHandle<()>)
where
    N: Notifier + ?Sized + 'static,
{
    let (tx, mut rx) = mpsc::channel::<NotificationDecision>(queue.max(1));
    let handle = tokio::spawn(async move {
        while let Some(decision) = rx.recv().await {
            deliver(notifier.as_ref(), &status, &decision).await;
        }
        tracing::debug!(target: "notify", "dispatch queue drained");
    });
    (tx, handle)
}

/// Send once and record the outcome. Failures are not retried here; the
/// notifier's own retry policy is the only one.
pub async fn deliver<N>(notifier: &N, status: &SharedStatus, decision: &NotificationDecision)
where
    N: Notifier + ?Sized,
{
    let kind = decision.kind();
    match notifier.send(decision).await {
        Ok(()) => {
            tracing::info!(target: "notify", kind, "notification sent");
            match decision {
                NotificationDecision::AvailabilityAlert { .. } => {
                    counter!(ALERTS_TOTAL).increment(1);
                    status.update(|v| v.alerts_sent += 1);
                }
                NotificationDecision::Heartbeat { .. } => {
                    counter!(HEARTBEATS_TOTAL).increment(1);
                    status.update(|v| v.heartbeats_sent += 1);
                }
                NotificationDecision::NoAction => {}
            }
        }
        Err(e) => {
            tracing::error!(target: "notify", kind, error = %e, "notification failed");
            counter!(SEND_ERRORS_TOTAL).increment(1);
            status.update(|v| v.send_errors += 1);
        }
    }
}
