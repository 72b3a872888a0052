// src/status.rs
//! Read-only HTTP status surface: `/health`, `/status`, `/metrics`.
//!
//! The monitor and the dispatcher publish copies into [`SharedStatus`]; the
//! server never sees tracker internals.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateStatus {
    pub date: NaiveDate,
    pub available: bool,
    /// Whether an alert has ever been sent for this date.
    pub notified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub started_at: DateTime<Utc>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_poll_ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub polls: u64,
    pub fetch_errors: u64,
    pub alerts_sent: u64,
    pub heartbeats_sent: u64,
    pub send_errors: u64,
    pub dates: Vec<DateStatus>,
}

impl StatusView {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            last_poll_at: None,
            last_poll_ok: None,
            last_error: None,
            polls: 0,
            fetch_errors: 0,
            alerts_sent: 0,
            heartbeats_sent: 0,
            send_errors: 0,
            dates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SharedStatus {
    inner: Arc<RwLock<StatusView>>,
}

impl SharedStatus {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StatusView::new(started_at))),
        }
    }

    pub fn snapshot(&self) -> StatusView {
        self.inner.read().clone()
    }

    pub fn update<F: FnOnce(&mut StatusView)>(&self, f: F) {
        f(&mut *self.inner.write());
    }
}

#[derive(Clone)]
struct StatusState {
    status: SharedStatus,
    metrics: Option<PrometheusHandle>,
}

pub fn router(status: SharedStatus, metrics: Option<PrometheusHandle>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status_view))
        .route("/metrics", get(metrics_text))
        .layer(TraceLayer::new_for_http())
        .with_state(StatusState { status, metrics })
}

async fn status_view(State(state): State<StatusState>) -> Json<StatusView> {
    Json(state.status.snapshot())
}

async fn metrics_text(State(state): State<StatusState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Bind the status listener. A taken address is a startup error.
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding status server on {addr}"))
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    tracing::info!(target: "status", addr = %listener.local_addr()?, "status server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
