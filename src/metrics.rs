use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const POLLS_TOTAL: &str = "booking_watch_polls_total";
pub const FETCH_ERRORS_TOTAL: &str = "booking_watch_fetch_errors_total";
pub const ALERTS_TOTAL: &str = "booking_watch_alerts_total";
pub const HEARTBEATS_TOTAL: &str = "booking_watch_heartbeats_total";
pub const SEND_ERRORS_TOTAL: &str = "booking_watch_send_errors_total";
pub const DROPPED_DECISIONS_TOTAL: &str = "booking_watch_dropped_decisions_total";
pub const AVAILABLE_DATES: &str = "booking_watch_available_dates";
pub const LAST_POLL_TS: &str = "booking_watch_last_poll_ts";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(POLLS_TOTAL, "Poll cycles that produced a snapshot.");
        describe_counter!(FETCH_ERRORS_TOTAL, "Poll cycles skipped because the snapshot failed.");
        describe_counter!(ALERTS_TOTAL, "Availability alerts delivered.");
        describe_counter!(HEARTBEATS_TOTAL, "Heartbeats delivered.");
        describe_counter!(SEND_ERRORS_TOTAL, "Notifications that failed after all retries.");
        describe_counter!(
            DROPPED_DECISIONS_TOTAL,
            "Decisions dropped because the dispatch queue was full."
        );
        describe_gauge!(AVAILABLE_DATES, "Target dates available in the last snapshot.");
        describe_gauge!(LAST_POLL_TS, "Unix ts of the last successful poll.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder as the global `metrics` recorder.
    pub fn init() -> anyhow::Result<Self> {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder)
            .map_err(|_| anyhow::anyhow!("prometheus: a global recorder is already installed"))?;
        ensure_metrics_described();
        Ok(Self { handle })
    }
}
