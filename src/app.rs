// src/app.rs
//! Process wiring: config, logging, one-shot modes, config subcommands, and
//! the long-running monitor with its dispatcher, status server and config
//! watcher.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use tokio::sync::watch;

use crate::cli::Args;
use crate::config::{mask_sensitive_url, reload, Config, ConfigEditor};
use crate::decision::{join_dates, Snapshot};
use crate::dispatch::{spawn_dispatcher, DISPATCH_QUEUE};
use crate::metrics::Metrics;
use crate::monitor::Monitor;
use crate::notify::WebhookNotifier;
use crate::source::{CalendarPageSource, SnapshotSource};
use crate::status::{self, SharedStatus};

/// Extra time granted to the dispatcher on top of the worst-case sends.
const DRAIN_SLACK: Duration = Duration::from_secs(1);

pub async fn run(args: Args) -> anyhow::Result<()> {
    let path = Config::resolve_path(args.config.clone());

    // Subcommands edit the file, which may not pass full validation yet.
    if let Some(command) = args.command {
        let editor = ConfigEditor::new(path);
        return crate::manage::run(
            &editor,
            command,
            &mut std::io::stdout(),
            &mut std::io::stderr(),
        );
    }

    let config =
        Config::load(&path).with_context(|| format!("loading config {}", path.display()))?;
    let _log_guard = crate::logging::init(&config.logging)?;

    if args.check_once {
        let source = match &args.fixture {
            Some(file) => {
                let html = std::fs::read_to_string(file)
                    .with_context(|| format!("reading fixture {}", file.display()))?;
                CalendarPageSource::from_fixture(html, config.website.availability_class.clone())
            }
            None => CalendarPageSource::from_config(&config.website)
                .context("building calendar client")?,
        };
        check_once(&source, &config.target_dates, &mut std::io::stdout())
            .await
            .with_context(|| format!("checking {}", config.website.url))?;
        return Ok(());
    }
    if args.test_webhook {
        let notifier = WebhookNotifier::from_config(&config);
        return test_webhook(&notifier, &config.webhook.url, &mut std::io::stdout()).await;
    }
    run_monitor(config, path).await
}

/// Take one snapshot and print it. Nothing is sent.
pub async fn check_once<S, W>(
    source: &S,
    targets: &BTreeSet<NaiveDate>,
    out: &mut W,
) -> anyhow::Result<Snapshot>
where
    S: SnapshotSource + ?Sized,
    W: Write,
{
    let snapshot = source.fetch(targets).await?;
    writeln!(out, "Checked {} target date(s)", targets.len())?;
    if snapshot.is_empty() {
        writeln!(out, "No target dates available")?;
    } else {
        writeln!(out, "Available: {}", join_dates(snapshot.dates()))?;
    }
    Ok(snapshot)
}

/// Send the test payload once; any failure is an error.
pub async fn test_webhook<W: Write>(
    notifier: &WebhookNotifier,
    url: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    let masked = mask_sensitive_url(url);
    notifier
        .send_test()
        .await
        .with_context(|| format!("test notification to {masked} failed"))?;
    writeln!(out, "Test notification sent to {masked}")?;
    Ok(())
}

/// Startup variant of [`test_webhook`]: a failure is only logged.
pub async fn startup_test(notifier: &WebhookNotifier) -> bool {
    match notifier.send_test().await {
        Ok(()) => {
            tracing::info!("startup test notification sent");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "startup test notification failed");
            false
        }
    }
}

/// Time the dispatcher gets to flush `pending` queued decisions plus the one
/// it may be sending.
pub fn drain_budget(per_send: Duration, pending: usize) -> Duration {
    let sends = u32::try_from(pending.saturating_add(1)).unwrap_or(u32::MAX);
    per_send.saturating_mul(sends).saturating_add(DRAIN_SLACK)
}

async fn run_monitor(config: Config, path: PathBuf) -> anyhow::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        "booking-watch starting"
    );
    tracing::info!(
        dates = %join_dates(&config.target_dates),
        website = %config.website.url,
        "monitoring target dates"
    );
    tracing::info!(
        webhook = %mask_sensitive_url(&config.webhook.url),
        timeout_secs = config.webhook.timeout_seconds,
        max_retries = config.webhook.max_retries,
        "webhook configured"
    );

    let notifier = Arc::new(WebhookNotifier::from_config(&config));
    if config.webhook.test_on_startup {
        startup_test(&notifier).await;
    }

    let status = SharedStatus::new(Utc::now());
    let (stop_tx, stop_rx) = watch::channel(false);

    let server = if config.server.enabled {
        let listener = status::bind(config.server.bind).await?;
        let metrics = Metrics::init()?;
        let app = status::router(status.clone(), Some(metrics.handle));
        let mut rx = stop_rx.clone();
        let shutdown = async move {
            let _ = rx.wait_for(|stop| *stop).await;
        };
        Some(tokio::spawn(async move {
            let res = status::serve(listener, app, shutdown).await;
            if let Err(e) = &res {
                tracing::error!(target: "status", error = %e, "status server failed");
            }
            res
        }))
    } else {
        None
    };

    let (outbox, dispatcher) = spawn_dispatcher(notifier.clone(), status.clone(), DISPATCH_QUEUE);

    let source =
        CalendarPageSource::from_config(&config.website).context("building calendar client")?;
    let mut monitor = Monitor::from_config(
        &config,
        source,
        outbox,
        status.clone(),
        tokio::time::Instant::now().into_std(),
    );

    let watcher = if config.polling.watch_config {
        let (tx, rx) = watch::channel(config.target_dates.clone());
        monitor = monitor.with_target_updates(rx);
        Some(reload::spawn_target_watcher(path, reload::RELOAD_POLL, tx))
    } else {
        None
    };

    // Consumes the monitor, which closes the dispatch queue on return.
    let pending = monitor.run(shutdown_signal()).await;

    if let Some(w) = watcher {
        w.abort();
    }
    let _ = stop_tx.send(true);

    let budget = drain_budget(notifier.max_send_duration(), pending);
    match tokio::time::timeout(budget, dispatcher).await {
        Ok(Ok(())) => tracing::info!("pending notifications delivered"),
        Ok(Err(e)) => tracing::error!(error = %e, "dispatcher task failed"),
        Err(_) => tracing::warn!(
            budget_secs = budget.as_secs(),
            "shutdown deadline reached, abandoning undelivered notifications"
        ),
    }

    if let Some(server) = server {
        match server.await {
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "status server task failed"),
        }
    }

    let view = status.snapshot();
    tracing::info!(
        polls = view.polls,
        alerts = view.alerts_sent,
        heartbeats = view.heartbeats_sent,
        send_errors = view.send_errors,
        "booking-watch stopped"
    );
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl-C received, shutting down"),
        _ = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
}
