// src/logging.rs
use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    prelude::*,
    EnvFilter, Layer, Registry,
};

use crate::config::{LogFormat, LoggingConfig};

/// HTTP client internals are only interesting when something is broken.
const QUIET_CRATES: &[&str] = &[
    "hyper=warn",
    "hyper_util=warn",
    "reqwest=warn",
    "h2=warn",
    "rustls=warn",
];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `logging.level` when set. The returned guard must be
/// held for the life of the process when a log file is configured, otherwise
/// buffered lines are lost on exit.
pub fn init(cfg: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => {
            let directives = std::iter::once(cfg.level.as_str())
                .chain(QUIET_CRATES.iter().copied())
                .collect::<Vec<_>>()
                .join(",");
            EnvFilter::try_new(&directives)
                .with_context(|| format!("invalid log filter `{directives}`"))?
        }
    };

    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(cfg.format, std::io::stdout, true)];

    let guard = match &cfg.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("logging.file `{}` has no file name", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            layers.push(fmt_layer(cfg.format, writer, false));
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(guard)
}

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer().with_writer(writer).with_ansi(ansi);
    match format {
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Full => base.boxed(),
        LogFormat::Json => base.json().boxed(),
    }
}
