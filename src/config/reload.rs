// src/config/reload.rs
//! Target-date hot reload: poll the config file's mtime and publish a new
//! target set when it changes. Only `target_dates` is picked up; everything
//! else needs a restart.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::Config;

pub const RELOAD_POLL: Duration = Duration::from_secs(2);

/// Spawn the watcher. It exits once every receiver of `tx` is dropped.
pub fn spawn_target_watcher(
    path: PathBuf,
    poll: Duration,
    tx: watch::Sender<BTreeSet<NaiveDate>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll);
        let mut last_mtime: Option<SystemTime> = None;

        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }

            let mtime = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(m) => m,
                // Missing or unreadable; editors often replace files non-atomically.
                Err(_) => continue,
            };
            let changed = match last_mtime {
                None => {
                    last_mtime = Some(mtime);
                    false
                }
                Some(prev) => mtime > prev,
            };
            if !changed {
                continue;
            }
            last_mtime = Some(mtime);

            match reload_targets(&path).await {
                Ok(targets) => {
                    let updated = tx.send_if_modified(|cur| {
                        if *cur == targets {
                            false
                        } else {
                            *cur = targets;
                            true
                        }
                    });
                    if updated {
                        tracing::info!(
                            target: "config",
                            path = %path.display(),
                            "target dates reloaded"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        target: "config",
                        path = %path.display(),
                        error = ?e,
                        "config reload rejected, keeping current targets"
                    );
                }
            }
        }
    })
}

async fn reload_targets(path: &Path) -> anyhow::Result<BTreeSet<NaiveDate>> {
    let content = tokio::fs::read_to_string(path).await?;
    let cfg = Config::from_toml_str_with(&content, |k| std::env::var(k).ok())?;
    Ok(cfg.target_dates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_cfg(path: &std::path::Path, dates: &[&str]) {
        let list = dates
            .iter()
            .map(|d| format!("\"{d}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let body = format!(
            "target_dates = [{list}]\n[webhook]\nurl = \"https://example.com/hook\"\n"
        );
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn publishes_new_targets_after_file_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_cfg(&path, &["2025-10-26"]);

        let initial: BTreeSet<NaiveDate> = Config::load(&path).unwrap().target_dates;
        let (tx, mut rx) = watch::channel(initial);
        let handle = spawn_target_watcher(path.clone(), Duration::from_millis(20), tx);

        // let the watcher record the first mtime
        tokio::time::sleep(Duration::from_millis(60)).await;
        // mtime granularity can be coarse on some filesystems
        tokio::time::sleep(Duration::from_millis(1100)).await;
        write_cfg(&path, &["2025-10-26", "2025-10-28"]);

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("reload within timeout")
            .unwrap();
        assert_eq!(rx.borrow().len(), 2);

        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("watcher exits when receivers are gone")
            .unwrap();
    }
}
