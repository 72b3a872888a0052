// tests/config_load.rs
//
// Loading from disk, environment overrides and path resolution.
// Env-touching tests are serialized: the process environment is global.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use booking_watch::config::{
    Config, ConfigError, LogFormat, DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH, ENV_LOG_LEVEL,
    ENV_WEBHOOK_URL,
};
use serial_test::serial;
use tempfile::NamedTempFile;

const FULL: &str = r#"
target_dates = ["2025-10-26", "2025-10-27"]

[polling]
interval_seconds = 15
grace_period_seconds = 600
watch_config = true

[heartbeat]
enabled = false
interval_hours = 12

[webhook]
url = "https://maker.ifttt.com/trigger/museum/with/key/s3cr3t"
timeout_seconds = 5
max_retries = 2
test_on_startup = false

[website]
url = "https://tickets.example.com/calendar"
availability_class = "open"
fetch_timeout_seconds = 20
render_command = ["chromium", "--headless", "--dump-dom", "{url}"]

[logging]
level = "WARNING"
format = "json"

[server]
enabled = true
bind = "0.0.0.0:9000"
"#;

fn write_config(body: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("tempfile");
    f.write_all(body.as_bytes()).expect("write config");
    f
}

fn clear_env() {
    for k in [ENV_LOG_LEVEL, ENV_WEBHOOK_URL, ENV_CONFIG_PATH] {
        std::env::remove_var(k);
    }
}

#[test]
#[serial]
fn full_file_round_trips_into_typed_config() {
    clear_env();
    let file = write_config(FULL);
    let cfg = Config::load(file.path()).expect("load");

    assert_eq!(cfg.target_dates.len(), 2);
    assert_eq!(cfg.polling.interval(), Duration::from_secs(15));
    assert_eq!(cfg.polling.grace_period(), Duration::from_secs(600));
    assert!(cfg.polling.watch_config);
    assert!(!cfg.heartbeat.is_active());
    assert_eq!(cfg.webhook.timeout(), Duration::from_secs(5));
    assert_eq!(cfg.webhook.max_retries, 2);
    assert!(!cfg.webhook.test_on_startup);
    assert_eq!(cfg.website.availability_class, "open");
    assert_eq!(cfg.website.fetch_timeout(), Duration::from_secs(20));
    assert_eq!(cfg.website.render_command.len(), 4);
    assert_eq!(cfg.logging.level, "warn");
    assert_eq!(cfg.logging.format, LogFormat::Json);
    assert!(cfg.server.enabled);
    assert_eq!(cfg.server.bind.port(), 9000);
}

#[test]
#[serial]
fn env_overrides_level_and_webhook() {
    clear_env();
    let file = write_config(FULL);
    std::env::set_var(ENV_LOG_LEVEL, "debug");
    std::env::set_var(ENV_WEBHOOK_URL, "https://hooks.example.com/other");

    let cfg = Config::load(file.path());
    clear_env();
    let cfg = cfg.expect("load with overrides");

    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.webhook.url, "https://hooks.example.com/other");
}

#[test]
#[serial]
fn blank_env_values_do_not_override() {
    clear_env();
    let file = write_config(FULL);
    std::env::set_var(ENV_WEBHOOK_URL, "   ");

    let cfg = Config::load(file.path());
    clear_env();

    assert_eq!(
        cfg.expect("load").webhook.url,
        "https://maker.ifttt.com/trigger/museum/with/key/s3cr3t"
    );
}

#[test]
#[serial]
fn invalid_env_override_is_rejected() {
    clear_env();
    let file = write_config(FULL);
    std::env::set_var(ENV_WEBHOOK_URL, "ftp://hooks.example.com/x");

    let res = Config::load(file.path());
    clear_env();

    assert!(matches!(
        res,
        Err(ConfigError::InvalidUrl { field: "webhook", .. })
    ));
}

#[test]
#[serial]
fn missing_file_is_reported_with_its_path() {
    clear_env();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("absent.toml");

    match Config::load(&path) {
        Err(ConfigError::NotFound(p)) => assert_eq!(p, path),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
#[serial]
fn validation_errors_surface() {
    clear_env();
    let cases: [(&str, fn(&ConfigError) -> bool); 4] = [
        (
            "target_dates = []\n[webhook]\nurl = \"https://e.com/h\"\n",
            |e| matches!(e, ConfigError::NoTargetDates),
        ),
        (
            "target_dates = [\"2025-10-26\"]\n[polling]\ninterval_seconds = 0\n[webhook]\nurl = \"https://e.com/h\"\n",
            |e| matches!(e, ConfigError::TooSmall { field: "polling.interval_seconds", .. }),
        ),
        (
            "target_dates = [\"2025-10-26\"]\n[webhook]\nurl = \"https://e.com/h\"\n[logging]\nlevel = \"loud\"\n",
            |e| matches!(e, ConfigError::InvalidLogLevel(_)),
        ),
        (
            "target_dates = [\"2025-10-26\"]\n",
            |e| matches!(e, ConfigError::Parse(_)),
        ),
    ];

    for (body, check) in cases {
        let file = write_config(body);
        let err = Config::load(file.path()).expect_err(body);
        assert!(check(&err), "{body:?} -> {err}");
    }
}

#[test]
#[serial]
fn config_path_resolution_order() {
    clear_env();
    assert_eq!(Config::resolve_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));

    std::env::set_var(ENV_CONFIG_PATH, "/etc/booking-watch.toml");
    assert_eq!(
        Config::resolve_path(None),
        PathBuf::from("/etc/booking-watch.toml")
    );
    assert_eq!(
        Config::resolve_path(Some(PathBuf::from("local.toml"))),
        PathBuf::from("local.toml")
    );
    clear_env();
}
