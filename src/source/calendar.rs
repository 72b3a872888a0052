// src/source/calendar.rs
//! Calendar page snapshot source.
//!
//! The booking page is a month grid of `<td data-date="YYYY-MM-DD">` cells; a
//! bookable day carries an element whose class is exactly the configured
//! availability class (`sale` by default) somewhere inside its cell.

use std::collections::BTreeSet;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::header::USER_AGENT;

use super::{FetchError, SnapshotSource};
use crate::config::WebsiteConfig;
use crate::decision::Snapshot;

const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const STDERR_CAP: usize = 512;

pub struct CalendarPageSource {
    mode: Mode,
    availability_class: String,
}

enum Mode {
    // Fixed HTML, used by tests and dry runs.
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
        timeout: Duration,
    },
    // External renderer that prints the final DOM on stdout.
    Command {
        program: String,
        args: Vec<String>,
        timeout: Duration,
    },
}

impl CalendarPageSource {
    /// Plain HTTP unless `render_command` is set. `{url}` is substituted in
    /// every element of the command, the program included.
    pub fn from_config(cfg: &WebsiteConfig) -> Result<Self, reqwest::Error> {
        let timeout = cfg.fetch_timeout();
        let mut command = cfg.render_command.iter().map(|a| a.replace("{url}", &cfg.url));
        let mode = match command.next() {
            Some(program) => Mode::Command {
                program,
                args: command.collect(),
                timeout,
            },
            None => Mode::Http {
                url: cfg.url.clone(),
                client: reqwest::Client::builder().build()?,
                timeout,
            },
        };
        Ok(Self {
            mode,
            availability_class: cfg.availability_class.clone(),
        })
    }

    pub fn from_fixture(html: impl Into<String>, availability_class: impl Into<String>) -> Self {
        Self {
            mode: Mode::Fixture(html.into()),
            availability_class: availability_class.into(),
        }
    }

    async fn load_page(&self) -> Result<String, FetchError> {
        match &self.mode {
            Mode::Fixture(html) => Ok(html.clone()),
            Mode::Http {
                url,
                client,
                timeout,
            } => {
                tracing::debug!(target: "poller", %url, "fetching calendar page");
                let resp = client
                    .get(url)
                    .header(USER_AGENT, BROWSER_UA)
                    .timeout(*timeout)
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(FetchError::Status(status));
                }
                Ok(resp.text().await?)
            }
            Mode::Command {
                program,
                args,
                timeout,
            } => render_with_command(program, args, *timeout).await,
        }
    }
}

#[async_trait]
impl SnapshotSource for CalendarPageSource {
    async fn fetch(&self, targets: &BTreeSet<NaiveDate>) -> Result<Snapshot, FetchError> {
        let html = self.load_page().await?;
        parse_available_dates(&html, targets, &self.availability_class)
    }

    fn name(&self) -> &'static str {
        match self.mode {
            Mode::Fixture(_) => "calendar-fixture",
            Mode::Http { .. } => "calendar-http",
            Mode::Command { .. } => "calendar-render",
        }
    }
}

async fn render_with_command(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<String, FetchError> {
    tracing::debug!(target: "poller", program, "rendering calendar page");
    let child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // dropping the fetch future (timeout, shutdown) must not leak a browser
        .kill_on_drop(true)
        .spawn()
        .map_err(FetchError::Spawn)?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(res) => res.map_err(FetchError::Spawn)?,
        Err(_) => return Err(FetchError::Timeout(timeout)),
    };

    if !output.status.success() {
        let stderr: String = String::from_utf8_lossy(&output.stderr)
            .trim()
            .chars()
            .take(STDERR_CAP)
            .collect();
        return Err(FetchError::Render {
            status: output.status.to_string(),
            stderr,
        });
    }
    String::from_utf8(output.stdout).map_err(|_| FetchError::Encoding)
}

/// Extract which `targets` are marked available on the page.
///
/// Each cell spans from its opening `<td data-date=...>` to its closing
/// `</td>` (or the next cell). A page without any dated cell is an error: an
/// unrendered or error page must not read as "nothing available".
pub fn parse_available_dates(
    html: &str,
    targets: &BTreeSet<NaiveDate>,
    availability_class: &str,
) -> Result<Snapshot, FetchError> {
    static RE_CELL: OnceCell<Regex> = OnceCell::new();
    static RE_CELL_END: OnceCell<Regex> = OnceCell::new();
    static RE_CLASS: OnceCell<Regex> = OnceCell::new();
    let re_cell = RE_CELL.get_or_init(|| {
        Regex::new(r#"(?is)<td\b[^>]*?\sdata-date\s*=\s*["'](\d{4}-\d{2}-\d{2})["'][^>]*>"#)
            .expect("calendar cell regex")
    });
    let re_end = RE_CELL_END.get_or_init(|| Regex::new(r"(?i)</td\s*>").expect("cell end regex"));
    let re_class = RE_CLASS.get_or_init(|| {
        Regex::new(r#"(?is)<[a-z][a-z0-9]*\b[^>]*?\sclass\s*=\s*["']([^"']*)["']"#)
            .expect("class attribute regex")
    });

    let cells: Vec<(usize, usize, &str)> = re_cell
        .captures_iter(html)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let date = c.get(1)?;
            Some((whole.start(), whole.end(), date.as_str()))
        })
        .collect();

    if cells.is_empty() {
        return Err(FetchError::NoCalendar);
    }
    tracing::debug!(target: "poller", cells = cells.len(), "calendar cells found");

    let mut available = BTreeSet::new();
    for (i, &(_, body_start, date_str)) in cells.iter().enumerate() {
        let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };
        if !targets.contains(&date) {
            continue;
        }

        let next_start = cells.get(i + 1).map_or(html.len(), |c| c.0);
        let mut body = &html[body_start..next_start];
        if let Some(end) = re_end.find(body) {
            body = &body[..end.start()];
        }

        let is_available = re_class
            .captures_iter(body)
            .any(|c| c.get(1).is_some_and(|m| m.as_str().trim() == availability_class));
        if is_available {
            tracing::info!(target: "poller", date = %date, "availability found");
            available.insert(date);
        } else {
            tracing::debug!(target: "poller", date = %date, "no availability");
        }
    }

    Ok(Snapshot::new(available))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
<div class="legend"><span class="sale">Tickets on sale</span></div>
<table class="calendar">
  <tr>
    <td data-date="2025-10-25"><div><div>25</div><div><div><div><div><span class="sale"></span></div></div></div></div></div></td>
    <td data-date="2025-10-26"><div><div>26</div><div><div><div><div><span class="sale"></span></div></div></div></div></div></td>
    <td data-date="2025-10-27"><div><div>27</div><div><div><div><div><span class="soldout"></span></div></div></div></div></div></td>
    <td class="empty"></td>
  </tr>
</table>
<p class="sale">footer promo</p>
</body></html>
"#;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn targets(ds: &[&str]) -> BTreeSet<NaiveDate> {
        ds.iter().map(|s| d(s)).collect()
    }

    #[test]
    fn marks_only_target_cells_with_exact_class() {
        let snap =
            parse_available_dates(PAGE, &targets(&["2025-10-26", "2025-10-27"]), "sale").unwrap();
        assert_eq!(
            snap.dates().iter().copied().collect::<Vec<_>>(),
            vec![d("2025-10-26")]
        );
    }

    #[test]
    fn class_must_match_exactly() {
        let page = r#"<table><tr><td data-date="2025-10-26"><span class="sale-soon"></span></td></tr></table>"#;
        let snap = parse_available_dates(page, &targets(&["2025-10-26"]), "sale").unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn content_after_last_cell_is_not_attributed_to_it() {
        let page = r#"<table><tr><td data-date="2025-10-27"><span class="soldout"></span></td></tr></table><p class="sale">x</p>"#;
        let snap = parse_available_dates(page, &targets(&["2025-10-27"]), "sale").unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn page_without_cells_is_an_error() {
        let err =
            parse_available_dates("<html>maintenance</html>", &targets(&["2025-10-26"]), "sale")
                .unwrap_err();
        assert!(matches!(err, FetchError::NoCalendar));
    }

    #[tokio::test]
    async fn fixture_source_fetches() {
        let src = CalendarPageSource::from_fixture(PAGE, "sale");
        let snap = src
            .fetch(&targets(&["2025-10-25", "2025-10-27"]))
            .await
            .unwrap();
        assert_eq!(
            snap.dates().iter().copied().collect::<Vec<_>>(),
            vec![d("2025-10-25")]
        );
        assert_eq!(src.name(), "calendar-fixture");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn render_command_output_is_parsed() {
        let cfg = WebsiteConfig {
            render_command: vec![
                "sh".into(),
                "-c".into(),
                "printf '%s' '<td data-date=\"2025-10-26\"><i class=\"sale\"></i></td>' # {url}"
                    .into(),
            ],
            ..WebsiteConfig::default()
        };
        let src = CalendarPageSource::from_config(&cfg).unwrap();
        let snap = src.fetch(&targets(&["2025-10-26"])).await.unwrap();
        assert!(snap.contains(&d("2025-10-26")));
        assert_eq!(src.name(), "calendar-render");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn url_placeholder_applies_to_program_too() {
        let cfg = WebsiteConfig {
            url: "sh".into(),
            render_command: vec![
                "{url}".into(),
                "-c".into(),
                "printf '%s' '<td data-date=\"2025-10-27\"><b class=\"sale\"></b></td>'".into(),
            ],
            ..WebsiteConfig::default()
        };
        let src = CalendarPageSource::from_config(&cfg).unwrap();
        let snap = src.fetch(&targets(&["2025-10-27"])).await.unwrap();
        assert!(snap.contains(&d("2025-10-27")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_render_command_is_a_fetch_error() {
        let cfg = WebsiteConfig {
            render_command: vec!["sh".into(), "-c".into(), "echo boom >&2; exit 3".into()],
            ..WebsiteConfig::default()
        };
        let src = CalendarPageSource::from_config(&cfg).unwrap();
        match src.fetch(&targets(&["2025-10-26"])).await {
            Err(FetchError::Render { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("expected render error, got {other:?}"),
        }
    }
}
