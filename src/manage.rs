// src/manage.rs
//! Config-file subcommands. Results go to `out`, warnings to `warn`.

use std::io::Write;

use anyhow::Context;

use crate::cli::{Command, DatesCommand, WebhookCommand};
use crate::config::{mask_sensitive_url, ConfigEditor, DatesChange};
use crate::decision::join_dates;

pub fn run<W, E>(
    editor: &ConfigEditor,
    command: Command,
    out: &mut W,
    warn: &mut E,
) -> anyhow::Result<()>
where
    W: Write,
    E: Write,
{
    let path = editor.path().display().to_string();
    match command {
        Command::Status => {
            let st = editor.status().with_context(|| format!("reading {path}"))?;
            if !st.exists {
                writeln!(out, "Config file: {path} (not found)")?;
                return Ok(());
            }
            writeln!(out, "Config file: {path}")?;
            writeln!(
                out,
                "Target dates: {} ({} upcoming, {} past)",
                st.dates.len(),
                st.future_dates(),
                st.past_dates
            )?;
            if !st.dates.is_empty() {
                writeln!(out, "  {}", join_dates(&st.dates))?;
            }
            let state = if st.webhook_configured {
                "configured"
            } else {
                "not configured"
            };
            writeln!(out, "Webhook: {state}")?;
            if !st.webhook_url.is_empty() {
                writeln!(out, "  {}", st.webhook_url)?;
            }
            if let Some(preview) = st.key_preview {
                writeln!(out, "  key {preview}")?;
            }
        }

        Command::Dates(DatesCommand::List) => {
            let dates = editor.dates().with_context(|| format!("reading {path}"))?;
            if dates.is_empty() {
                writeln!(out, "No target dates configured")?;
            }
            for d in dates {
                writeln!(out, "{d}")?;
            }
        }
        Command::Dates(DatesCommand::Add { dates }) => {
            let change = editor
                .add_dates(&dates)
                .with_context(|| format!("updating {path}"))?;
            report_dates(&change, out, warn)?;
        }
        Command::Dates(DatesCommand::Remove { dates }) => {
            let change = editor
                .remove_dates(&dates)
                .with_context(|| format!("updating {path}"))?;
            if !change.not_found.is_empty() {
                writeln!(warn, "warning: not configured: {}", join_dates(&change.not_found))?;
            }
            report_dates(&change, out, warn)?;
        }
        Command::Dates(DatesCommand::Set { dates }) => {
            let change = editor
                .set_dates(&dates)
                .with_context(|| format!("updating {path}"))?;
            report_dates(&change, out, warn)?;
        }
        Command::Dates(DatesCommand::Clear) => {
            editor
                .clear_dates()
                .with_context(|| format!("updating {path}"))?;
            writeln!(out, "Target dates cleared")?;
            writeln!(warn, "warning: the monitor will not start without target dates")?;
        }

        Command::Webhook(WebhookCommand::Show) => {
            let url = editor.webhook_url().with_context(|| format!("reading {path}"))?;
            if url.is_empty() {
                writeln!(out, "No webhook URL configured")?;
            } else {
                writeln!(out, "{url}")?;
            }
        }
        Command::Webhook(WebhookCommand::SetUrl { url }) => {
            editor
                .set_webhook_url(&url)
                .with_context(|| format!("updating {path}"))?;
            writeln!(out, "Webhook URL set to {}", mask_sensitive_url(&url))?;
        }
        Command::Webhook(WebhookCommand::SetKey { key, event }) => {
            let url = editor
                .set_webhook_key(&key, event.as_deref())
                .with_context(|| format!("updating {path}"))?;
            writeln!(out, "Webhook URL set to {}", mask_sensitive_url(&url))?;
        }
    }
    Ok(())
}

fn report_dates<W: Write, E: Write>(
    change: &DatesChange,
    out: &mut W,
    warn: &mut E,
) -> anyhow::Result<()> {
    if !change.past.is_empty() {
        writeln!(warn, "warning: already past: {}", join_dates(&change.past))?;
    }
    if change.dates.is_empty() {
        writeln!(out, "No target dates configured")?;
        writeln!(warn, "warning: the monitor will not start without target dates")?;
    } else {
        writeln!(
            out,
            "Target dates ({}): {}",
            change.dates.len(),
            join_dates(&change.dates)
        )?;
    }
    Ok(())
}
