// src/cli.rs
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ENV_CONFIG_PATH;

/// Watch a booking calendar and send a webhook when target dates open up.
///
/// Without a subcommand the monitor runs until interrupted. Subcommands edit
/// the configuration file and exit.
#[derive(Debug, Clone, Parser)]
#[command(name = "booking-watch", version, about, long_about = None)]
pub struct Args {
    /// Path to the TOML configuration file [default: config.toml]
    #[arg(short, long, global = true, env = ENV_CONFIG_PATH, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Fetch the calendar once, print the available target dates and exit
    #[arg(long, conflicts_with = "test_webhook")]
    pub check_once: bool,

    /// Read the calendar from a saved HTML page instead of the website
    #[arg(long, value_name = "HTML", requires = "check_once")]
    pub fixture: Option<PathBuf>,

    /// Send a test notification to the configured webhook and exit
    #[arg(long)]
    pub test_webhook: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Show target dates and webhook state from the configuration file
    Status,
    /// List or edit the target dates
    #[command(subcommand)]
    Dates(DatesCommand),
    /// Show or change the webhook URL
    #[command(subcommand)]
    Webhook(WebhookCommand),
}

#[derive(Debug, Clone, Subcommand)]
pub enum DatesCommand {
    /// Print the configured target dates
    List,
    /// Add dates to the target list
    Add {
        #[arg(required = true, value_name = "YYYY-MM-DD")]
        dates: Vec<String>,
    },
    /// Remove dates from the target list
    Remove {
        #[arg(required = true, value_name = "YYYY-MM-DD")]
        dates: Vec<String>,
    },
    /// Replace the target list
    Set {
        #[arg(required = true, value_name = "YYYY-MM-DD")]
        dates: Vec<String>,
    },
    /// Remove every target date
    Clear,
}

#[derive(Debug, Clone, Subcommand)]
pub enum WebhookCommand {
    /// Print the webhook URL with its key masked
    Show,
    /// Set the full webhook URL
    SetUrl { url: String },
    /// Build an IFTTT maker URL from a key
    SetKey {
        key: String,
        /// IFTTT event name [default: the current one, or booking_available]
        #[arg(long)]
        event: Option<String>,
    },
}
