//! booking-watch binary entrypoint.
//! Parses the CLI and hands over to `app::run`.

use std::process::ExitCode;

use booking_watch::{app, cli::Args};
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    match app::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Printed directly: config errors happen before the subscriber exists.
            eprintln!("booking-watch: {e:#}");
            ExitCode::FAILURE
        }
    }
}
