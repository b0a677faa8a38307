//! # Daily VARC
//!
//! A daily content pipeline for a static reading-comprehension practice page.
//! It scrapes the latest essay from Aeon, asks Google Gemini for CAT VARC
//! style multiple-choice questions about each passage, merges in any curated
//! local question files and replaces the page's `data.json` in one atomic
//! write.
//!
//! ## Usage
//!
//! ```sh
//! GEMINI_API_KEY=... daily_varc produce -o public/data.json
//! daily_varc check public/data.json
//! ```
//!
//! ## Architecture
//!
//! The run is a single linear pipeline:
//! 1. **Harvesting**: every configured source is queried (concurrently)
//! 2. **Transforming**: raw records are validated into content items
//! 3. **Assembling**: items are deduplicated and numbered
//! 4. **Persisting**: the batch atomically replaces the previous file
//!
//! Exit code 0 means the file was replaced; anything else means it was left
//! as it was.

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod error;
mod models;
mod outputs;
mod producer;
mod sources;
mod transform;
mod utils;

use cli::{Cli, Command};
use config::ProducerConfig;
use outputs::json;
use producer::produce_batch;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();

    match args.command {
        Command::Produce(produce_args) => {
            info!(version = env!("CARGO_PKG_VERSION"), "daily_varc starting up");

            let config = ProducerConfig::resolve(&produce_args).inspect_err(|e| {
                error!(error = %e, "Invalid configuration");
            })?;
            debug!(?config, "Resolved configuration");

            let sources = sources::build_sources(&config)?;
            let report = produce_batch(&config, &sources).await.inspect_err(|e| {
                error!(error = %e, "Run failed; previous data file left in place");
            })?;

            let elapsed = start_time.elapsed();
            info!(
                path = %report.output.display(),
                items = report.items,
                skipped = report.skipped,
                duplicates = report.duplicates,
                failed_sources = ?report.failed_sources,
                secs = elapsed.as_secs(),
                millis = elapsed.subsec_millis(),
                "Execution complete"
            );
        }
        Command::Check { path } => {
            let batch = json::read_batch(&path).await.inspect_err(|e| {
                error!(path = %path.display(), error = %e, "Data file is invalid");
            })?;
            info!(
                path = %path.display(),
                schema_version = batch.schema_version,
                items = batch.items.len(),
                date_scraped = %batch.metadata.date_scraped,
                "Data file is valid"
            );
            if batch.is_empty() {
                warn!("Data file holds no items; the page will show its empty state");
            }
        }
    }

    Ok(())
}
