//! Command-line interface definitions for Daily VARC.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Secrets are read from the environment; everything else may also come from
//! a YAML config file (see [`crate::config`]), with flags taking precedence.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Daily VARC application.
///
/// # Examples
///
/// ```sh
/// # Daily run, as invoked by the scheduler
/// GEMINI_API_KEY=... daily_varc produce -o public/data.json
///
/// # Curated questions only, no scraping
/// daily_varc produce --no-aeon --questions-file curated.json
///
/// # Verify the currently published file
/// daily_varc check public/data.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape, generate and persist a fresh content batch
    Produce(ProduceArgs),
    /// Parse a persisted batch and report whether it is valid
    Check {
        /// Path of the data file to verify
        path: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
pub struct ProduceArgs {
    /// Path of the JSON data file to replace
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Google Gemini API key; without it no questions are generated
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Gemini model name
    #[arg(long)]
    pub model: Option<String>,

    /// Scrape this essay instead of discovering the latest one
    #[arg(long)]
    pub essay_url: Option<String>,

    /// Generate questions for at most this many passages
    #[arg(long)]
    pub max_passages: Option<usize>,

    /// Minimum milliseconds between two generator calls
    #[arg(long)]
    pub request_interval_ms: Option<u64>,

    /// Local JSON question file to include (repeatable)
    #[arg(short = 'q', long)]
    pub questions_file: Vec<PathBuf>,

    /// Disable the Aeon essay source
    #[arg(long)]
    pub no_aeon: bool,

    /// Persist the batch even if it contains no items
    #[arg(long)]
    pub allow_empty: bool,
}
