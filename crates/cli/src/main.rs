//! Soak test operator CLI
//!
//! Re-analyzes persisted run directories and queries a live runner.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{analyze, failures, status};
use std::path::PathBuf;

const DEFAULT_API_URL: &str = "http://localhost:9184";

/// Emulator fleet soak test CLI
#[derive(Parser)]
#[command(name = "soak")]
#[command(author, version, about = "CLI for emulator fleet soak test runs", long_about = None)]
pub struct Cli {
    /// Runner status API URL (falls back to ~/.config/soak/config.json)
    #[arg(long, env = "SOAK_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Re-run degradation analysis on a run directory
    Analyze {
        /// Run directory containing timeseries.csv
        run_dir: PathBuf,

        /// Degradation threshold in percent
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Show per-worker unreachable counts from a run directory
    Failures {
        /// Run directory containing timeseries.csv
        run_dir: PathBuf,
    },

    /// Show progress of a live run
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::Config::load()?;

    match cli.command {
        Commands::Analyze { run_dir, threshold } => {
            let threshold = threshold.or(settings.threshold_pct);
            analyze::analyze_run(&run_dir, threshold, cli.format)?;
        }
        Commands::Failures { run_dir } => {
            failures::show_failures(&run_dir, cli.format)?;
        }
        Commands::Status => {
            let api_url = cli
                .api_url
                .or(settings.api_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string());
            let client = client::ApiClient::new(&api_url)?;
            status::show_status(&client, cli.format).await?;
        }
    }

    Ok(())
}
