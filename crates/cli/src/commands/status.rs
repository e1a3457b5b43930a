//! Live run status

use anyhow::Result;
use colored::Colorize;
use soak_lib::ProgressReport;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, color_unreachable, print_info, print_json, OutputFormat};

#[derive(Tabled)]
struct WorkerRow {
    #[tabled(rename = "Worker")]
    worker: String,
    #[tabled(rename = "OK")]
    ok: u64,
    #[tabled(rename = "Degraded")]
    degraded: u64,
    #[tabled(rename = "Unreachable")]
    unreachable: String,
    #[tabled(rename = "Last Failure")]
    last_failure: String,
}

/// Query a running runner for its progress
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let progress: ProgressReport = client.get("progress").await?;

    if let OutputFormat::Json = format {
        return print_json(&progress);
    }

    println!("{}", "Soak Run Status".bold());
    println!("{}", "=".repeat(60));
    println!("Runner:   {}", client.base_url().as_str().cyan());
    println!("Run ID:   {}", progress.run_id);
    println!("Phase:    {}", color_status(&progress.phase.to_string()));
    println!(
        "Rounds:   {} (last index {})",
        progress.series.rounds,
        progress
            .series
            .last_round_index
            .map(|i| i.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "Samples:  {} ({} degraded, {} unreachable)",
        progress.series.samples, progress.series.degraded, progress.series.unreachable
    );
    println!();

    if progress.by_worker.is_empty() {
        print_info("No probes completed yet");
        return Ok(());
    }

    let rows: Vec<WorkerRow> = progress
        .by_worker
        .iter()
        .map(|(worker, tally)| WorkerRow {
            worker: worker.clone(),
            ok: tally.ok,
            degraded: tally.degraded,
            unreachable: color_unreachable(tally.unreachable, tally.total()),
            last_failure: tally.last_failure.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let table = tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);

    Ok(())
}
