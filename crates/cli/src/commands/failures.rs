//! Per-worker probe failure breakdown

use anyhow::Result;
use colored::Colorize;
use soak_lib::report::tally_series;
use std::path::Path;
use tabled::Tabled;

use crate::output::{color_unreachable, format_pct, print_json, print_success, print_warning, OutputFormat};

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
    #[tabled(rename = "Unreachable %")]
    unreachable_pct: String,
}

/// Show how many sustained-window probes each worker failed
pub fn show_failures(run_dir: &Path, format: OutputFormat) -> Result<()> {
    let loaded = super::load(run_dir)?;
    let tallies = tally_series(&loaded.series);

    if let OutputFormat::Json = format {
        return print_json(&tallies);
    }

    println!("{}", "Probe Failures by Worker".bold());
    println!("{}", "=".repeat(60));
    println!("Run:    {}", run_dir.display().to_string().cyan());
    println!("Rounds: {}", loaded.series.len());
    println!();

    if tallies.is_empty() {
        print_warning("No rounds recorded in this run");
        return Ok(());
    }

    let rows: Vec<WorkerRow> = tallies
        .iter()
        .map(|(worker, tally)| WorkerRow {
            worker: worker.clone(),
            ok: tally.ok,
            degraded: tally.degraded,
            unreachable: color_unreachable(tally.unreachable, tally.total()),
            unreachable_pct: format_pct(tally.unreachable, tally.total()),
        })
        .collect();

    let table = tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);
    println!();

    let failing = tallies.values().filter(|t| t.unreachable > 0).count();
    if failing == 0 {
        print_success(&format!("All {} workers answered every probe", tallies.len()));
    } else {
        print_warning(&format!(
            "{} of {} workers had unreachable samples",
            failing,
            tallies.len()
        ));
    }

    Ok(())
}
