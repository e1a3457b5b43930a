//! Offline re-analysis of a persisted run

use anyhow::{Context, Result};
use serde::Serialize;
use soak_lib::analysis::{Analysis, DegradationAnalyzer, DEFAULT_THRESHOLD_PCT};
use soak_lib::report::{self, RunSummary, SUMMARY_FILE};
use std::path::Path;

use crate::output::{print_info, print_json, print_warning, OutputFormat};

#[derive(Serialize)]
struct AnalyzeOutput<'a> {
    summary: &'a RunSummary,
    analysis: &'a Analysis,
}

/// Re-run degradation analysis on a run directory and print the report
///
/// Flags are informational; the command succeeds whenever the run loads.
pub fn analyze_run(run_dir: &Path, threshold: Option<f64>, format: OutputFormat) -> Result<()> {
    let loaded = super::load(run_dir)?;

    let summary_path = run_dir.join(SUMMARY_FILE);
    let summary = if summary_path.exists() {
        let content = std::fs::read_to_string(&summary_path)
            .with_context(|| format!("Failed to read {}", summary_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", summary_path.display()))?
    } else {
        RunSummary::from_loaded(run_dir, &loaded)
    };

    let threshold = threshold.unwrap_or(DEFAULT_THRESHOLD_PCT);
    if !threshold.is_finite() || threshold < 0.0 {
        anyhow::bail!("threshold must be a non-negative number, got {}", threshold);
    }

    let analysis = DegradationAnalyzer::new(threshold).analyze(
        &loaded.series,
        &summary.baseline,
        &summary.final_burst,
    );

    match format {
        OutputFormat::Json => print_json(&AnalyzeOutput {
            summary: &summary,
            analysis: &analysis,
        })?,
        OutputFormat::Table => {
            print!("{}", report::render(&summary, &analysis));
            println!();
            if analysis.is_degraded() {
                print_warning(&format!(
                    "{} degradation flag(s) at {}% threshold",
                    analysis.flags.len(),
                    threshold
                ));
            } else {
                print_info("No degradation detected");
            }
        }
    }

    Ok(())
}
