//! Run report rendering
//!
//! `render` only formats: every number it prints comes from the summary or
//! the analysis handed to it, so identical inputs give identical text.

use crate::analysis::{Analysis, MetricDelta};
use crate::models::{BurstAggregate, BurstPhase, SampleStatus};
use crate::probe::WorkerTally;
use crate::recorder::{LoadedRun, TimeSeries};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

/// File name of the serialized run summary inside a run directory
pub const SUMMARY_FILE: &str = "run.json";

/// File name of the rendered report inside a run directory
pub const REPORT_FILE: &str = "report.txt";

/// Everything about a run the report needs besides the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub workload: String,
    pub mode: String,
    pub started_at: Option<DateTime<Utc>>,
    pub configured_duration_secs: Option<u64>,
    pub interval_secs: Option<u64>,
    pub elapsed_secs: Option<f64>,
    pub round_count: usize,
    pub expected_round_count: Option<u64>,
    pub worker_count: usize,
    pub time_series_path: PathBuf,
    pub baseline: BurstAggregate,
    pub final_burst: BurstAggregate,
    pub failures_by_worker: BTreeMap<String, WorkerTally>,
    pub interrupted: bool,
}

impl RunSummary {
    /// Summary reconstructed from a persisted run directory
    ///
    /// Configuration is not stored in the CSV files, so those fields are
    /// left unknown. Tallies cover the sustained window only.
    pub fn from_loaded(dir: &Path, loaded: &LoadedRun) -> Self {
        let run_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());

        Self {
            run_id,
            workload: "unknown".to_string(),
            mode: "unknown".to_string(),
            started_at: loaded.series.rounds().first().map(|r| r.dispatched_at),
            configured_duration_secs: None,
            interval_secs: None,
            elapsed_secs: None,
            round_count: loaded.series.len(),
            expected_round_count: None,
            worker_count: loaded.series.worker_count(),
            time_series_path: dir.join(crate::recorder::TIMESERIES_FILE),
            baseline: loaded
                .baseline
                .clone()
                .unwrap_or_else(|| BurstAggregate::empty(BurstPhase::Baseline)),
            final_burst: loaded
                .final_burst
                .clone()
                .unwrap_or_else(|| BurstAggregate::empty(BurstPhase::Final)),
            failures_by_worker: tally_series(&loaded.series),
            interrupted: false,
        }
    }
}

/// Per-worker outcome counts over the rounds of a time series
pub fn tally_series(series: &TimeSeries) -> BTreeMap<String, WorkerTally> {
    let mut tallies: BTreeMap<String, WorkerTally> = BTreeMap::new();
    for sample in series.rounds().iter().flat_map(|r| r.samples.iter()) {
        let tally = tallies.entry(sample.worker_id.clone()).or_default();
        match sample.status {
            SampleStatus::Ok => tally.ok += 1,
            SampleStatus::Degraded => tally.degraded += 1,
            SampleStatus::Unreachable => tally.unreachable += 1,
        }
    }
    tallies
}

#[derive(Tabled)]
struct BurstRow {
    #[tabled(rename = "Burst")]
    phase: String,
    #[tabled(rename = "Rounds")]
    rounds: usize,
    #[tabled(rename = "Samples")]
    samples: usize,
    #[tabled(rename = "Failures")]
    failures: usize,
    #[tabled(rename = "CPU %")]
    cpu_pct: String,
    #[tabled(rename = "Memory MB")]
    mem_mb: String,
    #[tabled(rename = "FPS")]
    fps: String,
}

impl BurstRow {
    fn from_aggregate(aggregate: &BurstAggregate) -> Self {
        Self {
            phase: aggregate.phase.to_string(),
            rounds: aggregate.rounds,
            samples: aggregate.samples,
            failures: aggregate.failures,
            cpu_pct: format_value(aggregate.cpu_pct),
            mem_mb: format_value(aggregate.mem_mb),
            fps: format_value(aggregate.fps),
        }
    }
}

#[derive(Tabled)]
struct DeltaRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Before")]
    before: String,
    #[tabled(rename = "After")]
    after: String,
    #[tabled(rename = "Delta")]
    delta: String,
}

impl DeltaRow {
    fn from_delta(delta: &MetricDelta) -> Self {
        Self {
            metric: delta.metric.to_string(),
            before: format_value(delta.baseline_value),
            after: format_value(delta.final_value),
            delta: format_delta(delta.delta_pct),
        }
    }
}

#[derive(Tabled)]
struct WorkerRow {
    #[tabled(rename = "Worker")]
    worker_id: String,
    #[tabled(rename = "OK")]
    ok: u64,
    #[tabled(rename = "Degraded")]
    degraded: u64,
    #[tabled(rename = "Unreachable")]
    unreachable: u64,
    #[tabled(rename = "Last failure")]
    last_failure: String,
}

/// Format an optional mean, N/A when missing
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "N/A".to_string(),
    }
}

/// Format an optional percentage delta with its sign, N/A when missing
pub fn format_delta(delta: Option<f64>) -> String {
    match delta {
        Some(d) => format!("{:+.1}%", d),
        None => "N/A".to_string(),
    }
}

fn format_opt<T: ToString>(value: Option<T>, suffix: &str) -> String {
    value
        .map(|v| format!("{}{}", v.to_string(), suffix))
        .unwrap_or_else(|| "n/a".to_string())
}

fn table<T: Tabled>(rows: Vec<T>) -> String {
    Table::new(rows).with(Style::ascii()).to_string()
}

/// Render the human-readable report
pub fn render(summary: &RunSummary, analysis: &Analysis) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== Emulator Fleet Soak Test Report ===");
    let _ = writeln!(out, "Run ID:       {}", summary.run_id);
    let _ = writeln!(out, "Workload:     {} ({})", summary.workload, summary.mode);
    let _ = writeln!(
        out,
        "Started:      {}",
        format_opt(
            summary
                .started_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ""
        )
    );
    let _ = writeln!(
        out,
        "Duration:     {} configured, {} elapsed",
        format_opt(summary.configured_duration_secs, "s"),
        format_opt(summary.elapsed_secs.map(|s| format!("{:.1}", s)), "s")
    );
    let _ = writeln!(out, "Interval:     {}", format_opt(summary.interval_secs, "s"));
    let _ = writeln!(
        out,
        "Rounds:       {} of {} expected",
        summary.round_count,
        format_opt(summary.expected_round_count, "")
    );
    let _ = writeln!(out, "Workers:      {}", summary.worker_count);
    let status = match (summary.interrupted, summary.final_burst.rounds) {
        (false, _) => "completed".to_string(),
        (true, 0) => "INTERRUPTED (final burst skipped)".to_string(),
        (true, n) => format!("INTERRUPTED (final burst cut short after {} rounds)", n),
    };
    let _ = writeln!(out, "Status:       {}", status);
    let _ = writeln!(out, "Time series:  {}", summary.time_series_path.display());

    let _ = writeln!(out);
    let _ = writeln!(out, "Burst aggregates");
    let _ = writeln!(
        out,
        "{}",
        table(vec![
            BurstRow::from_aggregate(&summary.baseline),
            BurstRow::from_aggregate(&summary.final_burst),
        ])
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "Baseline vs final");
    let _ = writeln!(
        out,
        "{}",
        table(analysis.baseline_vs_final.iter().map(DeltaRow::from_delta).collect())
    );

    let _ = writeln!(out);
    if analysis.quarter_rounds > 0 {
        let _ = writeln!(
            out,
            "Trend: first vs last quarter ({} rounds each)",
            analysis.quarter_rounds
        );
    } else {
        let _ = writeln!(out, "Trend: first vs last quarter (too few rounds)");
    }
    let _ = writeln!(
        out,
        "{}",
        table(analysis.trend.iter().map(DeltaRow::from_delta).collect())
    );

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Degradation flags (threshold {:.1}%)",
        analysis.threshold_pct
    );
    if analysis.flags.is_empty() {
        let _ = writeln!(out, "  none");
    }
    for flag in &analysis.flags {
        let _ = writeln!(
            out,
            "  [{}] {} {}: {:.2} -> {:.2} ({:+.1}%)",
            flag.severity.to_string().to_uppercase(),
            flag.metric,
            flag.comparison,
            flag.baseline_value,
            flag.final_value,
            flag.delta_pct
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Probe outcomes by worker");
    if summary.failures_by_worker.is_empty() {
        let _ = writeln!(out, "  no probes recorded");
    } else {
        let rows = summary
            .failures_by_worker
            .iter()
            .map(|(worker_id, tally)| WorkerRow {
                worker_id: worker_id.clone(),
                ok: tally.ok,
                degraded: tally.degraded,
                unreachable: tally.unreachable,
                last_failure: tally.last_failure.clone().unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        let _ = writeln!(out, "{}", table(rows));
    }

    out
}
