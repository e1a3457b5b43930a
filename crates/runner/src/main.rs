//! Soak runner - sustained-load stress test for an emulator fleet
//!
//! Scales the fleet, samples every worker for the configured window,
//! writes the time series and report into a run directory and serves live
//! status while it runs.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use soak_lib::{
    fleet::create_orchestrator,
    health::HealthRegistry,
    observability::RunMetrics,
    probe::HttpHealthClient,
    recorder::{CsvSink, TimeSeriesRecorder},
    report::{REPORT_FILE, SUMMARY_FILE},
    RecorderError, RunError, RunOutcome, StressTest,
};
use soak_runner::{
    api,
    config::{Args, LogFormat, RunnerConfig},
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init(),
    }
}

fn write_outputs(run_dir: &Path, outcome: &RunOutcome) -> Result<(), RecorderError> {
    std::fs::write(run_dir.join(REPORT_FILE), &outcome.report)?;
    let summary = serde_json::to_vec_pretty(&outcome.summary).map_err(std::io::Error::from)?;
    std::fs::write(run_dir.join(SUMMARY_FILE), summary)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting soak-runner");

    let config = RunnerConfig::from_args(&args)?;
    let mode = config.fleet_mode()?;

    let run_id = format!("soak-{}", Utc::now().format("%Y%m%dT%H%M%SZ"));
    let run_dir = config.output_dir.join(&run_id);
    let run_config = config.run_config(&run_id, &run_dir)?;
    info!(
        run_id = %run_id,
        mode = %mode,
        run_dir = %run_dir.display(),
        "Runner configured"
    );

    let sink = match CsvSink::create(&run_dir) {
        Ok(sink) => sink,
        Err(e) => {
            let e = RunError::TimeSeriesWriteFailure(e);
            error!(error = %e, "Cannot open time series");
            std::process::exit(e.exit_code());
        }
    };

    let orchestrator = match create_orchestrator(mode, config.fleet_settings()).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            let e = RunError::OrchestratorUnavailable(e);
            error!(error = %e, "Cannot reach fleet orchestrator");
            std::process::exit(e.exit_code());
        }
    };
    let probe = Arc::new(HttpHealthClient::new()?);

    // Initialize health registry and metrics
    let health_registry = HealthRegistry::new();
    let metrics = RunMetrics::new();

    let test = StressTest::new(
        run_config,
        orchestrator,
        probe,
        TimeSeriesRecorder::new(Box::new(sink)),
    )
    .with_health(health_registry.clone())
    .with_metrics(metrics.clone());

    // Start status API
    let app_state = Arc::new(api::AppState::new(
        run_id.clone(),
        health_registry,
        metrics,
        test.reader(),
        test.ledger(),
    ));
    let api_port = config.api_port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, app_state).await {
            warn!(error = %e, "Status API stopped");
        }
    });

    // First interrupt finishes the in-flight round and reports, a second one exits
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, stopping after the current round");
            let _ = shutdown_tx.send(());
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second SIGINT received, exiting immediately");
            std::process::exit(RunError::Interrupted.exit_code());
        }
    });

    let outcome = match test.run(shutdown_rx).await {
        Ok(outcome) => outcome,
        Err(e @ RunError::Interrupted) => {
            warn!(exit_code = e.exit_code(), "Soak run stopped before sampling, no report written");
            std::process::exit(e.exit_code());
        }
        Err(e) => {
            error!(error = %e, exit_code = e.exit_code(), "Soak run failed");
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = write_outputs(&run_dir, &outcome) {
        let e = RunError::TimeSeriesWriteFailure(e);
        error!(error = %e, run_dir = %run_dir.display(), "Failed to persist report");
        std::process::exit(e.exit_code());
    }

    println!("{}", outcome.report);
    info!(
        run_dir = %run_dir.display(),
        flags = outcome.analysis.flags.len(),
        "Soak run complete"
    );

    Ok(())
}
