//! End-to-end stress-test run
//!
//! Scale the fleet, wait for it, take a baseline burst, sample for the
//! sustained window, take a final burst, analyze and render the report.

use crate::analysis::{Analysis, DegradationAnalyzer, DEFAULT_THRESHOLD_PCT};
use crate::error::{FleetError, RecorderError, RunError};
use crate::fleet::{wait_for_fleet, FleetMode, FleetOrchestrator, FleetView};
use crate::health::{components, HealthRegistry, RunPhase};
use crate::models::{BurstAggregate, BurstPhase};
use crate::observability::{RunLogger, RunMetrics};
use crate::probe::{HealthProbe, ProbeLedger, WorkerTally};
use crate::recorder::{TimeSeriesProgress, TimeSeriesReader, TimeSeriesRecorder};
use crate::report::{render, RunSummary};
use crate::sampler::{run_burst, BurstConfig, RoundDriver, SustainedConfig, SustainedLoop};
use crate::shutdown::StopSignal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Parameters of one stress-test run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_id: String,
    pub workload: String,
    pub mode: FleetMode,
    pub fleet_size: u32,
    pub probe_timeout: Duration,
    pub sustained: SustainedConfig,
    pub bursts: BurstConfig,
    pub threshold_pct: f64,
    /// How long to wait for the fleet to reach `fleet_size`
    pub ready_timeout: Duration,
    pub ready_poll_interval: Duration,
    /// Where the time series is persisted, shown in the report
    pub time_series_path: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: format!("soak-{}", Utc::now().format("%Y%m%dT%H%M%SZ")),
            workload: "emulator".to_string(),
            mode: FleetMode::Kubernetes,
            fleet_size: 9,
            probe_timeout: Duration::from_secs(5),
            sustained: SustainedConfig::default(),
            bursts: BurstConfig::default(),
            threshold_pct: DEFAULT_THRESHOLD_PCT,
            ready_timeout: Duration::from_secs(300),
            ready_poll_interval: Duration::from_secs(1),
            time_series_path: PathBuf::from(crate::recorder::TIMESERIES_FILE),
        }
    }
}

/// Result of a completed (or interrupted) run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub analysis: Analysis,
    pub report: String,
}

/// Live snapshot of a run, served by the status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub run_id: String,
    pub phase: RunPhase,
    #[serde(flatten)]
    pub series: TimeSeriesProgress,
    pub by_worker: BTreeMap<String, WorkerTally>,
}

impl ProgressReport {
    /// Collect a snapshot without blocking the recorder
    pub async fn collect(
        run_id: &str,
        health: &HealthRegistry,
        reader: &TimeSeriesReader,
        ledger: &ProbeLedger,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            phase: health.phase().await,
            series: reader.snapshot().progress(),
            by_worker: ledger.snapshot(),
        }
    }
}

/// One stress-test run against a fleet
pub struct StressTest {
    config: RunConfig,
    orchestrator: Arc<dyn FleetOrchestrator>,
    probe: Arc<dyn HealthProbe>,
    recorder: TimeSeriesRecorder,
    ledger: Arc<ProbeLedger>,
    health: HealthRegistry,
    metrics: Option<RunMetrics>,
    logger: RunLogger,
}

impl StressTest {
    pub fn new(
        config: RunConfig,
        orchestrator: Arc<dyn FleetOrchestrator>,
        probe: Arc<dyn HealthProbe>,
        recorder: TimeSeriesRecorder,
    ) -> Self {
        let logger = RunLogger::new(config.run_id.clone());
        Self {
            config,
            orchestrator,
            probe,
            recorder,
            ledger: Arc::new(ProbeLedger::new()),
            health: HealthRegistry::new(),
            metrics: None,
            logger,
        }
    }

    /// Report component health and phase into a shared registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn with_metrics(mut self, metrics: RunMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Per-worker probe tallies, updated live during the run
    pub fn ledger(&self) -> Arc<ProbeLedger> {
        self.ledger.clone()
    }

    /// Live view of the sustained-window time series
    pub fn reader(&self) -> TimeSeriesReader {
        self.recorder.reader()
    }

    /// Execute the run until completion, failure, or shutdown
    ///
    /// A shutdown signal lets the in-flight round finish. Before sampling
    /// starts it ends the run with [`RunError::Interrupted`]; afterwards
    /// the remaining phases are skipped and a report marked interrupted is
    /// still produced.
    pub async fn run(mut self, shutdown: broadcast::Receiver<()>) -> Result<RunOutcome, RunError> {
        let mut stop = StopSignal::new(shutdown);
        let started_at = Utc::now();
        let started = Instant::now();
        let workload = self.config.workload.clone();

        let mut builder = SustainedLoop::builder()
            .config(self.config.sustained.clone())
            .logger(self.logger.clone());
        if let Some(metrics) = &self.metrics {
            builder = builder.metrics(metrics.clone());
        }
        let sustained = builder
            .build()
            .map_err(|e| RunError::InvalidConfig(e.to_string()))?;

        self.logger.log_startup(
            env!("CARGO_PKG_VERSION"),
            &workload,
            self.config.fleet_size,
            self.config.sustained.duration,
            self.config.sustained.interval,
        );
        self.health.register_defaults().await;
        self.health.set_phase(RunPhase::Scaling).await;

        let Some(workers) = self.bring_up_fleet(&mut stop).await? else {
            self.logger.log_interrupted(0);
            self.health.set_phase(RunPhase::Failed).await;
            return Err(RunError::Interrupted);
        };
        if let Some(metrics) = &self.metrics {
            metrics.set_fleet_size(workers.len());
        }

        let mut driver = RoundDriver::new(self.probe.clone(), self.config.probe_timeout)
            .with_ledger(self.ledger.clone());
        if let Some(metrics) = &self.metrics {
            driver = driver.with_metrics(metrics.clone());
        }
        let mut fleet = FleetView::new(self.orchestrator.clone(), workload.clone(), workers)
            .with_call_timeout(self.config.probe_timeout);

        // Baseline
        self.health.set_phase(RunPhase::Baseline).await;
        let baseline = run_burst(
            &driver,
            &mut fleet,
            BurstPhase::Baseline,
            self.config.bursts.baseline_rounds,
            self.config.bursts.interval,
            &mut stop,
        )
        .await;
        self.logger.log_burst(&baseline);
        if let Err(e) = self.recorder.record_burst(&baseline) {
            return Err(self.recorder_failed(e).await);
        }
        self.update_sampler_health().await;

        // Sustained window, skipped when the baseline was cut short
        if !stop.is_stopped() {
            self.health.set_phase(RunPhase::Sustained).await;
            if let Err(e) = sustained
                .run(&driver, &mut fleet, &mut self.recorder, &mut stop)
                .await
            {
                return Err(self.recorder_failed(e).await);
            }
            self.update_sampler_health().await;
        }

        // Final burst, empty when already stopped
        let final_burst = if stop.is_stopped() {
            BurstAggregate::empty(BurstPhase::Final)
        } else {
            self.health.set_phase(RunPhase::Final).await;
            let aggregate = run_burst(
                &driver,
                &mut fleet,
                BurstPhase::Final,
                self.config.bursts.final_rounds,
                self.config.bursts.interval,
                &mut stop,
            )
            .await;
            self.logger.log_burst(&aggregate);
            if let Err(e) = self.recorder.record_burst(&aggregate) {
                return Err(self.recorder_failed(e).await);
            }
            aggregate
        };
        let interrupted = stop.is_stopped();

        let health = self.health.clone();
        let series = match self.recorder.close() {
            Ok(series) => series,
            Err(e) => {
                health.set_unhealthy(components::RECORDER, e.to_string()).await;
                health.set_phase(RunPhase::Failed).await;
                return Err(e.into());
            }
        };
        if interrupted {
            self.logger.log_interrupted(series.len());
        }

        // Analysis and report
        health.set_phase(RunPhase::Analyzing).await;
        let analysis =
            DegradationAnalyzer::new(self.config.threshold_pct).analyze(&series, &baseline, &final_burst);
        for flag in &analysis.flags {
            self.logger.log_flag(flag);
        }
        if let Some(metrics) = &self.metrics {
            metrics.set_degradation_flags(analysis.flags.len());
        }

        let summary = RunSummary {
            run_id: self.config.run_id.clone(),
            workload,
            mode: self.config.mode.to_string(),
            started_at: Some(started_at),
            configured_duration_secs: Some(self.config.sustained.duration.as_secs()),
            interval_secs: Some(self.config.sustained.interval.as_secs()),
            elapsed_secs: Some(started.elapsed().as_secs_f64()),
            round_count: series.len(),
            expected_round_count: Some(self.config.sustained.expected_round_count()),
            worker_count: series.worker_count(),
            time_series_path: self.config.time_series_path.clone(),
            baseline,
            final_burst,
            failures_by_worker: self.ledger.snapshot(),
            interrupted,
        };
        let report = render(&summary, &analysis);

        health.set_phase(RunPhase::Finished).await;
        self.logger.log_finished(series.len(), analysis.flags.len());

        Ok(RunOutcome {
            summary,
            analysis,
            report,
        })
    }

    /// Scale and wait for the fleet; `Ok(None)` when stopped first
    async fn bring_up_fleet(
        &self,
        stop: &mut StopSignal,
    ) -> Result<Option<Vec<crate::models::Worker>>, RunError> {
        let workload = &self.config.workload;

        let scaled = tokio::select! {
            biased;
            _ = stop.recv() => return Ok(None),
            scaled = self.orchestrator.scale(workload, self.config.fleet_size) => scaled,
        };
        if let Err(e) = scaled {
            return Err(self.orchestrator_failed(e).await);
        }
        self.logger.log_fleet_scaled(workload, self.config.fleet_size);

        let waiting = Instant::now();
        match wait_for_fleet(
            self.orchestrator.as_ref(),
            workload,
            self.config.fleet_size,
            self.config.ready_timeout,
            self.config.ready_poll_interval,
            stop,
        )
        .await
        {
            Ok(Some(workers)) => {
                self.logger
                    .log_fleet_ready(workload, workers.len(), waiting.elapsed());
                Ok(Some(workers))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(self.orchestrator_failed(e).await),
        }
    }

    async fn orchestrator_failed(&self, error: FleetError) -> RunError {
        self.health
            .set_unhealthy(components::ORCHESTRATOR, error.to_string())
            .await;
        self.health.set_phase(RunPhase::Failed).await;
        match error {
            FleetError::ScaleFailed { .. } | FleetError::NotReady { .. } => {
                RunError::OrchestratorScaleFailure(error)
            }
            FleetError::ListFailed { .. } | FleetError::Client(_) => {
                RunError::OrchestratorUnavailable(error)
            }
        }
    }

    async fn recorder_failed(&self, error: RecorderError) -> RunError {
        self.health
            .set_unhealthy(components::RECORDER, error.to_string())
            .await;
        self.health.set_phase(RunPhase::Failed).await;
        RunError::TimeSeriesWriteFailure(error)
    }

    async fn update_sampler_health(&self) {
        let tallies = self.ledger.snapshot();
        let failing = tallies.values().filter(|t| t.unreachable > 0).count();
        if failing == 0 {
            self.health.set_healthy(components::SAMPLER).await;
        } else if failing == tallies.len() {
            self.health
                .set_unhealthy(components::SAMPLER, "every worker has unreachable probes")
                .await;
        } else {
            self.health
                .set_degraded(
                    components::SAMPLER,
                    format!("{} of {} workers had unreachable probes", failing, tallies.len()),
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::fleet::testing::MockFleet;
    use crate::fleet::StaticFleet;
    use crate::models::{SampleStatus, Worker};
    use crate::probe::{HttpHealthClient, WorkerHealth};
    use crate::recorder::testing::MemorySink;
    use crate::recorder::{load_run, CsvSink};
    use async_trait::async_trait;

    struct SteadyProbe;

    #[async_trait]
    impl HealthProbe for SteadyProbe {
        async fn fetch(&self, _worker: &Worker, _timeout: Duration) -> Result<WorkerHealth, ProbeError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(WorkerHealth {
                cpu_pct: 25.0,
                mem_mb: 700.0,
                fps: 30.0,
                status: SampleStatus::Ok,
            })
        }
    }

    fn config(duration: Duration, interval: Duration, fleet_size: u32) -> RunConfig {
        RunConfig {
            run_id: "run-test".to_string(),
            mode: FleetMode::Static,
            fleet_size,
            probe_timeout: Duration::from_secs(5),
            sustained: SustainedConfig {
                duration,
                interval,
                termination_check_every: 5,
            },
            bursts: BurstConfig {
                baseline_rounds: 3,
                final_rounds: 3,
                interval: Duration::from_secs(2),
            },
            ready_timeout: Duration::from_secs(30),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_workers_for_a_minute() {
        let fleet = Arc::new(MockFleet::with_workers(3));
        let sink = MemorySink::default();
        let health = HealthRegistry::new();
        let (_tx, rx) = broadcast::channel(1);

        let test = StressTest::new(
            config(Duration::from_secs(60), Duration::from_secs(10), 3),
            fleet.clone(),
            Arc::new(SteadyProbe),
            TimeSeriesRecorder::new(Box::new(sink.clone())),
        )
        .with_health(health.clone());

        let outcome = test.run(rx).await.unwrap();

        assert_eq!(*fleet.scaled_to.lock().unwrap(), Some(3));
        assert_eq!(outcome.summary.round_count, 6);
        assert_eq!(outcome.summary.expected_round_count, Some(6));
        let rounds = sink.rounds.lock().unwrap();
        assert_eq!(rounds.len(), 6);
        assert!(rounds.iter().all(|r| r.samples.len() == 3));
        assert_eq!(sink.bursts.lock().unwrap().len(), 2);
        assert!(outcome.analysis.flags.is_empty());
        assert!(!outcome.summary.interrupted);
        assert_eq!(health.phase().await, RunPhase::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scale_failure_is_fatal_before_sampling() {
        let fleet = Arc::new(MockFleet {
            fail_scale: true,
            ..MockFleet::with_workers(3)
        });
        let sink = MemorySink::default();
        let health = HealthRegistry::new();
        let (_tx, rx) = broadcast::channel(1);

        let result = StressTest::new(
            config(Duration::from_secs(60), Duration::from_secs(10), 3),
            fleet,
            Arc::new(SteadyProbe),
            TimeSeriesRecorder::new(Box::new(sink.clone())),
        )
        .with_health(health.clone())
        .run(rx)
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RunError::OrchestratorScaleFailure(_)));
        assert_ne!(err.exit_code(), 0);
        assert!(sink.rounds.lock().unwrap().is_empty());
        assert_eq!(health.phase().await, RunPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fleet_that_never_fills_is_a_scale_failure() {
        let fleet = Arc::new(MockFleet::with_workers(2));
        let (_tx, rx) = broadcast::channel(1);

        let result = StressTest::new(
            config(Duration::from_secs(60), Duration::from_secs(10), 3),
            fleet,
            Arc::new(SteadyProbe),
            TimeSeriesRecorder::new(Box::new(MemorySink::default())),
        )
        .run(rx)
        .await;

        assert!(matches!(
            result,
            Err(RunError::OrchestratorScaleFailure(FleetError::NotReady { observed: 2, .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_aborts_run() {
        let sink = MemorySink {
            fail_after: Some(2),
            ..Default::default()
        };
        let (_tx, rx) = broadcast::channel(1);

        let result = StressTest::new(
            config(Duration::from_secs(60), Duration::from_secs(10), 2),
            Arc::new(MockFleet::with_workers(2)),
            Arc::new(SteadyProbe),
            TimeSeriesRecorder::new(Box::new(sink.clone())),
        )
        .run(rx)
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RunError::TimeSeriesWriteFailure(_)));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(sink.rounds.lock().unwrap().len(), 2);
    }

    fn stress_test(config: RunConfig, fleet: Arc<MockFleet>, sink: &MemorySink) -> StressTest {
        StressTest::new(
            config,
            fleet,
            Arc::new(SteadyProbe),
            TimeSeriesRecorder::new(Box::new(sink.clone())),
        )
    }

    async fn send_after(tx: &broadcast::Sender<()>, delay: Duration) {
        tokio::time::sleep(delay).await;
        tx.send(()).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_before_start_skips_scaling() {
        let fleet = Arc::new(MockFleet::with_workers(2));
        let sink = MemorySink::default();
        let health = HealthRegistry::new();
        let (tx, rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        let result = stress_test(config(Duration::from_secs(60), Duration::from_secs(10), 2), fleet.clone(), &sink)
            .with_health(health.clone())
            .run(rx)
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RunError::Interrupted));
        assert_eq!(err.exit_code(), 130);
        assert_eq!(*fleet.scaled_to.lock().unwrap(), None);
        assert!(sink.bursts.lock().unwrap().is_empty());
        assert_eq!(health.phase().await, RunPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_while_waiting_for_fleet_returns_promptly() {
        let sink = MemorySink::default();
        let (tx, rx) = broadcast::channel(1);
        let mut run_config = config(Duration::from_secs(60), Duration::from_secs(10), 3);
        run_config.ready_timeout = Duration::from_secs(300);
        let started = Instant::now();

        let (result, _) = tokio::join!(
            stress_test(run_config, Arc::new(MockFleet::with_workers(2)), &sink).run(rx),
            send_after(&tx, Duration::from_secs(1))
        );

        assert!(matches!(result, Err(RunError::Interrupted)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(sink.rounds.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_baseline_skips_remaining_phases() {
        let sink = MemorySink::default();
        let (tx, rx) = broadcast::channel(1);

        // Baseline rounds start at 0s, 2s and 4s
        let (outcome, _) = tokio::join!(
            stress_test(config(Duration::from_secs(60), Duration::from_secs(10), 2), Arc::new(MockFleet::with_workers(2)), &sink)
                .run(rx),
            send_after(&tx, Duration::from_secs(3))
        );
        let outcome = outcome.unwrap();

        assert!(outcome.summary.interrupted);
        assert_eq!(outcome.summary.baseline.rounds, 2);
        assert_eq!(outcome.summary.round_count, 0);
        assert_eq!(outcome.summary.final_burst.rounds, 0);
        assert!(sink.rounds.lock().unwrap().is_empty());
        assert_eq!(sink.bursts.lock().unwrap().len(), 1);
        assert!(outcome.report.contains("INTERRUPTED (final burst skipped)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_sustained_skips_final_burst() {
        let sink = MemorySink::default();
        let (tx, rx) = broadcast::channel(1);

        // Sustained rounds start around 4.2s, 14.2s, 24.2s...
        let (outcome, _) = tokio::join!(
            stress_test(config(Duration::from_secs(60), Duration::from_secs(10), 2), Arc::new(MockFleet::with_workers(2)), &sink)
                .run(rx),
            send_after(&tx, Duration::from_secs(20))
        );
        let outcome = outcome.unwrap();

        assert!(outcome.summary.interrupted);
        assert_eq!(outcome.summary.baseline.rounds, 3);
        assert_eq!(outcome.summary.round_count, 2);
        assert_eq!(outcome.summary.final_burst.rounds, 0);
        assert_eq!(outcome.summary.final_burst.cpu_pct, None);
        assert_eq!(sink.bursts.lock().unwrap().len(), 1);
        assert!(outcome.report.contains("INTERRUPTED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_final_burst_marks_report() {
        let sink = MemorySink::default();
        let (tx, rx) = broadcast::channel(1);

        // The final burst starts around 54.4s with rounds 2s apart
        let (outcome, _) = tokio::join!(
            stress_test(config(Duration::from_secs(60), Duration::from_secs(10), 2), Arc::new(MockFleet::with_workers(2)), &sink)
                .run(rx),
            send_after(&tx, Duration::from_secs(55))
        );
        let outcome = outcome.unwrap();

        assert!(outcome.summary.interrupted);
        assert_eq!(outcome.summary.round_count, 6);
        assert_eq!(outcome.summary.final_burst.rounds, 1);
        assert_eq!(outcome.summary.final_burst.cpu_pct, Some(25.0));
        assert_eq!(sink.bursts.lock().unwrap().len(), 2);
        assert!(outcome.report.contains("INTERRUPTED (final burst cut short after 1 rounds)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_cadence_is_rejected_before_scaling() {
        let fleet = Arc::new(MockFleet::with_workers(2));
        let sink = MemorySink::default();
        let (_tx, rx) = broadcast::channel(1);

        let result = stress_test(config(Duration::from_secs(5), Duration::from_secs(10), 2), fleet.clone(), &sink)
            .run(rx)
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RunError::InvalidConfig(_)));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(*fleet.scaled_to.lock().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_orchestrator_listing_does_not_stall_rounds() {
        let fleet = Arc::new(MockFleet::with_workers(2));
        let sink = MemorySink::default();
        let (_tx, rx) = broadcast::channel(1);
        let test = stress_test(config(Duration::from_secs(60), Duration::from_secs(10), 2), fleet.clone(), &sink);

        // The orchestrator answers until the fleet is up, then hangs forever
        let hang = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            *fleet.delay.lock().unwrap() = Some(Duration::from_secs(3600));
        };
        let (outcome, _) = tokio::join!(test.run(rx), hang);
        let outcome = outcome.unwrap();

        assert_eq!(outcome.summary.round_count, 6);
        let rounds = sink.rounds.lock().unwrap();
        assert!(rounds.iter().all(|r| r.samples.len() == 2));
        assert!(rounds.iter().all(|r| !r.annotations.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_report_reflects_recorded_rounds() {
        let health = HealthRegistry::new();
        let (_tx, rx) = broadcast::channel(1);
        let test = StressTest::new(
            config(Duration::from_secs(30), Duration::from_secs(10), 2),
            Arc::new(MockFleet::with_workers(2)),
            Arc::new(SteadyProbe),
            TimeSeriesRecorder::new(Box::new(MemorySink::default())),
        )
        .with_health(health.clone());
        let reader = test.reader();
        let ledger = test.ledger();

        test.run(rx).await.unwrap();
        let progress = ProgressReport::collect("run-test", &health, &reader, &ledger).await;

        assert_eq!(progress.phase, RunPhase::Finished);
        assert_eq!(progress.series.rounds, 3);
        assert_eq!(progress.series.samples, 6);
        // 3 baseline + 3 sustained + 3 final rounds per worker
        assert_eq!(progress.by_worker["emu-0"].ok, 9);

        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["rounds"], 3);
        assert_eq!(json["phase"], "finished");
    }

    #[tokio::test]
    async fn test_failing_worker_is_unreachable_and_run_completes() {
        let mut server = mockito::Server::new_async().await;
        let healthy = r#"{
            "overall_status": "healthy",
            "video": {"frame_rate": 30},
            "performance": {"cpu_usage_percent": 35.0, "memory_mb": 900}
        }"#;
        let _ok_0 = server
            .mock("GET", "/w0/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(healthy)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/w1/health")
            .with_status(500)
            .create_async()
            .await;
        let _ok_2 = server
            .mock("GET", "/w2/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(healthy)
            .create_async()
            .await;

        let endpoints = (0..3)
            .map(|i| format!("{}/w{}/health", server.url(), i))
            .collect();
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::create(dir.path()).unwrap();
        let (_tx, rx) = broadcast::channel(1);

        let mut run_config = config(Duration::from_millis(600), Duration::from_millis(200), 3);
        run_config.probe_timeout = Duration::from_secs(2);
        run_config.bursts = BurstConfig {
            baseline_rounds: 2,
            final_rounds: 2,
            interval: Duration::from_millis(50),
        };
        run_config.ready_poll_interval = Duration::from_millis(10);
        run_config.time_series_path = dir.path().join(crate::recorder::TIMESERIES_FILE);

        let outcome = StressTest::new(
            run_config,
            Arc::new(StaticFleet::new(endpoints)),
            Arc::new(HttpHealthClient::new().unwrap()),
            TimeSeriesRecorder::new(Box::new(sink)),
        )
        .run(rx)
        .await
        .unwrap();

        let loaded = load_run(dir.path()).unwrap();
        assert_eq!(loaded.series.len(), outcome.summary.round_count);
        assert!(!loaded.series.is_empty());
        for round in loaded.series.rounds() {
            assert_eq!(round.samples.len(), 3);
            for sample in &round.samples {
                let expected = if sample.worker_id == "emulator-1" {
                    SampleStatus::Unreachable
                } else {
                    SampleStatus::Ok
                };
                assert_eq!(sample.status, expected, "worker {}", sample.worker_id);
            }
        }

        let broken = &outcome.summary.failures_by_worker["emulator-1"];
        assert_eq!(broken.ok, 0);
        assert!(broken.unreachable > 0);
        assert_eq!(broken.last_failure.as_deref(), Some("probe_unreachable"));
        assert_eq!(outcome.summary.failures_by_worker["emulator-0"].unreachable, 0);
        assert!(outcome.report.contains("emulator-1"));
        assert!(outcome.report.contains("Baseline vs final"));
    }
}
