//! Observability infrastructure for soak runs
//!
//! Provides:
//! - Prometheus metrics (probe latency, round duration, failures by kind, fleet size)
//! - Structured JSON logging with tracing

use crate::analysis::DegradationFlag;
use crate::models::{BurstAggregate, Round};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Histogram buckets for probe and round latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RunMetricsInner> = OnceLock::new();

struct RunMetricsInner {
    probe_latency_seconds: Histogram,
    round_duration_seconds: Histogram,
    rounds_recorded: IntCounter,
    probe_failures: IntCounterVec,
    fleet_size: IntGauge,
    degradation_flags: IntGauge,
}

impl RunMetricsInner {
    fn new() -> Self {
        Self {
            probe_latency_seconds: register_histogram!(
                "soak_probe_latency_seconds",
                "Time spent waiting for one worker health probe",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register probe_latency_seconds"),

            round_duration_seconds: register_histogram!(
                "soak_round_duration_seconds",
                "Time from round dispatch until every probe resolved",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register round_duration_seconds"),

            rounds_recorded: register_int_counter!(
                "soak_rounds_recorded_total",
                "Number of sustained-load rounds appended to the time series"
            )
            .expect("Failed to register rounds_recorded"),

            probe_failures: register_int_counter_vec!(
                "soak_probe_failures_total",
                "Number of failed health probes by failure kind",
                &["kind"]
            )
            .expect("Failed to register probe_failures"),

            fleet_size: register_int_gauge!(
                "soak_fleet_size",
                "Number of workers probed in the latest round"
            )
            .expect("Failed to register fleet_size"),

            degradation_flags: register_int_gauge!(
                "soak_degradation_flags",
                "Number of degradation flags raised by the last analysis"
            )
            .expect("Failed to register degradation_flags"),
        }
    }
}

/// Run metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct RunMetrics {
    _private: (),
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RunMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RunMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_probe_latency(&self, elapsed: Duration) {
        self.inner()
            .probe_latency_seconds
            .observe(elapsed.as_secs_f64());
    }

    pub fn observe_round_duration(&self, elapsed: Duration) {
        self.inner()
            .round_duration_seconds
            .observe(elapsed.as_secs_f64());
    }

    pub fn inc_rounds_recorded(&self) {
        self.inner().rounds_recorded.inc();
    }

    pub fn inc_probe_failure(&self, kind: &str) {
        self.inner()
            .probe_failures
            .with_label_values(&[kind])
            .inc();
    }

    pub fn set_fleet_size(&self, workers: usize) {
        self.inner().fleet_size.set(workers as i64);
    }

    pub fn set_degradation_flags(&self, count: usize) {
        self.inner().degradation_flags.set(count as i64);
    }
}

/// Structured logger for run lifecycle events
#[derive(Clone)]
pub struct RunLogger {
    run_id: String,
}

impl RunLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Log run startup
    pub fn log_startup(
        &self,
        version: &str,
        workload: &str,
        fleet_size: u32,
        duration: Duration,
        interval: Duration,
    ) {
        info!(
            event = "run_started",
            run_id = %self.run_id,
            version = %version,
            workload = %workload,
            fleet_size = fleet_size,
            duration_secs = duration.as_secs(),
            interval_secs = interval.as_secs(),
            "Soak run started"
        );
    }

    pub fn log_fleet_scaled(&self, workload: &str, replicas: u32) {
        info!(
            event = "fleet_scaled",
            run_id = %self.run_id,
            workload = %workload,
            replicas = replicas,
            "Fleet scale requested"
        );
    }

    pub fn log_fleet_ready(&self, workload: &str, workers: usize, waited: Duration) {
        info!(
            event = "fleet_ready",
            run_id = %self.run_id,
            workload = %workload,
            workers = workers,
            waited_ms = waited.as_millis() as u64,
            "Fleet reached target size"
        );
    }

    pub fn log_burst(&self, aggregate: &BurstAggregate) {
        info!(
            event = "burst_complete",
            run_id = %self.run_id,
            phase = %aggregate.phase,
            rounds = aggregate.rounds,
            samples = aggregate.samples,
            failures = aggregate.failures,
            cpu_pct = ?aggregate.cpu_pct,
            mem_mb = ?aggregate.mem_mb,
            fps = ?aggregate.fps,
            "Burst complete"
        );
    }

    pub fn log_round(&self, round: &Round, elapsed: Duration) {
        debug!(
            event = "round_complete",
            run_id = %self.run_id,
            round = round.index,
            workers = round.samples.len(),
            unreachable = round.unreachable_count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Round complete"
        );
    }

    pub fn log_worker_terminated(&self, worker_id: &str, reason: &str) {
        warn!(
            event = "worker_terminated",
            run_id = %self.run_id,
            worker_id = %worker_id,
            reason = %reason,
            "Worker terminated abnormally"
        );
    }

    pub fn log_flag(&self, flag: &DegradationFlag) {
        warn!(
            event = "degradation_flagged",
            run_id = %self.run_id,
            metric = %flag.metric,
            comparison = %flag.comparison,
            baseline_value = flag.baseline_value,
            final_value = flag.final_value,
            delta_pct = flag.delta_pct,
            severity = %flag.severity,
            "Degradation detected"
        );
    }

    pub fn log_finished(&self, rounds: usize, flags: usize) {
        info!(
            event = "run_finished",
            run_id = %self.run_id,
            rounds = rounds,
            flags = flags,
            "Soak run finished"
        );
    }

    pub fn log_interrupted(&self, rounds: usize) {
        warn!(
            event = "run_interrupted",
            run_id = %self.run_id,
            rounds = rounds,
            "Soak run interrupted, finishing with partial data"
        );
    }
}
