//! Sampling rounds
//!
//! A round probes every worker known at dispatch concurrently and always
//! yields exactly one sample per worker. Bursts and the sustained-load loop
//! are both built from rounds issued by one [`RoundDriver`], so round
//! indices are monotonic across the whole run.

mod burst;
mod sustained;


pub use burst::{run_burst, BurstConfig};
pub use sustained::{SustainedConfig, SustainedLoop, SustainedLoopBuilder, SustainedOutcome};

use crate::error::ProbeError;
use crate::models::{Round, Sample, SampleStatus, Worker};
use crate::observability::RunMetrics;
use crate::probe::{log_probe_failure, sample_from_outcome, HealthProbe, ProbeLedger};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Extra time a round waits beyond the probe timeout before giving up on a probe
pub const ROUND_SLACK: Duration = Duration::from_millis(250);

/// Issues rounds of concurrent health probes
pub struct RoundDriver {
    probe: Arc<dyn HealthProbe>,
    timeout: Duration,
    next_index: AtomicU64,
    epoch: Instant,
    ledger: Arc<ProbeLedger>,
    metrics: Option<RunMetrics>,
}

impl RoundDriver {
    /// Create a new round driver with a fresh ledger
    pub fn new(probe: Arc<dyn HealthProbe>, timeout: Duration) -> Self {
        Self {
            probe,
            timeout,
            next_index: AtomicU64::new(0),
            epoch: Instant::now(),
            ledger: Arc::new(ProbeLedger::new()),
            metrics: None,
        }
    }

    /// Share an existing ledger
    pub fn with_ledger(mut self, ledger: Arc<ProbeLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_metrics(mut self, metrics: RunMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn ledger(&self) -> &Arc<ProbeLedger> {
        &self.ledger
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Index the next round will receive
    pub fn next_index(&self) -> u64 {
        self.next_index.load(Ordering::SeqCst)
    }

    /// Probe every worker once and collect one sample per worker
    ///
    /// Completes within `timeout + ROUND_SLACK` regardless of stuck probes.
    pub async fn run_round(&self, fleet: &[Worker]) -> Round {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let dispatched_at = Utc::now();
        let started = Instant::now();
        let offset = started.saturating_duration_since(self.epoch);

        let handles: Vec<_> = fleet
            .iter()
            .cloned()
            .map(|worker| {
                let probe = self.probe.clone();
                let ledger = self.ledger.clone();
                let metrics = self.metrics.clone();
                let timeout = self.timeout;

                tokio::spawn(async move {
                    let probe_start = Instant::now();
                    let outcome =
                        match tokio::time::timeout(timeout + ROUND_SLACK, probe.fetch(&worker, timeout))
                            .await
                        {
                            Ok(outcome) => outcome,
                            Err(_) => Err(ProbeError::Timeout {
                                timeout_ms: timeout.as_millis() as u64,
                            }),
                        };

                    if let Some(metrics) = &metrics {
                        metrics.observe_probe_latency(probe_start.elapsed());
                    }

                    match &outcome {
                        Ok(health) => ledger.record(&worker.id, health.status, None),
                        Err(e) => {
                            log_probe_failure(&worker, e);
                            ledger.record(&worker.id, SampleStatus::Unreachable, Some(e.kind()));
                            if let Some(metrics) = &metrics {
                                metrics.inc_probe_failure(e.kind());
                            }
                        }
                    }

                    sample_from_outcome(&worker, dispatched_at, outcome)
                })
            })
            .collect();

        let mut samples = Vec::with_capacity(fleet.len());
        for (worker, handle) in fleet.iter().zip(handles) {
            match handle.await {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    warn!(worker_id = %worker.id, error = %e, "Probe task aborted");
                    self.ledger.record(
                        &worker.id,
                        SampleStatus::Unreachable,
                        Some("probe_unreachable"),
                    );
                    samples.push(Sample::unreachable(worker.id.clone(), dispatched_at));
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.observe_round_duration(started.elapsed());
            metrics.set_fleet_size(fleet.len());
        }

        Round {
            index,
            dispatched_at,
            offset,
            samples,
            annotations: Vec::new(),
        }
    }
}
