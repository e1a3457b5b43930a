//! Worker health probing
//!
//! A probe issues one bounded request to a worker's health endpoint. Every
//! failure is absorbed into an `unreachable` sample so a round always has
//! one sample per worker.

mod http;
mod ledger;
mod payload;

pub use http::HttpHealthClient;
pub use ledger::{ProbeLedger, WorkerTally};
pub use payload::{parse_health_payload, WorkerHealth};

use crate::error::ProbeError;
use crate::models::{Sample, Worker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

/// Trait for worker health probe implementations
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Fetch and parse one worker's health, bounded by `timeout`
    async fn fetch(&self, worker: &Worker, timeout: Duration) -> Result<WorkerHealth, ProbeError>;

    /// Probe a worker; never fails, failures become an unreachable sample
    async fn probe(&self, worker: &Worker, timeout: Duration) -> Sample {
        let timestamp = Utc::now();
        let outcome = self.fetch(worker, timeout).await;
        if let Err(e) = &outcome {
            log_probe_failure(worker, e);
        }
        sample_from_outcome(worker, timestamp, outcome)
    }
}

/// Convert a probe outcome into the sample recorded for it
pub fn sample_from_outcome(
    worker: &Worker,
    timestamp: DateTime<Utc>,
    outcome: Result<WorkerHealth, ProbeError>,
) -> Sample {
    match outcome {
        Ok(health) => Sample {
            timestamp,
            worker_id: worker.id.clone(),
            cpu_pct: health.cpu_pct,
            mem_mb: health.mem_mb,
            fps: health.fps,
            status: health.status,
        },
        Err(_) => Sample::unreachable(worker.id.clone(), timestamp),
    }
}

pub(crate) fn log_probe_failure(worker: &Worker, error: &ProbeError) {
    warn!(
        event = "probe_failed",
        worker_id = %worker.id,
        endpoint = %worker.endpoint,
        kind = error.kind(),
        error = %error,
        "Health probe failed"
    );
}
