//! Per-worker probe outcome tallies
//!
//! Updated concurrently by every probe task; read by the report and the
//! live progress endpoint.

use crate::models::SampleStatus;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome counts for one worker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTally {
    pub ok: u64,
    pub degraded: u64,
    pub unreachable: u64,
    /// Failure kind of the most recent unreachable probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<String>,
}

impl WorkerTally {
    pub fn total(&self) -> u64 {
        self.ok + self.degraded + self.unreachable
    }
}

/// Registry of probe outcomes keyed by worker id
#[derive(Debug, Default)]
pub struct ProbeLedger {
    tallies: DashMap<String, WorkerTally>,
}

impl ProbeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one probe outcome
    pub fn record(&self, worker_id: &str, status: SampleStatus, failure_kind: Option<&str>) {
        let mut entry = self.tallies.entry(worker_id.to_string()).or_default();
        match status {
            SampleStatus::Ok => entry.ok += 1,
            SampleStatus::Degraded => entry.degraded += 1,
            SampleStatus::Unreachable => {
                entry.unreachable += 1;
                entry.last_failure = failure_kind.map(str::to_string);
            }
        }
    }

    /// Get the tally for one worker
    pub fn get(&self, worker_id: &str) -> Option<WorkerTally> {
        self.tallies.get(worker_id).map(|r| r.clone())
    }

    /// Sorted copy of every tally
    pub fn snapshot(&self) -> BTreeMap<String, WorkerTally> {
        self.tallies
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    /// Total unreachable probes across the fleet
    pub fn total_unreachable(&self) -> u64 {
        self.tallies.iter().map(|r| r.value().unreachable).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }
}
