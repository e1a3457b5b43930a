//! Core data models for the soak test engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One emulator instance exposing a health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    /// Full URL of the worker's health endpoint
    pub endpoint: String,
}

impl Worker {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Outcome classification of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleStatus {
    Ok,
    Degraded,
    Unreachable,
}

impl SampleStatus {
    /// Returns true if the sample carries real metric values
    pub fn is_reachable(&self) -> bool {
        !matches!(self, SampleStatus::Unreachable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleStatus::Ok => "ok",
            SampleStatus::Degraded => "degraded",
            SampleStatus::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One worker's parsed health metrics for one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub worker_id: String,
    pub cpu_pct: f64,
    pub mem_mb: f64,
    pub fps: f64,
    pub status: SampleStatus,
}

impl Sample {
    /// Sample emitted when a probe fails; metrics are zeroed
    pub fn unreachable(worker_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            worker_id: worker_id.into(),
            cpu_pct: 0.0,
            mem_mb: 0.0,
            fps: 0.0,
            status: SampleStatus::Unreachable,
        }
    }

    /// Value of the given metric
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::CpuPct => self.cpu_pct,
            Metric::MemMb => self.mem_mb,
            Metric::Fps => self.fps,
        }
    }
}

/// Advisory out-of-band signal attached to a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundAnnotation {
    /// Worker the signal refers to, empty for fleet-level signals
    pub worker_id: String,
    pub reason: String,
}

/// One synchronized probe of every worker known at round start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub index: u64,
    /// Wall-clock time captured at dispatch
    pub dispatched_at: DateTime<Utc>,
    /// Monotonic offset of the dispatch from the driver's epoch
    #[serde(with = "duration_millis")]
    pub offset: Duration,
    pub samples: Vec<Sample>,
    #[serde(default)]
    pub annotations: Vec<RoundAnnotation>,
}

impl Round {
    /// Samples carrying real metric values
    pub fn reachable(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(|s| s.status.is_reachable())
    }

    pub fn unreachable_count(&self) -> usize {
        self.samples
            .iter()
            .filter(|s| !s.status.is_reachable())
            .count()
    }
}

/// Health metrics tracked for degradation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CpuPct,
    MemMb,
    Fps,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::CpuPct, Metric::MemMb, Metric::Fps];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::CpuPct => "cpu_pct",
            Metric::MemMb => "mem_mb",
            Metric::Fps => "fps",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which burst an aggregate summarizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurstPhase {
    Baseline,
    Final,
}

impl fmt::Display for BurstPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BurstPhase::Baseline => write!(f, "baseline"),
            BurstPhase::Final => write!(f, "final"),
        }
    }
}

/// Mean metric values over one burst
///
/// A `None` mean is reported as N/A: the burst had no reachable samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurstAggregate {
    pub phase: BurstPhase,
    pub timestamp: DateTime<Utc>,
    pub rounds: usize,
    pub samples: usize,
    pub failures: usize,
    pub cpu_pct: Option<f64>,
    pub mem_mb: Option<f64>,
    pub fps: Option<f64>,
}

impl BurstAggregate {
    /// Reduce the samples of a burst's rounds into per-metric means
    ///
    /// Unreachable samples are excluded from the denominator and counted
    /// as failures instead.
    pub fn from_rounds(phase: BurstPhase, rounds: &[Round]) -> Self {
        let timestamp = rounds
            .first()
            .map(|r| r.dispatched_at)
            .unwrap_or_else(Utc::now);
        let samples: Vec<&Sample> = rounds.iter().flat_map(|r| r.samples.iter()).collect();
        let reachable: Vec<&Sample> = samples
            .iter()
            .copied()
            .filter(|s| s.status.is_reachable())
            .collect();

        Self {
            phase,
            timestamp,
            rounds: rounds.len(),
            samples: samples.len(),
            failures: samples.len() - reachable.len(),
            cpu_pct: mean_of(&reachable, Metric::CpuPct),
            mem_mb: mean_of(&reachable, Metric::MemMb),
            fps: mean_of(&reachable, Metric::Fps),
        }
    }

    /// Aggregate for a burst that never ran
    pub fn empty(phase: BurstPhase) -> Self {
        Self::from_rounds(phase, &[])
    }

    pub fn mean(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::CpuPct => self.cpu_pct,
            Metric::MemMb => self.mem_mb,
            Metric::Fps => self.fps,
        }
    }
}

/// Arithmetic mean of a metric over samples, `None` when there are none
pub fn mean_of(samples: &[&Sample], metric: Metric) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().map(|s| s.metric(metric)).sum();
    Some(sum / samples.len() as f64)
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(worker: &str, cpu: f64, status: SampleStatus) -> Sample {
        Sample {
            timestamp: Utc::now(),
            worker_id: worker.to_string(),
            cpu_pct: cpu,
            mem_mb: 512.0,
            fps: 15.0,
            status,
        }
    }

    fn round(index: u64, samples: Vec<Sample>) -> Round {
        Round {
            index,
            dispatched_at: Utc::now(),
            offset: Duration::from_secs(index),
            samples,
            annotations: Vec::new(),
        }
    }

    #[test]
    fn test_burst_aggregate_ignores_unreachable_in_denominator() {
        let rounds = vec![
            round(
                0,
                vec![
                    sample("w0", 10.0, SampleStatus::Ok),
                    Sample::unreachable("w1", Utc::now()),
                ],
            ),
            round(
                1,
                vec![
                    sample("w0", 30.0, SampleStatus::Degraded),
                    Sample::unreachable("w1", Utc::now()),
                ],
            ),
        ];

        let agg = BurstAggregate::from_rounds(BurstPhase::Baseline, &rounds);
        assert_eq!(agg.rounds, 2);
        assert_eq!(agg.samples, 4);
        assert_eq!(agg.failures, 2);
        assert_eq!(agg.cpu_pct, Some(20.0));
        assert_eq!(agg.fps, Some(15.0));
    }

    #[test]
    fn test_burst_aggregate_all_unreachable_is_not_available() {
        let rounds = vec![round(0, vec![Sample::unreachable("w0", Utc::now())])];

        let agg = BurstAggregate::from_rounds(BurstPhase::Final, &rounds);
        assert_eq!(agg.failures, 1);
        assert_eq!(agg.cpu_pct, None);
        assert_eq!(agg.mem_mb, None);
        assert_eq!(agg.fps, None);
    }

    #[test]
    fn test_sample_status_serializes_lowercase() {
        let json = serde_json::to_string(&SampleStatus::Unreachable).unwrap();
        assert_eq!(json, "\"unreachable\"");
    }
}
