//! Degradation analysis
//!
//! Two comparisons run over every metric:
//! - Baseline vs final: the two burst aggregates bracketing the run
//! - Trend: first quarter vs last quarter of sustained-window rounds
//!
//! Both use the same threshold. Analysis is a pure function of its inputs,
//! so it can be re-run offline against a persisted run directory.

mod trend;

pub use trend::{quarter_means, QuarterMeans};

use crate::models::{BurstAggregate, Metric};
use crate::recorder::TimeSeries;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default degradation threshold in percent
pub const DEFAULT_THRESHOLD_PCT: f64 = 10.0;

/// Tolerance, in percentage points, below which a delta counts as equal to a limit
const LIMIT_TOLERANCE_PCT: f64 = 1e-9;

/// True when `|delta_pct|` is strictly beyond `limit_pct`
///
/// Deltas are float quotients, so a change of exactly the threshold can
/// land a few ULPs above it; those are treated as on the limit.
fn exceeds(delta_pct: f64, limit_pct: f64) -> bool {
    delta_pct.abs() - limit_pct > LIMIT_TOLERANCE_PCT
}

/// Which pair of comparison points produced a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    BaselineVsFinal,
    Trend,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::BaselineVsFinal => write!(f, "baseline_vs_final"),
            Comparison::Trend => write!(f, "trend"),
        }
    }
}

/// Severity of a degradation flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One metric compared between two points; `None` values are N/A
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub metric: Metric,
    pub comparison: Comparison,
    pub baseline_value: Option<f64>,
    pub final_value: Option<f64>,
    pub delta_pct: Option<f64>,
}

/// Metric whose delta exceeded the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationFlag {
    pub metric: Metric,
    pub comparison: Comparison,
    pub baseline_value: f64,
    pub final_value: f64,
    pub delta_pct: f64,
    pub severity: Severity,
}

/// Full analyzer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub threshold_pct: f64,
    pub baseline_vs_final: Vec<MetricDelta>,
    pub trend: Vec<MetricDelta>,
    /// Rounds in each trend partition, 0 when the window was too short
    pub quarter_rounds: usize,
    pub flags: Vec<DegradationFlag>,
}

impl Analysis {
    pub fn is_degraded(&self) -> bool {
        !self.flags.is_empty()
    }
}

/// Percentage change from `baseline` to `final_value`
///
/// N/A when either side is missing or the baseline is zero.
pub fn delta_pct(baseline: Option<f64>, final_value: Option<f64>) -> Option<f64> {
    let (baseline, final_value) = (baseline?, final_value?);
    if baseline == 0.0 {
        return None;
    }
    let delta = (final_value - baseline) / baseline * 100.0;
    delta.is_finite().then_some(delta)
}

/// Compares burst aggregates and sustained-window quarters against a threshold
#[derive(Debug, Clone)]
pub struct DegradationAnalyzer {
    threshold_pct: f64,
}

impl Default for DegradationAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_PCT)
    }
}

impl DegradationAnalyzer {
    pub fn new(threshold_pct: f64) -> Self {
        Self { threshold_pct }
    }

    pub fn threshold_pct(&self) -> f64 {
        self.threshold_pct
    }

    /// Run both comparisons and collect flags
    pub fn analyze(
        &self,
        series: &TimeSeries,
        baseline: &BurstAggregate,
        final_burst: &BurstAggregate,
    ) -> Analysis {
        let baseline_vs_final: Vec<MetricDelta> = Metric::ALL
            .iter()
            .map(|&metric| MetricDelta {
                metric,
                comparison: Comparison::BaselineVsFinal,
                baseline_value: baseline.mean(metric),
                final_value: final_burst.mean(metric),
                delta_pct: delta_pct(baseline.mean(metric), final_burst.mean(metric)),
            })
            .collect();

        let quarters = quarter_means(series);
        let trend: Vec<MetricDelta> = Metric::ALL
            .iter()
            .map(|&metric| {
                let (first, last) = match &quarters {
                    Some(q) => (q.first(metric), q.last(metric)),
                    None => (None, None),
                };
                MetricDelta {
                    metric,
                    comparison: Comparison::Trend,
                    baseline_value: first,
                    final_value: last,
                    delta_pct: delta_pct(first, last),
                }
            })
            .collect();

        let flags = baseline_vs_final
            .iter()
            .chain(trend.iter())
            .filter_map(|delta| self.flag(delta))
            .collect();

        Analysis {
            threshold_pct: self.threshold_pct,
            baseline_vs_final,
            trend,
            quarter_rounds: quarters.map(|q| q.rounds).unwrap_or(0),
            flags,
        }
    }

    fn flag(&self, delta: &MetricDelta) -> Option<DegradationFlag> {
        let pct = delta.delta_pct?;
        if !exceeds(pct, self.threshold_pct) {
            return None;
        }

        Some(DegradationFlag {
            metric: delta.metric,
            comparison: delta.comparison,
            baseline_value: delta.baseline_value?,
            final_value: delta.final_value?,
            delta_pct: pct,
            severity: self.severity(pct),
        })
    }

    fn severity(&self, delta_pct: f64) -> Severity {
        if exceeds(delta_pct, 2.0 * self.threshold_pct) {
            Severity::Critical
        } else {
            Severity::Warning
        }
    }
}

/// Analyze with the given threshold
pub fn analyze(
    series: &TimeSeries,
    baseline: &BurstAggregate,
    final_burst: &BurstAggregate,
    threshold_pct: f64,
) -> Analysis {
    DegradationAnalyzer::new(threshold_pct).analyze(series, baseline, final_burst)
}
