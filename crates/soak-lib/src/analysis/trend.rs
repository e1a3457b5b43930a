//! First-quarter vs last-quarter partition of the sustained window
//!
//! Rounds are split by index, not by wall-clock time, so rounds that ran
//! long do not shift the partition boundaries.

use crate::models::{mean_of, Metric, Round, Sample};
use crate::recorder::TimeSeries;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Minimum rounds for a trend comparison (one per quarter)
const MIN_ROUNDS: usize = 4;

/// Per-metric means of the first and last quarter of rounds
#[derive(Debug, Clone, PartialEq)]
pub struct QuarterMeans {
    /// Rounds in each partition
    pub rounds: usize,
    first: BTreeMap<Metric, Option<f64>>,
    last: BTreeMap<Metric, Option<f64>>,
}

impl QuarterMeans {
    pub fn first(&self, metric: Metric) -> Option<f64> {
        self.first.get(&metric).copied().flatten()
    }

    pub fn last(&self, metric: Metric) -> Option<f64> {
        self.last.get(&metric).copied().flatten()
    }
}

fn reachable(rounds: &[Arc<Round>]) -> Vec<&Sample> {
    rounds.iter().flat_map(|r| r.reachable()).collect()
}

/// Means of the first and last `len / 4` rounds, over reachable samples
///
/// Returns `None` when the series has fewer than four rounds.
pub fn quarter_means(series: &TimeSeries) -> Option<QuarterMeans> {
    let rounds = series.rounds();
    if rounds.len() < MIN_ROUNDS {
        return None;
    }

    let quarter = rounds.len() / 4;
    let head = reachable(&rounds[..quarter]);
    let tail = reachable(&rounds[rounds.len() - quarter..]);

    let means = |samples: &[&Sample]| -> BTreeMap<Metric, Option<f64>> {
        Metric::ALL
            .iter()
            .map(|&m| (m, mean_of(samples, m)))
            .collect()
    };

    Some(QuarterMeans {
        rounds: quarter,
        first: means(&head),
        last: means(&tail),
    })
}
