//! Short high-frequency bursts bracketing the sustained window

use super::RoundDriver;
use crate::fleet::FleetView;
use crate::models::{BurstAggregate, BurstPhase};
use crate::shutdown::StopSignal;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Configuration for baseline and final bursts
#[derive(Debug, Clone)]
pub struct BurstConfig {
    /// Rounds in the baseline burst (default: 5)
    pub baseline_rounds: usize,
    /// Rounds in the final burst (default: 5)
    pub final_rounds: usize,
    /// Spacing between burst rounds (default: 2 seconds)
    pub interval: Duration,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            baseline_rounds: 5,
            final_rounds: 5,
            interval: Duration::from_secs(2),
        }
    }
}

impl BurstConfig {
    pub fn rounds_for(&self, phase: BurstPhase) -> usize {
        match phase {
            BurstPhase::Baseline => self.baseline_rounds,
            BurstPhase::Final => self.final_rounds,
        }
    }
}

/// Run `round_count` rounds back-to-back and reduce them to one aggregate
///
/// Rounds are dispatched every `interval`; a round that overruns the
/// interval is followed immediately by the next one. A stop signal ends
/// the burst between rounds and the aggregate covers the rounds taken.
pub async fn run_burst(
    driver: &RoundDriver,
    fleet: &mut FleetView,
    phase: BurstPhase,
    round_count: usize,
    interval: Duration,
    stop: &mut StopSignal,
) -> BurstAggregate {
    let start = Instant::now();
    let mut rounds = Vec::with_capacity(round_count);

    for k in 0..round_count {
        if stop.interrupted_before(start + interval * k as u32).await {
            info!(phase = %phase, rounds = rounds.len(), "Burst cut short by stop signal");
            break;
        }

        let annotation = fleet.refresh().await;
        let mut round = driver.run_round(fleet.workers()).await;
        round.annotations.extend(annotation);

        debug!(
            phase = %phase,
            round = round.index,
            unreachable = round.unreachable_count(),
            "Burst round complete"
        );
        rounds.push(round);
    }

    BurstAggregate::from_rounds(phase, &rounds)
}
