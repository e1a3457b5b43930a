//! Sustained-load sampling loop
//!
//! Dispatches one round per interval for the configured duration and
//! appends each round to the recorder as soon as it completes, so a crash
//! mid-run leaves a valid partial time series behind.

use super::RoundDriver;
use crate::error::RecorderError;
use crate::fleet::FleetView;
use crate::models::RoundAnnotation;
use crate::observability::{RunLogger, RunMetrics};
use crate::recorder::{TimeSeries, TimeSeriesRecorder};
use crate::shutdown::StopSignal;
use anyhow::Result;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Configuration for the sustained-load loop
#[derive(Debug, Clone)]
pub struct SustainedConfig {
    /// Total sampling window (default: 30 minutes)
    pub duration: Duration,
    /// Spacing between round dispatches (default: 30 seconds)
    pub interval: Duration,
    /// Rounds between termination checks against the orchestrator (default: 5)
    pub termination_check_every: u64,
}

impl Default for SustainedConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(1800),
            interval: Duration::from_secs(30),
            termination_check_every: 5,
        }
    }
}

impl SustainedConfig {
    /// `floor(duration / interval)`
    pub fn expected_round_count(&self) -> u64 {
        if self.interval.is_zero() {
            return 0;
        }
        (self.duration.as_nanos() / self.interval.as_nanos()) as u64
    }
}

/// Result of a sustained-load window
#[derive(Debug, Clone)]
pub struct SustainedOutcome {
    pub series: TimeSeries,
    /// True when an external stop signal ended the window early
    pub interrupted: bool,
}

/// Sustained-load loop driving one round per interval
///
/// Built through [`SustainedLoopBuilder`], which validates the cadence.
pub struct SustainedLoop {
    config: SustainedConfig,
    logger: Option<RunLogger>,
    metrics: Option<RunMetrics>,
}

impl SustainedLoop {
    pub fn builder() -> SustainedLoopBuilder {
        SustainedLoopBuilder::new()
    }

    pub fn config(&self) -> &SustainedConfig {
        &self.config
    }

    /// Run the sustained window
    ///
    /// A stop signal is honored between rounds only; an in-flight round
    /// always completes and is recorded. A failed write aborts the loop.
    pub async fn run(
        &self,
        driver: &RoundDriver,
        fleet: &mut FleetView,
        recorder: &mut TimeSeriesRecorder,
        stop: &mut StopSignal,
    ) -> Result<SustainedOutcome, RecorderError> {
        let expected = self.config.expected_round_count();
        let check_every = self.config.termination_check_every.max(1);
        info!(
            expected_rounds = expected,
            interval_secs = self.config.interval.as_secs_f64(),
            "Starting sustained-load window"
        );

        let start = Instant::now();
        let mut pending: Vec<RoundAnnotation> = Vec::new();
        let mut completed = 0u64;
        let mut interrupted = false;

        while completed < expected {
            let scheduled = start + self.config.interval * completed as u32;
            if stop.interrupted_before(scheduled).await {
                interrupted = true;
                break;
            }

            if start.elapsed() >= self.config.duration {
                break;
            }

            pending.extend(fleet.refresh().await);
            let round_start = Instant::now();
            let mut round = driver.run_round(fleet.workers()).await;
            round.annotations.append(&mut pending);

            if let Some(logger) = &self.logger {
                logger.log_round(&round, round_start.elapsed());
            }
            recorder.append(round)?;
            completed += 1;
            if let Some(metrics) = &self.metrics {
                metrics.inc_rounds_recorded();
            }

            if completed % check_every == 0 {
                for signal in fleet.termination_signals().await {
                    if let Some(logger) = &self.logger {
                        logger.log_worker_terminated(&signal.worker_id, &signal.reason);
                    }
                    pending.push(signal);
                }
            }
        }

        info!(rounds = completed, interrupted, "Sustained-load window complete");
        Ok(SustainedOutcome {
            series: recorder.snapshot(),
            interrupted,
        })
    }
}

/// Builder for the sustained-load loop
pub struct SustainedLoopBuilder {
    config: SustainedConfig,
    logger: Option<RunLogger>,
    metrics: Option<RunMetrics>,
}

impl SustainedLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: SustainedConfig::default(),
            logger: None,
            metrics: None,
        }
    }

    /// Start from a complete configuration
    pub fn config(mut self, config: SustainedConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the sampling window
    pub fn duration(mut self, duration: Duration) -> Self {
        self.config.duration = duration;
        self
    }

    /// Set the round interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set how many rounds pass between termination checks
    pub fn termination_check_every(mut self, rounds: u64) -> Self {
        self.config.termination_check_every = rounds;
        self
    }

    pub fn logger(mut self, logger: RunLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn metrics(mut self, metrics: RunMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the loop
    pub fn build(self) -> Result<SustainedLoop> {
        if self.config.interval.is_zero() {
            anyhow::bail!("Interval must be greater than zero");
        }
        if self.config.duration < self.config.interval {
            anyhow::bail!("Duration must be at least one interval");
        }

        Ok(SustainedLoop {
            config: self.config,
            logger: self.logger,
            metrics: self.metrics,
        })
    }
}

impl Default for SustainedLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
