//! Time-series recording
//!
//! The recorder is the single writer of the run's time series. Each round
//! is written to a durable sink and flushed before it becomes visible to
//! readers, so readers only ever observe a prefix of complete rounds.

mod csv_sink;

pub use csv_sink::{load_run, CsvSink, LoadedRun, BURSTS_FILE, EVENTS_FILE, TIMESERIES_FILE};

use crate::error::RecorderError;
use crate::models::{BurstAggregate, Round, SampleStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Durable destination for recorded rounds
pub trait RoundSink: Send {
    /// Persist one round; must be durable once `flush` returns
    fn write_round(&mut self, round: &Round) -> Result<(), RecorderError>;

    /// Persist one burst aggregate
    fn write_burst(&mut self, aggregate: &BurstAggregate) -> Result<(), RecorderError>;

    fn flush(&mut self) -> Result<(), RecorderError>;

    /// Flush and release the underlying handles
    fn close(&mut self) -> Result<(), RecorderError> {
        self.flush()
    }
}

/// Append-only, round-ordered sequence of rounds
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    rounds: Vec<Arc<Round>>,
}

impl TimeSeries {
    /// Build a time series, rejecting out-of-order or gapped rounds
    pub fn from_rounds(rounds: Vec<Round>) -> Result<Self, RecorderError> {
        let mut series = Self::default();
        for round in rounds {
            series.check_next(round.index)?;
            series.rounds.push(Arc::new(round));
        }
        Ok(series)
    }

    fn check_next(&self, index: u64) -> Result<(), RecorderError> {
        if let Some(last) = self.rounds.last() {
            let expected = last.index + 1;
            if index != expected {
                return Err(RecorderError::OutOfOrder {
                    expected,
                    got: index,
                });
            }
        }
        Ok(())
    }

    pub fn rounds(&self) -> &[Arc<Round>] {
        &self.rounds
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn last_index(&self) -> Option<u64> {
        self.rounds.last().map(|r| r.index)
    }

    /// Number of distinct workers seen across all rounds
    pub fn worker_count(&self) -> usize {
        self.rounds
            .iter()
            .flat_map(|r| r.samples.iter().map(|s| s.worker_id.as_str()))
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn sample_count(&self) -> usize {
        self.rounds.iter().map(|r| r.samples.len()).sum()
    }

    pub fn unreachable_count(&self) -> usize {
        self.rounds.iter().map(|r| r.unreachable_count()).sum()
    }

    /// Cheap summary for live dashboards
    pub fn progress(&self) -> TimeSeriesProgress {
        TimeSeriesProgress {
            rounds: self.len(),
            last_round_index: self.last_index(),
            workers: self.worker_count(),
            samples: self.sample_count(),
            unreachable: self.unreachable_count(),
            degraded: self
                .rounds
                .iter()
                .flat_map(|r| r.samples.iter())
                .filter(|s| s.status == SampleStatus::Degraded)
                .count(),
        }
    }
}

/// Point-in-time counters of a time series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSeriesProgress {
    pub rounds: usize,
    pub last_round_index: Option<u64>,
    pub workers: usize,
    pub samples: usize,
    pub unreachable: usize,
    pub degraded: usize,
}

/// Single writer of the time series
pub struct TimeSeriesRecorder {
    sink: Box<dyn RoundSink>,
    published: watch::Sender<TimeSeries>,
    next_index: Option<u64>,
}

impl TimeSeriesRecorder {
    pub fn new(sink: Box<dyn RoundSink>) -> Self {
        let (published, _) = watch::channel(TimeSeries::default());
        Self {
            sink,
            published,
            next_index: None,
        }
    }

    /// Handle for concurrent readers
    pub fn reader(&self) -> TimeSeriesReader {
        TimeSeriesReader {
            rx: self.published.subscribe(),
        }
    }

    /// Persist a round and publish it to readers
    ///
    /// Rounds must arrive with strictly consecutive indices.
    pub fn append(&mut self, round: Round) -> Result<(), RecorderError> {
        if let Some(expected) = self.next_index {
            if round.index != expected {
                return Err(RecorderError::OutOfOrder {
                    expected,
                    got: round.index,
                });
            }
        }

        self.sink.write_round(&round)?;
        self.sink.flush()?;

        debug!(round = round.index, samples = round.samples.len(), "Round recorded");
        self.next_index = Some(round.index + 1);
        let round = Arc::new(round);
        self.published.send_modify(|series| series.rounds.push(round));
        Ok(())
    }

    /// Persist a burst aggregate
    pub fn record_burst(&mut self, aggregate: &BurstAggregate) -> Result<(), RecorderError> {
        self.sink.write_burst(aggregate)?;
        self.sink.flush()
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> TimeSeries {
        self.published.borrow().clone()
    }

    /// Close the sink and return the final time series
    pub fn close(mut self) -> Result<TimeSeries, RecorderError> {
        self.sink.close()?;
        Ok(self.snapshot())
    }
}

/// Read-only view of a time series being recorded
#[derive(Clone)]
pub struct TimeSeriesReader {
    rx: watch::Receiver<TimeSeries>,
}

impl TimeSeriesReader {
    /// Copy of the rounds recorded so far
    pub fn snapshot(&self) -> TimeSeries {
        self.rx.borrow().clone()
    }

    /// Wait until another round is recorded; false once the writer is gone
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
