//! CSV persistence for run directories
//!
//! A run directory holds three UTF-8, comma-separated, append-only files,
//! each starting with a header row:
//! - `timeseries.csv`: one row per sample
//! - `bursts.csv`: one row per burst aggregate (empty metric cell = N/A)
//! - `events.csv`: round annotations

use super::{RoundSink, TimeSeries};
use crate::error::RecorderError;
use crate::models::{BurstAggregate, BurstPhase, Round, RoundAnnotation, Sample, SampleStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

pub const TIMESERIES_FILE: &str = "timeseries.csv";
pub const BURSTS_FILE: &str = "bursts.csv";
pub const EVENTS_FILE: &str = "events.csv";

const TIMESERIES_HEADER: [&str; 7] = [
    "round", "timestamp", "worker_id", "cpu_pct", "mem_mb", "fps", "status",
];
const BURSTS_HEADER: [&str; 8] = [
    "phase", "timestamp", "rounds", "samples", "failures", "cpu_pct", "mem_mb", "fps",
];
const EVENTS_HEADER: [&str; 3] = ["round", "worker_id", "reason"];

#[derive(Debug, Serialize, Deserialize)]
struct SampleRow {
    round: u64,
    timestamp: DateTime<Utc>,
    worker_id: String,
    cpu_pct: f64,
    mem_mb: f64,
    fps: f64,
    status: SampleStatus,
}

#[derive(Debug, Serialize, Deserialize)]
struct EventRow {
    round: u64,
    worker_id: String,
    reason: String,
}

/// CSV-backed round sink
pub struct CsvSink<W: Write> {
    timeseries: csv::Writer<W>,
    bursts: csv::Writer<W>,
    events: csv::Writer<W>,
}

impl CsvSink<File> {
    /// Create a run directory and open its files, truncating old contents
    pub fn create(dir: &Path) -> Result<Self, RecorderError> {
        std::fs::create_dir_all(dir)?;
        let open = |name: &str| {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(dir.join(name))
        };
        Self::from_writers(open(TIMESERIES_FILE)?, open(BURSTS_FILE)?, open(EVENTS_FILE)?)
    }
}

impl<W: Write> CsvSink<W> {
    /// Wrap already-open writers and emit the header rows
    pub fn from_writers(timeseries: W, bursts: W, events: W) -> Result<Self, RecorderError> {
        let mut sink = Self {
            timeseries: headerless(timeseries),
            bursts: headerless(bursts),
            events: headerless(events),
        };
        sink.timeseries.write_record(TIMESERIES_HEADER)?;
        sink.bursts.write_record(BURSTS_HEADER)?;
        sink.events.write_record(EVENTS_HEADER)?;
        sink.flush_all()?;
        Ok(sink)
    }

    fn flush_all(&mut self) -> Result<(), RecorderError> {
        self.timeseries.flush()?;
        self.bursts.flush()?;
        self.events.flush()?;
        Ok(())
    }

    /// Unwrap the underlying writers
    pub fn into_inner(self) -> Result<(W, W, W), RecorderError> {
        let map = |e: csv::IntoInnerError<csv::Writer<W>>| RecorderError::Io(e.into_error());
        Ok((
            self.timeseries.into_inner().map_err(map)?,
            self.bursts.into_inner().map_err(map)?,
            self.events.into_inner().map_err(map)?,
        ))
    }
}

fn headerless<W: Write>(w: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().has_headers(false).from_writer(w)
}

impl<W: Write + Send> RoundSink for CsvSink<W> {
    fn write_round(&mut self, round: &Round) -> Result<(), RecorderError> {
        for sample in &round.samples {
            self.timeseries.serialize(SampleRow {
                round: round.index,
                timestamp: sample.timestamp,
                worker_id: sample.worker_id.clone(),
                cpu_pct: sample.cpu_pct,
                mem_mb: sample.mem_mb,
                fps: sample.fps,
                status: sample.status,
            })?;
        }
        for annotation in &round.annotations {
            self.events.serialize(EventRow {
                round: round.index,
                worker_id: annotation.worker_id.clone(),
                reason: annotation.reason.clone(),
            })?;
        }
        Ok(())
    }

    fn write_burst(&mut self, aggregate: &BurstAggregate) -> Result<(), RecorderError> {
        self.bursts.serialize(aggregate)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RecorderError> {
        self.flush_all()
    }
}

/// A run directory read back from disk
#[derive(Debug, Clone)]
pub struct LoadedRun {
    pub series: TimeSeries,
    pub baseline: Option<BurstAggregate>,
    pub final_burst: Option<BurstAggregate>,
}

/// Load a run directory written by [`CsvSink`]
///
/// Missing burst or event files are treated as empty.
pub fn load_run(dir: &Path) -> Result<LoadedRun, RecorderError> {
    let timeseries = File::open(dir.join(TIMESERIES_FILE))?;
    let bursts = open_optional(&dir.join(BURSTS_FILE))?;
    let events = open_optional(&dir.join(EVENTS_FILE))?;
    read_run(timeseries, bursts, events)
}

fn open_optional(path: &Path) -> Result<Option<File>, RecorderError> {
    match File::open(path) {
        Ok(f) => Ok(Some(f)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parse run files from arbitrary readers
pub fn read_run<R: Read>(
    timeseries: R,
    bursts: Option<R>,
    events: Option<R>,
) -> Result<LoadedRun, RecorderError> {
    let mut annotations: HashMap<u64, Vec<RoundAnnotation>> = HashMap::new();
    if let Some(events) = events {
        for row in csv::Reader::from_reader(events).deserialize::<EventRow>() {
            let row = row?;
            annotations.entry(row.round).or_default().push(RoundAnnotation {
                worker_id: row.worker_id,
                reason: row.reason,
            });
        }
    }

    let mut rounds: Vec<Round> = Vec::new();
    for row in csv::Reader::from_reader(timeseries).deserialize::<SampleRow>() {
        let row = row?;
        let sample = Sample {
            timestamp: row.timestamp,
            worker_id: row.worker_id,
            cpu_pct: row.cpu_pct,
            mem_mb: row.mem_mb,
            fps: row.fps,
            status: row.status,
        };

        match rounds.last_mut() {
            Some(current) if current.index == row.round => {
                current.dispatched_at = current.dispatched_at.min(sample.timestamp);
                current.samples.push(sample);
            }
            Some(current) if row.round != current.index + 1 => {
                return Err(RecorderError::OutOfOrder {
                    expected: current.index + 1,
                    got: row.round,
                });
            }
            _ => rounds.push(Round {
                index: row.round,
                dispatched_at: sample.timestamp,
                offset: Default::default(),
                samples: vec![sample],
                annotations: annotations.remove(&row.round).unwrap_or_default(),
            }),
        }
    }

    if let Some(first) = rounds.first().map(|r| r.dispatched_at) {
        for round in &mut rounds {
            round.offset = (round.dispatched_at - first).to_std().unwrap_or_default();
        }
    }

    let mut baseline = None;
    let mut final_burst = None;
    if let Some(bursts) = bursts {
        for row in csv::Reader::from_reader(bursts).deserialize::<BurstAggregate>() {
            let aggregate = row?;
            match aggregate.phase {
                BurstPhase::Baseline => baseline = Some(aggregate),
                BurstPhase::Final => final_burst = Some(aggregate),
            }
        }
    }

    Ok(LoadedRun {
        series: TimeSeries::from_rounds(rounds)?,
        baseline,
        final_burst,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::TimeSeriesRecorder;
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample(worker: &str, ts: DateTime<Utc>, cpu: f64, status: SampleStatus) -> Sample {
        Sample {
            timestamp: ts,
            worker_id: worker.to_string(),
            cpu_pct: cpu,
            mem_mb: 700.0,
            fps: 15.0,
            status,
        }
    }

    fn round_at(index: u64, secs: i64) -> Round {
        let ts = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        Round {
            index,
            dispatched_at: ts,
            offset: Duration::from_secs(secs as u64),
            samples: vec![
                sample("emu-0", ts, 12.5, SampleStatus::Ok),
                Sample::unreachable("emu-1", ts),
            ],
            annotations: Vec::new(),
        }
    }

    #[test]
    fn test_headers_written_on_open() {
        let sink = CsvSink::from_writers(Vec::new(), Vec::new(), Vec::new()).unwrap();
        let (ts, bursts, events) = sink.into_inner().unwrap();

        assert_eq!(
            String::from_utf8(ts).unwrap(),
            "round,timestamp,worker_id,cpu_pct,mem_mb,fps,status\n"
        );
        assert_eq!(
            String::from_utf8(bursts).unwrap(),
            "phase,timestamp,rounds,samples,failures,cpu_pct,mem_mb,fps\n"
        );
        assert_eq!(String::from_utf8(events).unwrap(), "round,worker_id,reason\n");
    }

    #[test]
    fn test_round_rows() {
        let mut sink = CsvSink::from_writers(Vec::new(), Vec::new(), Vec::new()).unwrap();
        sink.write_round(&round_at(3, 0)).unwrap();
        let (ts, _, _) = sink.into_inner().unwrap();

        let text = String::from_utf8(ts).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("3,"));
        assert!(lines[1].ends_with(",emu-0,12.5,700.0,15.0,ok"));
        assert!(lines[2].ends_with(",emu-1,0.0,0.0,0.0,unreachable"));
    }

    #[test]
    fn test_not_available_burst_is_empty_cell() {
        let mut sink = CsvSink::from_writers(Vec::new(), Vec::new(), Vec::new()).unwrap();
        let mut aggregate = BurstAggregate::empty(BurstPhase::Final);
        aggregate.timestamp = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        sink.write_burst(&aggregate).unwrap();
        let (_, bursts, _) = sink.into_inner().unwrap();

        let text = String::from_utf8(bursts).unwrap();
        assert!(text.lines().nth(1).unwrap().ends_with(",0,0,0,,,"));
    }

    #[test]
    fn test_run_directory_reads_back_in_order() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::create(dir.path()).unwrap();
        let mut recorder = TimeSeriesRecorder::new(Box::new(sink));

        let mut baseline_round = round_at(0, 0);
        baseline_round.samples[0].cpu_pct = 10.0;
        let baseline = BurstAggregate::from_rounds(BurstPhase::Baseline, &[baseline_round]);
        recorder.record_burst(&baseline).unwrap();

        for (i, index) in (4..8).enumerate() {
            let mut round = round_at(index, i as i64 * 30);
            if index == 6 {
                round.annotations.push(RoundAnnotation {
                    worker_id: "emu-1".to_string(),
                    reason: "emulator: OOMKilled (exit 137, restarts 1)".to_string(),
                });
            }
            recorder.append(round).unwrap();
        }
        recorder.close().unwrap();

        let loaded = load_run(dir.path()).unwrap();
        let indices: Vec<u64> = loaded.series.rounds().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![4, 5, 6, 7]);
        assert!(loaded.series.rounds().iter().all(|r| r.samples.len() == 2));
        assert_eq!(loaded.series.rounds()[2].annotations.len(), 1);
        assert_eq!(loaded.series.rounds()[3].offset, Duration::from_secs(90));
        assert_eq!(loaded.baseline.unwrap().cpu_pct, Some(10.0));
        assert!(loaded.final_burst.is_none());
    }

    #[test]
    fn test_gapped_file_is_rejected() {
        let csv = "round,timestamp,worker_id,cpu_pct,mem_mb,fps,status\n\
                   0,2024-01-01T00:00:00Z,emu-0,1,1,1,ok\n\
                   2,2024-01-01T00:00:30Z,emu-0,1,1,1,ok\n";

        let err = read_run(csv.as_bytes(), None, None).unwrap_err();
        assert!(matches!(err, RecorderError::OutOfOrder { expected: 1, got: 2 }));
    }

    #[test]
    fn test_malformed_row_fails_single_parse() {
        let csv = "round,timestamp,worker_id,cpu_pct,mem_mb,fps,status\n\
                   0,2024-01-01T00:00:00Z,emu-0,N/A,1,1,ok\n";

        assert!(matches!(
            read_run(csv.as_bytes(), None, None),
            Err(RecorderError::Csv(_))
        ));
    }
}
