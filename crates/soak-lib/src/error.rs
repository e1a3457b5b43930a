//! Error taxonomy for the soak test engine
//!
//! Probe errors are recovered locally and only degrade a single sample.
//! Fleet and recorder errors surface through [`RunError`] and end the run.

use thiserror::Error;

/// Failure of a single worker health probe
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    #[error("probe timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("worker unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("health endpoint returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("malformed health payload: {reason}")]
    MalformedPayload { reason: String },
}

impl ProbeError {
    /// Failure kind label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Timeout { .. } => "probe_timeout",
            // A non-2xx answer means the worker is not serving health data
            ProbeError::Unreachable { .. } | ProbeError::HttpStatus { .. } => "probe_unreachable",
            ProbeError::MalformedPayload { .. } => "malformed_payload",
        }
    }
}

/// Failure talking to the fleet orchestrator
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("failed to scale {workload} to {replicas} replicas: {reason}")]
    ScaleFailed {
        workload: String,
        replicas: u32,
        reason: String,
    },

    #[error("failed to list workers of {workload}: {reason}")]
    ListFailed { workload: String, reason: String },

    #[error("{workload} reported {observed} of {target} workers after {waited_secs}s")]
    NotReady {
        workload: String,
        target: u32,
        observed: usize,
        waited_secs: u64,
    },

    #[error("orchestrator client error: {0}")]
    Client(String),
}

/// Failure persisting the time series
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("time series I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("time series CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("round {got} appended out of order (expected {expected})")]
    OutOfOrder { expected: u64, got: u64 },
}

/// Fatal outcome of a stress-test run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("orchestrator scale failure: {0}")]
    OrchestratorScaleFailure(#[source] FleetError),

    #[error("orchestrator unavailable: {0}")]
    OrchestratorUnavailable(#[source] FleetError),

    #[error("time series write failure: {0}")]
    TimeSeriesWriteFailure(#[from] RecorderError),

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("run stopped before sampling started")]
    Interrupted,
}

impl RunError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::OrchestratorScaleFailure(_) | RunError::OrchestratorUnavailable(_) => 2,
            RunError::TimeSeriesWriteFailure(_) => 3,
            RunError::InvalidConfig(_) => 1,
            // Conventional status for a process ended by SIGINT
            RunError::Interrupted => 130,
        }
    }
}
