//! Sustained-load stress testing for emulator fleets
//!
//! This crate provides:
//! - Concurrent health sampling of every worker in a fleet
//! - Baseline and final bursts around a sustained-load window
//! - Append-only time-series recording with CSV persistence
//! - Baseline-vs-final and quarter-trend degradation analysis
//! - Report rendering, health tracking and observability

pub mod analysis;
pub mod error;
pub mod fleet;
pub mod health;
pub mod models;
pub mod observability;
pub mod probe;
pub mod recorder;
pub mod report;
pub mod run;
pub mod sampler;
pub mod shutdown;

pub use analysis::{analyze, Analysis, DegradationAnalyzer, DegradationFlag, Severity};
pub use error::{FleetError, ProbeError, RecorderError, RunError};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse, RunPhase};
pub use models::*;
pub use observability::{RunLogger, RunMetrics};
pub use report::{render, RunSummary};
pub use run::{ProgressReport, RunConfig, RunOutcome, StressTest};
pub use shutdown::StopSignal;
