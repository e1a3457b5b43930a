//! CLI command implementations

pub mod analyze;
pub mod failures;
pub mod status;

use anyhow::{Context, Result};
use soak_lib::recorder::{load_run, LoadedRun};
use std::path::Path;

/// Load a persisted run directory
fn load(run_dir: &Path) -> Result<LoadedRun> {
    load_run(run_dir).with_context(|| format!("Failed to load run from {}", run_dir.display()))
}
