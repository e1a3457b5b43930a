//! Runner configuration
//!
//! Layered as defaults, then an optional config file, then `SOAK_*`
//! environment variables, then command-line flags.

use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use soak_lib::fleet::{FleetMode, FleetSettings};
use soak_lib::sampler::{BurstConfig, SustainedConfig};
use soak_lib::RunConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Command-line flags; each one overrides the layered configuration
#[derive(Debug, Default, Parser)]
#[command(name = "soak-runner", version, about = "Run a sustained-load soak test against an emulator fleet")]
pub struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "SOAK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sustained-load window in seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Number of workers to scale to
    #[arg(long)]
    pub fleet_size: Option<u32>,

    /// Seconds between sustained-load rounds
    #[arg(long)]
    pub interval: Option<u64>,

    /// Fleet backend: kubernetes or static
    #[arg(long)]
    pub mode: Option<String>,

    /// Workload (StatefulSet) name
    #[arg(long)]
    pub workload: Option<String>,

    /// Directory that receives one subdirectory per run
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Degradation threshold in percent
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Port of the status API
    #[arg(long)]
    pub api_port: Option<u16>,

    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

/// Runner configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    #[serde(default = "default_fleet_size")]
    pub fleet_size: u32,

    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default = "default_workload")]
    pub workload: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Pod label selector, `app=<workload>` when unset
    #[serde(default)]
    pub label_selector: Option<String>,

    #[serde(default = "default_health_port")]
    pub health_port: u16,

    #[serde(default = "default_health_path")]
    pub health_path: String,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_burst_rounds")]
    pub baseline_rounds: usize,

    #[serde(default = "default_burst_rounds")]
    pub final_rounds: usize,

    #[serde(default = "default_burst_interval")]
    pub burst_interval_secs: u64,

    #[serde(default = "default_threshold")]
    pub threshold_pct: f64,

    #[serde(default = "default_termination_check_every")]
    pub termination_check_every: u64,

    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Health endpoints for the static backend
    #[serde(default)]
    pub static_endpoints: Vec<String>,
}

fn default_duration() -> u64 {
    1800
}

fn default_fleet_size() -> u32 {
    9
}

fn default_interval() -> u64 {
    30
}

fn default_mode() -> String {
    "kubernetes".to_string()
}

fn default_workload() -> String {
    "emulator".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_health_port() -> u16 {
    8080
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_burst_rounds() -> usize {
    5
}

fn default_burst_interval() -> u64 {
    2
}

fn default_threshold() -> f64 {
    10.0
}

fn default_termination_check_every() -> u64 {
    5
}

fn default_ready_timeout() -> u64 {
    300
}

fn default_api_port() -> u16 {
    9184
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("soak-results")
}

impl RunnerConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("SOAK")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("static_endpoints"),
            )
            .build()
            .context("Failed to read soak configuration")?;

        config
            .try_deserialize()
            .context("Invalid soak configuration")
    }

    /// Load, apply command-line overrides and validate
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = Self::load(args.config.as_deref())?;
        config.apply(args);
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides
    pub fn apply(&mut self, args: &Args) {
        if let Some(duration) = args.duration {
            self.duration_secs = duration;
        }
        if let Some(fleet_size) = args.fleet_size {
            self.fleet_size = fleet_size;
        }
        if let Some(interval) = args.interval {
            self.interval_secs = interval;
        }
        if let Some(mode) = &args.mode {
            self.mode = mode.clone();
        }
        if let Some(workload) = &args.workload {
            self.workload = workload.clone();
        }
        if let Some(output_dir) = &args.output_dir {
            self.output_dir = output_dir.clone();
        }
        if let Some(threshold) = args.threshold {
            self.threshold_pct = threshold;
        }
        if let Some(api_port) = args.api_port {
            self.api_port = api_port;
        }
    }

    /// Reject configurations that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        ensure!(self.interval_secs > 0, "interval must be greater than zero");
        ensure!(
            self.duration_secs >= self.interval_secs,
            "duration ({}s) must be at least one interval ({}s)",
            self.duration_secs,
            self.interval_secs
        );
        ensure!(self.fleet_size > 0, "fleet size must be greater than zero");
        ensure!(
            self.probe_timeout_secs < self.interval_secs,
            "probe timeout ({}s) must be shorter than the interval ({}s)",
            self.probe_timeout_secs,
            self.interval_secs
        );
        ensure!(self.threshold_pct > 0.0, "threshold must be positive");
        ensure!(
            self.baseline_rounds > 0 && self.final_rounds > 0,
            "burst rounds must be greater than zero"
        );

        let mode = self.fleet_mode()?;
        if mode == FleetMode::Static {
            ensure!(
                self.static_endpoints.len() >= self.fleet_size as usize,
                "static mode needs at least {} endpoints, {} configured",
                self.fleet_size,
                self.static_endpoints.len()
            );
        }
        Ok(())
    }

    pub fn fleet_mode(&self) -> Result<FleetMode> {
        self.mode.parse::<FleetMode>().map_err(anyhow::Error::msg)
    }

    pub fn fleet_settings(&self) -> FleetSettings {
        FleetSettings {
            namespace: self.namespace.clone(),
            label_selector: self.label_selector.clone(),
            health_port: self.health_port,
            health_path: self.health_path.clone(),
            static_endpoints: self.static_endpoints.clone(),
        }
    }

    /// Parameters for one run writing into `run_dir`
    pub fn run_config(&self, run_id: &str, run_dir: &Path) -> Result<RunConfig> {
        Ok(RunConfig {
            run_id: run_id.to_string(),
            workload: self.workload.clone(),
            mode: self.fleet_mode()?,
            fleet_size: self.fleet_size,
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            sustained: SustainedConfig {
                duration: Duration::from_secs(self.duration_secs),
                interval: Duration::from_secs(self.interval_secs),
                termination_check_every: self.termination_check_every,
            },
            bursts: BurstConfig {
                baseline_rounds: self.baseline_rounds,
                final_rounds: self.final_rounds,
                interval: Duration::from_secs(self.burst_interval_secs),
            },
            threshold_pct: self.threshold_pct,
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
            ready_poll_interval: Duration::from_secs(1),
            time_series_path: run_dir.join(soak_lib::recorder::TIMESERIES_FILE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    fn defaults() -> RunnerConfig {
        serde_json::from_str("{}").unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = defaults();
        assert_eq!(config.duration_secs, 1800);
        assert_eq!(config.fleet_size, 9);
        assert_eq!(config.interval_secs, 30);
        assert_eq!(config.mode, "kubernetes");
        assert_eq!(config.threshold_pct, 10.0);
        assert_eq!(config.api_port, 9184);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = defaults();
        let args = Args::parse_from([
            "soak-runner",
            "--duration",
            "60",
            "--interval",
            "10",
            "--fleet-size",
            "3",
            "--threshold",
            "15",
        ]);
        config.apply(&args);

        assert_eq!(config.duration_secs, 60);
        assert_eq!(config.interval_secs, 10);
        assert_eq!(config.fleet_size, 3);
        assert_eq!(config.threshold_pct, 15.0);

        let run = config.run_config("run-1", Path::new("/tmp/run-1")).unwrap();
        assert_eq!(run.sustained.expected_round_count(), 6);
        assert_eq!(run.time_series_path, PathBuf::from("/tmp/run-1/timeseries.csv"));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = defaults();
        config.interval_secs = 0;
        assert_err!(config.validate());

        let mut config = defaults();
        config.duration_secs = 10;
        assert_err!(config.validate());

        let mut config = defaults();
        config.probe_timeout_secs = 30;
        assert_err!(config.validate());

        let mut config = defaults();
        config.mode = "docker".to_string();
        assert_err!(config.validate());

        let mut config = defaults();
        config.mode = "static".to_string();
        config.fleet_size = 2;
        config.static_endpoints = vec!["http://127.0.0.1:8080/health".to_string()];
        assert_err!(config.validate());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "mode = \"static\"\nfleet_size = 2\nstatic_endpoints = [\"http://a/health\", \"http://b/health\"]"
        )
        .unwrap();

        let config = RunnerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.fleet_mode().unwrap(), FleetMode::Static);
        assert_eq!(config.static_endpoints.len(), 2);
        assert_eq!(config.interval_secs, 30);
        assert_ok!(config.validate());
    }
}
