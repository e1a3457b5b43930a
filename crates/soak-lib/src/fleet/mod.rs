//! Fleet orchestration
//!
//! The engine only needs three operations from whatever manages the
//! workers: scale a workload, list its workers, and report abnormal
//! terminations. Kubernetes and a static endpoint list are supported.

mod kubernetes;
mod static_fleet;

pub use kubernetes::KubernetesFleet;
pub use static_fleet::StaticFleet;

use crate::error::FleetError;
use crate::models::{RoundAnnotation, Worker};
use crate::shutdown::StopSignal;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Trait for fleet orchestrator backends
#[async_trait]
pub trait FleetOrchestrator: Send + Sync {
    /// Scale a workload to the given replica count
    async fn scale(&self, workload: &str, replicas: u32) -> Result<(), FleetError>;

    /// List the workload's current workers
    async fn list_workers(&self, workload: &str) -> Result<Vec<Worker>, FleetError>;

    /// Reason a worker terminated abnormally, if it did
    async fn termination_reason(&self, worker_id: &str) -> Result<Option<String>, FleetError>;
}

/// Orchestrator backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FleetMode {
    Kubernetes,
    Static,
}

impl FromStr for FleetMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kubernetes" | "k8s" => Ok(FleetMode::Kubernetes),
            "static" | "local" => Ok(FleetMode::Static),
            other => Err(format!("unknown fleet mode: {}", other)),
        }
    }
}

impl fmt::Display for FleetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetMode::Kubernetes => write!(f, "kubernetes"),
            FleetMode::Static => write!(f, "static"),
        }
    }
}

/// Settings shared by the orchestrator backends
#[derive(Debug, Clone)]
pub struct FleetSettings {
    pub namespace: String,
    /// Pod label selector, defaults to `app=<workload>`
    pub label_selector: Option<String>,
    pub health_port: u16,
    pub health_path: String,
    pub static_endpoints: Vec<String>,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            label_selector: None,
            health_port: 8080,
            health_path: "/health".to_string(),
            static_endpoints: Vec::new(),
        }
    }
}

/// Create the orchestrator backend for the given mode
pub async fn create_orchestrator(
    mode: FleetMode,
    settings: FleetSettings,
) -> Result<Arc<dyn FleetOrchestrator>, FleetError> {
    match mode {
        FleetMode::Kubernetes => {
            info!(namespace = %settings.namespace, "Using Kubernetes fleet orchestrator");
            Ok(Arc::new(KubernetesFleet::connect(settings).await?))
        }
        FleetMode::Static => {
            info!(
                endpoints = settings.static_endpoints.len(),
                "Using static fleet orchestrator"
            );
            Ok(Arc::new(StaticFleet::new(settings.static_endpoints)))
        }
    }
}

/// Default bound on a single orchestrator call made between rounds
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll until the workload reports exactly `target` workers
///
/// Returns `Ok(None)` when a stop signal arrives first. A listing that
/// hangs past `timeout` counts as not ready.
pub async fn wait_for_fleet(
    orchestrator: &dyn FleetOrchestrator,
    workload: &str,
    target: u32,
    timeout: Duration,
    poll_interval: Duration,
    stop: &mut StopSignal,
) -> Result<Option<Vec<Worker>>, FleetError> {
    let start = Instant::now();
    let deadline = start + timeout;
    let mut observed = 0;

    loop {
        let listed = tokio::select! {
            biased;
            _ = stop.recv() => return Ok(None),
            listed = timeout_at(deadline, orchestrator.list_workers(workload)) => listed,
        };
        match listed {
            Ok(Ok(workers)) if workers.len() == target as usize => return Ok(Some(workers)),
            Ok(Ok(workers)) => {
                observed = workers.len();
                debug!(workload = %workload, observed, target, "Waiting for fleet");
            }
            Ok(Err(e)) => {
                debug!(workload = %workload, error = %e, "Fleet listing failed while waiting");
            }
            Err(_) => {
                debug!(workload = %workload, "Fleet listing timed out while waiting");
            }
        }

        if start.elapsed() >= timeout {
            return Err(FleetError::NotReady {
                workload: workload.to_string(),
                target,
                observed,
                waited_secs: start.elapsed().as_secs(),
            });
        }
        if stop.interrupted_before(Instant::now() + poll_interval).await {
            return Ok(None);
        }
    }
}

/// Current worker set as seen by the sampler, refreshed once per round
pub struct FleetView {
    orchestrator: Arc<dyn FleetOrchestrator>,
    workload: String,
    workers: Vec<Worker>,
    reported_terminations: HashSet<(String, String)>,
    call_timeout: Duration,
}

impl FleetView {
    pub fn new(
        orchestrator: Arc<dyn FleetOrchestrator>,
        workload: impl Into<String>,
        initial: Vec<Worker>,
    ) -> Self {
        Self {
            orchestrator,
            workload: workload.into(),
            workers: initial,
            reported_terminations: HashSet::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Bound each refresh and the whole termination sweep
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn workload(&self) -> &str {
        &self.workload
    }

    /// Refresh the worker set for the next round
    ///
    /// A failed, hung or empty listing keeps the previous set; the
    /// fallback is returned as an annotation for the round.
    pub async fn refresh(&mut self) -> Option<RoundAnnotation> {
        let listed = tokio::time::timeout(
            self.call_timeout,
            self.orchestrator.list_workers(&self.workload),
        )
        .await
        .unwrap_or_else(|_| {
            Err(FleetError::ListFailed {
                workload: self.workload.clone(),
                reason: format!("no answer within {}ms", self.call_timeout.as_millis()),
            })
        });

        match listed {
            Ok(workers) if !workers.is_empty() => {
                if workers.len() != self.workers.len() {
                    info!(
                        workload = %self.workload,
                        previous = self.workers.len(),
                        current = workers.len(),
                        "Fleet size changed"
                    );
                }
                self.workers = workers;
                None
            }
            Ok(_) => {
                warn!(workload = %self.workload, "Orchestrator reported no workers, reusing previous set");
                Some(RoundAnnotation {
                    worker_id: String::new(),
                    reason: "orchestrator reported no workers; previous worker set reused".to_string(),
                })
            }
            Err(e) => {
                warn!(workload = %self.workload, error = %e, "Fleet refresh failed, reusing previous set");
                Some(RoundAnnotation {
                    worker_id: String::new(),
                    reason: format!("fleet refresh failed: {}", e),
                })
            }
        }
    }

    /// Ask the orchestrator for new abnormal terminations
    ///
    /// Each (worker, reason) pair is reported once per run. The sweep
    /// stops at the call timeout; unchecked workers are picked up next time.
    pub async fn termination_signals(&mut self) -> Vec<RoundAnnotation> {
        let mut signals = Vec::new();
        let deadline = Instant::now() + self.call_timeout;

        for worker in &self.workers {
            let checked =
                match timeout_at(deadline, self.orchestrator.termination_reason(&worker.id)).await {
                    Ok(checked) => checked,
                    Err(_) => {
                        warn!(worker_id = %worker.id, "Termination sweep timed out");
                        break;
                    }
                };
            match checked {
                Ok(Some(reason)) => {
                    let key = (worker.id.clone(), reason.clone());
                    if self.reported_terminations.insert(key) {
                        signals.push(RoundAnnotation {
                            worker_id: worker.id.clone(),
                            reason,
                        });
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(worker_id = %worker.id, error = %e, "Termination check failed");
                }
            }
        }

        signals
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scriptable in-memory orchestrator
    #[derive(Default)]
    pub struct MockFleet {
        pub workers: Mutex<Vec<Worker>>,
        pub fail_scale: bool,
        pub fail_list: Mutex<bool>,
        pub terminations: Mutex<HashMap<String, String>>,
        pub scaled_to: Mutex<Option<u32>>,
        /// Delay before every orchestrator answer
        pub delay: Mutex<Option<Duration>>,
    }

    impl MockFleet {
        pub fn with_workers(count: usize) -> Self {
            let workers = (0..count)
                .map(|i| Worker::new(format!("emu-{}", i), format!("mock://emu-{}", i)))
                .collect();
            Self {
                workers: Mutex::new(workers),
                ..Default::default()
            }
        }

        async fn pause(&self) {
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl FleetOrchestrator for MockFleet {
        async fn scale(&self, workload: &str, replicas: u32) -> Result<(), FleetError> {
            self.pause().await;
            if self.fail_scale {
                return Err(FleetError::ScaleFailed {
                    workload: workload.to_string(),
                    replicas,
                    reason: "forbidden".to_string(),
                });
            }
            *self.scaled_to.lock().unwrap() = Some(replicas);
            Ok(())
        }

        async fn list_workers(&self, workload: &str) -> Result<Vec<Worker>, FleetError> {
            self.pause().await;
            if *self.fail_list.lock().unwrap() {
                return Err(FleetError::ListFailed {
                    workload: workload.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            Ok(self.workers.lock().unwrap().clone())
        }

        async fn termination_reason(&self, worker_id: &str) -> Result<Option<String>, FleetError> {
            self.pause().await;
            Ok(self.terminations.lock().unwrap().get(worker_id).cloned())
        }
    }
}
