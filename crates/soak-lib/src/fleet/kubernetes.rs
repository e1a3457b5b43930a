//! Kubernetes-backed fleet orchestrator
//!
//! Workers are the pods of a StatefulSet; scaling goes through the scale
//! subresource and health endpoints are addressed by pod IP.

use super::{FleetOrchestrator, FleetSettings};
use crate::error::FleetError;
use crate::models::Worker;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use tracing::debug;

pub struct KubernetesFleet {
    client: Client,
    settings: FleetSettings,
}

impl KubernetesFleet {
    /// Connect using the ambient kubeconfig or in-cluster service account
    pub async fn connect(settings: FleetSettings) -> Result<Self, FleetError> {
        let client = Client::try_default()
            .await
            .map_err(|e| FleetError::Client(e.to_string()))?;
        Ok(Self { client, settings })
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.settings.namespace)
    }

    fn selector(&self, workload: &str) -> String {
        self.settings
            .label_selector
            .clone()
            .unwrap_or_else(|| format!("app={}", workload))
    }
}

#[async_trait]
impl FleetOrchestrator for KubernetesFleet {
    async fn scale(&self, workload: &str, replicas: u32) -> Result<(), FleetError> {
        let sets: Api<StatefulSet> = Api::namespaced(self.client.clone(), &self.settings.namespace);
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });

        sets.patch_scale(workload, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| FleetError::ScaleFailed {
                workload: workload.to_string(),
                replicas,
                reason: e.to_string(),
            })?;

        debug!(workload = %workload, replicas, "Patched StatefulSet scale");
        Ok(())
    }

    async fn list_workers(&self, workload: &str) -> Result<Vec<Worker>, FleetError> {
        let params = ListParams::default().labels(&self.selector(workload));
        let pods = self
            .pods()
            .list(&params)
            .await
            .map_err(|e| FleetError::ListFailed {
                workload: workload.to_string(),
                reason: e.to_string(),
            })?;

        let mut workers: Vec<Worker> = pods
            .items
            .into_iter()
            .filter_map(|pod| serving_worker(pod, &self.settings))
            .collect();

        workers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workers)
    }

    async fn termination_reason(&self, worker_id: &str) -> Result<Option<String>, FleetError> {
        let pod = self
            .pods()
            .get_opt(worker_id)
            .await
            .map_err(|e| FleetError::Client(e.to_string()))?;

        let Some(pod) = pod else {
            return Ok(Some("pod no longer exists".to_string()));
        };

        let statuses = pod
            .status
            .and_then(|s| s.container_statuses)
            .unwrap_or_default();

        Ok(statuses.iter().find_map(abnormal_termination))
    }
}

/// Worker for a running pod with an IP
///
/// Pods being deleted or not yet running are skipped so a scale-down
/// never leaves terminating pods in the fleet.
fn serving_worker(pod: Pod, settings: &FleetSettings) -> Option<Worker> {
    if pod.metadata.deletion_timestamp.is_some() {
        return None;
    }
    let name = pod.metadata.name?;
    let status = pod.status?;
    if status.phase.as_deref() != Some("Running") {
        return None;
    }
    let ip = status.pod_ip?;
    Some(Worker::new(
        name,
        format!("http://{}:{}{}", ip, settings.health_port, settings.health_path),
    ))
}

/// Describe a container's current or last abnormal termination
fn abnormal_termination(status: &ContainerStatus) -> Option<String> {
    let terminated = status
        .state
        .as_ref()
        .and_then(|s| s.terminated.as_ref())
        .or_else(|| status.last_state.as_ref().and_then(|s| s.terminated.as_ref()))?;

    let reason = terminated.reason.as_deref().unwrap_or("Unknown");
    if terminated.exit_code == 0 && reason == "Completed" {
        return None;
    }

    Some(format!(
        "{}: {} (exit {}, restarts {})",
        status.name, reason, terminated.exit_code, status.restart_count
    ))
}
