//! Fixed-endpoint fleet orchestrator
//!
//! For workers started outside a cluster (local process manager, compose).
//! Scaling only selects how many of the configured endpoints are active.

use super::FleetOrchestrator;
use crate::error::FleetError;
use crate::models::Worker;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct StaticFleet {
    endpoints: Vec<String>,
    active: AtomicUsize,
}

impl StaticFleet {
    pub fn new(endpoints: Vec<String>) -> Self {
        let active = AtomicUsize::new(endpoints.len());
        Self { endpoints, active }
    }
}

#[async_trait]
impl FleetOrchestrator for StaticFleet {
    async fn scale(&self, workload: &str, replicas: u32) -> Result<(), FleetError> {
        let replicas_usize = replicas as usize;
        if replicas_usize > self.endpoints.len() {
            return Err(FleetError::ScaleFailed {
                workload: workload.to_string(),
                replicas,
                reason: format!("only {} static endpoints configured", self.endpoints.len()),
            });
        }
        self.active.store(replicas_usize, Ordering::SeqCst);
        Ok(())
    }

    async fn list_workers(&self, workload: &str) -> Result<Vec<Worker>, FleetError> {
        let active = self.active.load(Ordering::SeqCst);
        Ok(self
            .endpoints
            .iter()
            .take(active)
            .enumerate()
            .map(|(i, endpoint)| Worker::new(format!("{}-{}", workload, i), endpoint.clone()))
            .collect())
    }

    async fn termination_reason(&self, _worker_id: &str) -> Result<Option<String>, FleetError> {
        Ok(None)
    }
}
