//! HTTP client for worker health endpoints

use super::{parse_health_payload, HealthProbe, WorkerHealth};
use crate::error::ProbeError;
use crate::models::Worker;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Worker health client backed by a shared connection pool
#[derive(Clone)]
pub struct HttpHealthClient {
    client: Client,
}

impl HttpHealthClient {
    /// Create a new health client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthClient {
    async fn fetch(&self, worker: &Worker, timeout: Duration) -> Result<WorkerHealth, ProbeError> {
        let url = Url::parse(&worker.endpoint).map_err(|e| ProbeError::Unreachable {
            reason: format!("invalid endpoint {}: {}", worker.endpoint, e),
        })?;

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| classify(e, timeout))?;
        parse_health_payload(&body)
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> ProbeError {
    if error.is_timeout() {
        ProbeError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        ProbeError::Unreachable {
            reason: error.to_string(),
        }
    }
}
