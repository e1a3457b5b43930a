//! HTTP API for health checks, Prometheus metrics and live run progress

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use soak_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::RunMetrics,
    probe::ProbeLedger,
    recorder::TimeSeriesReader,
    ProgressReport,
};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub run_id: String,
    pub health_registry: HealthRegistry,
    pub metrics: RunMetrics,
    pub reader: TimeSeriesReader,
    pub ledger: Arc<ProbeLedger>,
}

impl AppState {
    pub fn new(
        run_id: impl Into<String>,
        health_registry: HealthRegistry,
        metrics: RunMetrics,
        reader: TimeSeriesReader,
        ledger: Arc<ProbeLedger>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            health_registry,
            metrics,
            reader,
            ledger,
        }
    }
}

/// 200 while healthy or degraded, 503 once a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// 200 once sampling has started
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Snapshot of recorded rounds and per-worker tallies
async fn progress(State(state): State<Arc<AppState>>) -> Json<ProgressReport> {
    Json(
        ProgressReport::collect(
            &state.run_id,
            &state.health_registry,
            &state.reader,
            &state.ledger,
        )
        .await,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/progress", get(progress))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting status API");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
