//! Integration tests for the runner status API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use soak_lib::{
    health::{components, HealthRegistry, RunPhase},
    observability::RunMetrics,
    probe::ProbeLedger,
    recorder::{RoundSink, TimeSeriesRecorder},
    BurstAggregate, RecorderError, Round, Sample, SampleStatus,
};
use soak_runner::api::{create_router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct NullSink;

impl RoundSink for NullSink {
    fn write_round(&mut self, _round: &Round) -> Result<(), RecorderError> {
        Ok(())
    }

    fn write_burst(&mut self, _aggregate: &BurstAggregate) -> Result<(), RecorderError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RecorderError> {
        Ok(())
    }
}

fn round(index: u64) -> Round {
    let now = Utc::now();
    Round {
        index,
        dispatched_at: now,
        offset: Duration::from_secs(index * 30),
        samples: vec![
            Sample {
                timestamp: now,
                worker_id: "emu-0".to_string(),
                cpu_pct: 20.0,
                mem_mb: 512.0,
                fps: 30.0,
                status: SampleStatus::Ok,
            },
            Sample::unreachable("emu-1", now),
        ],
        annotations: Vec::new(),
    }
}

async fn setup_test_app() -> (Router, Arc<AppState>, TimeSeriesRecorder) {
    let health_registry = HealthRegistry::new();
    health_registry.register_defaults().await;

    let recorder = TimeSeriesRecorder::new(Box::new(NullSink));
    let state = Arc::new(AppState::new(
        "run-api",
        health_registry,
        RunMetrics::new(),
        recorder.reader(),
        Arc::new(ProbeLedger::new()),
    ));
    let router = create_router(state.clone());

    (router, state, recorder)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state, _recorder) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["phase"], "starting");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state, _recorder) = setup_test_app().await;
    state
        .health_registry
        .set_degraded(components::SAMPLER, "1 of 2 workers had unreachable probes")
        .await;

    let (status, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state, _recorder) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::RECORDER, "disk full")
        .await;

    let (status, _) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_waits_for_sampling() {
    let (app, state, _recorder) = setup_test_app().await;

    let (status, _) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.health_registry.set_phase(RunPhase::Sustained).await;
    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_returns_prometheus_format() {
    let (app, state, _recorder) = setup_test_app().await;
    state.metrics.inc_rounds_recorded();
    state.metrics.inc_probe_failure("probe_timeout");

    let (status, body) = get(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("soak_rounds_recorded_total"));
    assert!(text.contains("soak_probe_failures_total"));
}

#[tokio::test]
async fn test_progress_reports_recorded_rounds() {
    let (app, state, mut recorder) = setup_test_app().await;
    recorder.append(round(5)).unwrap();
    recorder.append(round(6)).unwrap();
    state
        .ledger
        .record("emu-1", SampleStatus::Unreachable, Some("probe_timeout"));

    let (status, body) = get(app, "/progress").await;

    assert_eq!(status, StatusCode::OK);
    let progress: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(progress["run_id"], "run-api");
    assert_eq!(progress["rounds"], 2);
    assert_eq!(progress["last_round_index"], 6);
    assert_eq!(progress["by_worker"]["emu-1"]["unreachable"], 1);
    assert_eq!(progress["unreachable"], 2);
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let (app, _state, _recorder) = setup_test_app().await;

    let (status, _) = get(app, "/nope").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
