//! Health payload parsing
//!
//! Workers answer with a JSON object whose metrics live in nested
//! sub-objects. Any sub-object or field may be absent; only a body that is
//! not a JSON object at all counts as a malformed payload.

use crate::error::ProbeError;
use crate::models::SampleStatus;
use serde_json::{Map, Value};

/// Metrics extracted from one health response
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerHealth {
    pub cpu_pct: f64,
    pub mem_mb: f64,
    pub fps: f64,
    pub status: SampleStatus,
}

/// Parse a raw health response body
pub fn parse_health_payload(body: &[u8]) -> Result<WorkerHealth, ProbeError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| ProbeError::MalformedPayload {
        reason: e.to_string(),
    })?;

    let Value::Object(root) = value else {
        return Err(ProbeError::MalformedPayload {
            reason: "health payload is not a JSON object".to_string(),
        });
    };

    let performance = root.get("performance").and_then(Value::as_object);
    let video = root.get("video").and_then(Value::as_object);

    let cpu = lookup(performance, &["cpu_usage_percent", "cpu_usage"]);
    let mem = lookup(performance, &["memory_mb"]);
    let fps = lookup(video, &["frame_rate", "estimated_frame_rate"]);

    let reported = root
        .get("overall_status")
        .or_else(|| root.get("status"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    let mut status = match reported.to_ascii_lowercase().as_str() {
        "healthy" | "ok" | "ready" => SampleStatus::Ok,
        _ => SampleStatus::Degraded,
    };

    // Missing metrics never push a reachable worker below degraded
    if cpu.is_none() || mem.is_none() || fps.is_none() {
        status = SampleStatus::Degraded;
    }

    Ok(WorkerHealth {
        cpu_pct: cpu.unwrap_or(0.0),
        mem_mb: mem.unwrap_or(0.0),
        fps: fps.unwrap_or(0.0),
        status,
    })
}

/// First numeric value found under any of `keys`
fn lookup(section: Option<&Map<String, Value>>, keys: &[&str]) -> Option<f64> {
    let section = section?;
    keys.iter().find_map(|key| match section.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}
