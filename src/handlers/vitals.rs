use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde_json::{Map, Value};

use super::json_object;
use crate::collectors::VitalReport;
use crate::error::{MonitorError, Result};
use crate::metrics::ClientVitalMetric;
use crate::AppState;

const REQUIRED: [&str; 3] = ["metric_name", "value", "page_url"];

// ─── POST /web-vitals ────────────────────────────────────────────

pub async fn ingest_vital(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<ClientVitalMetric>)> {
    let report = parse_report(&json_object(&body)?)?;
    let record = state.monitor.record_vital(report);
    Ok((StatusCode::CREATED, Json(record)))
}

fn parse_report(body: &Map<String, Value>) -> Result<VitalReport> {
    let missing: Vec<&str> = REQUIRED
        .into_iter()
        .filter(|k| body.get(*k).map_or(true, Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(MonitorError::BadRequest(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    let text = |key: &str| -> Result<String> {
        body[key]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| MonitorError::BadRequest(format!("{key} must be a non-empty string")))
    };
    let optional = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_owned);

    let value = body["value"]
        .as_f64()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| MonitorError::BadRequest("value must be a non-negative number".into()))?;

    Ok(VitalReport {
        metric_name: text("metric_name")?,
        value,
        page_url: text("page_url")?,
        user_id: optional("user_id"),
        device_type: optional("device_type"),
        browser: optional("browser"),
    })
}
