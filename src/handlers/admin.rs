use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use super::{json_object, FormatParams};
use crate::bridge;
use crate::error::Result;
use crate::export::{self, ExportFormat};
use crate::AppState;

// ─── POST /reset ─────────────────────────────────────────────────
/// Clears every store. Administrative / test use only.

pub async fn reset(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.monitor.reset();
    Json(json!({ "status": "reset", "stores": state.monitor.stores().sizes() }))
}

// ─── GET /config ─────────────────────────────────────────────────

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cfg = state.monitor.config();
    Json(json!({
        "thresholds": state.monitor.thresholds(),
        "capacity":   cfg.capacity,
        "retention":  cfg.retention,
        "sampler":    cfg.sampler,
        "prometheus": cfg.prometheus,
        "query":      cfg.query,
    }))
}

// ─── PUT /config/thresholds ──────────────────────────────────────
/// All-or-nothing: one unknown key or non-numeric value rejects the body.

pub async fn update_thresholds(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>> {
    let update = json_object(&body)?;
    let thresholds = state.monitor.update_thresholds(&update)?;
    Ok(Json(json!({ "status": "updated", "thresholds": thresholds })))
}

// ─── GET /export?format=json|csv ─────────────────────────────────

pub async fn export(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FormatParams>,
) -> Result<Response> {
    let format: ExportFormat = params.format.as_deref().unwrap_or("json").parse()?;
    let payload = export::export(&state.monitor, format)?;

    let disposition = match format {
        ExportFormat::Csv => format!("attachment; filename=\"{}\"", payload.filename),
        ExportFormat::Json => format!("inline; filename=\"{}\"", payload.filename),
    };

    Ok((
        [
            (header::CONTENT_TYPE, payload.content_type.to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        payload.body,
    )
        .into_response())
}

// ─── GET /prometheus ─────────────────────────────────────────────
/// Syncs pending records, then renders the exposition text.

pub async fn prometheus(State(state): State<Arc<AppState>>) -> Result<Response> {
    let monitor = &state.monitor;
    monitor.bridge().sync(monitor.stores())?;
    let body = monitor.bridge().render()?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, bridge::CONTENT_TYPE)],
        body,
    )
        .into_response())
}

// ─── GET /healthz ────────────────────────────────────────────────

pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cache = match &state.cache {
        None => "not_configured",
        Some(cache) => match cache.get::<String>("perf-monitor:healthz").await {
            Ok(_) => "ok",
            Err(e) => {
                tracing::warn!(error = %e, "cache probe failed");
                "unavailable"
            }
        },
    };

    Json(json!({
        "status":      "ok",
        "uptime_secs": state.monitor.uptime().as_secs_f64(),
        "stores":      state.monitor.stores().sizes(),
        "cache":       cache,
    }))
}
