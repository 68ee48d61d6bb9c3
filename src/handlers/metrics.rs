use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;

use super::FormatParams;
use crate::config::QuerySection;
use crate::error::Result;
use crate::export::{ExportFormat, Summary};
use crate::metrics::{BoundedMetricStore, MetricKind, MetricRecord};
use crate::query::{self, MetricFilter};
use crate::AppState;

// ─── GET /metrics?format=json|csv ────────────────────────────────

pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FormatParams>,
) -> Result<Response> {
    let format: ExportFormat = params.format.as_deref().unwrap_or("json").parse()?;
    let summary = Summary::build(&state.monitor);

    Ok(match format {
        ExportFormat::Json => Json(summary).into_response(),
        ExportFormat::Csv => (
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            summary.to_csv(),
        )
            .into_response(),
    })
}

// ─── GET /metrics/:kind ──────────────────────────────────────────
/// Filtered, sorted, paginated records of one kind plus its aggregate.

pub async fn get_kind(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let kind: MetricKind = kind.parse()?;
    let stores = state.monitor.stores();
    let cfg = &state.monitor.config().query;

    match kind {
        MetricKind::Database => query_store(&stores.datastore, &params, cfg),
        MetricKind::Redis => query_store(&stores.cache, &params, cfg),
        MetricKind::Api => query_store(&stores.requests, &params, cfg),
        MetricKind::Celery => query_store(&stores.tasks, &params, cfg),
        MetricKind::System => query_store(&stores.resources, &params, cfg),
        MetricKind::WebVitals => query_store(&stores.client_vitals, &params, cfg),
    }
}

fn query_store<T: MetricRecord>(
    store: &BoundedMetricStore<T>,
    params: &HashMap<String, String>,
    cfg: &QuerySection,
) -> Result<Response> {
    let filter = MetricFilter::from_params::<T>(params, cfg, Utc::now())?;
    Ok(Json(query::query(store, &filter)).into_response())
}
