use axum::{
    middleware as axum_mw,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::collectors::track_requests;
use crate::handlers::{admin, metrics, stream, vitals};
use crate::AppState;

/// Builds the monitor's `Router`: query, ingest, admin and exposition routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let monitor = state.monitor.clone();

    Router::new()
        // ── Metrics queries ─────────────────────────────────────
        .route("/metrics", get(metrics::get_summary))
        .route("/metrics/stream", get(stream::metrics_stream))
        .route("/metrics/:kind", get(metrics::get_kind))
        // ── Client vitals ingest ────────────────────────────────
        .route("/web-vitals", post(vitals::ingest_vital))
        // ── Admin ───────────────────────────────────────────────
        .route("/reset", post(admin::reset))
        .route("/config", get(admin::get_config))
        .route("/config/thresholds", put(admin::update_thresholds))
        // ── Export / exposition ─────────────────────────────────
        .route("/export", get(admin::export))
        .route("/prometheus", get(admin::prometheus))
        .route("/healthz", get(admin::healthz))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // Route layer so `MatchedPath` is populated for the request tracker.
        .route_layer(axum_mw::from_fn_with_state(monitor, track_requests))
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
