use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use perf_monitor::collectors::{RequestInfo, VitalReport};
use perf_monitor::config::MonitorConfig;
use perf_monitor::{server, AppState, Monitor};

fn setup(cfg: MonitorConfig) -> (Arc<Monitor>, Router) {
    let monitor = Monitor::new(cfg).unwrap();
    let app = server::create_router(Arc::new(AppState::new(monitor.clone())));
    (monitor, app)
}

fn quiet_config() -> MonitorConfig {
    // Keep the test's own HTTP calls out of the api store.
    let mut cfg = MonitorConfig::default();
    cfg.requests.exclude_paths = vec![
        "/metrics".into(),
        "/metrics/:kind".into(),
        "/reset".into(),
        "/config".into(),
        "/config/thresholds".into(),
        "/web-vitals".into(),
        "/export".into(),
        "/prometheus".into(),
    ];
    cfg
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, _, body) = send(app, req).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn slow_only_api_query_returns_slow_request() {
    let (monitor, app) = setup(quiet_config());
    monitor.record_request(
        RequestInfo {
            endpoint: "/api/orders".into(),
            method: "GET".into(),
            status_code: 200,
            ..Default::default()
        },
        2500.0,
    );
    monitor.record_request(
        RequestInfo {
            endpoint: "/api/ping".into(),
            method: "GET".into(),
            status_code: 200,
            ..Default::default()
        },
        12.0,
    );

    let (status, body) = get_json(&app, "/metrics/api?slow_only=true").await;
    assert_eq!(status, StatusCode::OK);
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["endpoint"], "/api/orders");
    assert_eq!(records[0]["slow"], true);
    assert_eq!(body["aggregate"]["slow"], 1);
    assert_eq!(body["aggregate"]["total"], 2);
}

#[tokio::test]
async fn vitals_filtered_by_name_newest_first() {
    let (monitor, app) = setup(quiet_config());
    for (name, value) in [("LCP", 1.2), ("CLS", 0.05), ("LCP", 0.9)] {
        monitor.record_vital(VitalReport {
            metric_name: name.into(),
            value,
            page_url: "/dashboard".into(),
            ..Default::default()
        });
    }

    let (status, body) = get_json(&app, "/metrics/web-vitals?metric_name=LCP").await;
    assert_eq!(status, StatusCode::OK);
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["value"], 0.9);
    assert_eq!(records[1]["value"], 1.2);
}

#[tokio::test]
async fn unknown_kind_is_not_found() {
    let (_, app) = setup(quiet_config());
    let (status, body) = get_json(&app, "/metrics/mongodb").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn unknown_query_parameter_is_rejected() {
    let (_, app) = setup(quiet_config());
    let (status, body) = get_json(&app, "/metrics/api?colour=blue").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "QUERY_ERROR");
}

#[tokio::test]
async fn web_vital_ingest_created_and_missing_fields_rejected() {
    let (monitor, app) = setup(quiet_config());

    let req = json_request(
        "POST",
        "/web-vitals",
        json!({"metric_name": "LCP", "value": 4200, "page_url": "/home", "browser": "chrome"}),
    );
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["rating"], "poor");
    assert_eq!(monitor.stores().client_vitals.len(), 1);

    let req = json_request("POST", "/web-vitals", json!({"metric_name": "LCP"}));
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "BAD_REQUEST");
    assert!(body["message"].as_str().unwrap().contains("page_url"));
    assert_eq!(monitor.stores().client_vitals.len(), 1);

    let req = Request::builder()
        .method("POST")
        .uri("/web-vitals")
        .body(Body::from("not json"))
        .unwrap();
    let (status, _, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn negative_web_vital_is_rejected_and_not_stored() {
    let (monitor, app) = setup(quiet_config());

    let req = json_request(
        "POST",
        "/web-vitals",
        json!({"metric_name": "LCP", "value": -5000, "page_url": "/"}),
    );
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "BAD_REQUEST");
    assert!(monitor.stores().client_vitals.is_empty());

    let (_, body) = get_json(&app, "/metrics/web-vitals").await;
    assert_eq!(body["aggregate"]["total"], 0);
    assert_eq!(body["aggregate"]["avg_duration_ms"], 0.0);
}

#[tokio::test]
async fn threshold_update_with_unknown_key_applies_nothing() {
    let (monitor, app) = setup(quiet_config());

    let req = json_request(
        "PUT",
        "/config/thresholds",
        json!({"slow_api_threshold_ms": 500, "bogus_key": 1}),
    );
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "CONFIGURATION_ERROR");
    assert_eq!(monitor.thresholds().slow_api_threshold_ms, 2000.0);

    let (_, cfg) = get_json(&app, "/config").await;
    assert_eq!(cfg["thresholds"]["slow_api_threshold_ms"], 2000.0);
}

#[tokio::test]
async fn threshold_update_applies_to_new_records_only() {
    let (monitor, app) = setup(quiet_config());
    let info = || RequestInfo {
        endpoint: "/api/x".into(),
        method: "GET".into(),
        status_code: 200,
        ..Default::default()
    };
    let before = monitor.record_request(info(), 800.0);

    let req = json_request("PUT", "/config/thresholds", json!({"slow_api_threshold_ms": 500}));
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["thresholds"]["slow_api_threshold_ms"], 500.0);

    let after = monitor.record_request(info(), 800.0);
    assert!(!before.slow);
    assert!(after.slow);
    assert!(!monitor.stores().requests.snapshot()[0].slow);
}

#[tokio::test]
async fn reset_twice_leaves_every_aggregate_empty() {
    let (monitor, app) = setup(quiet_config());
    monitor.record_datastore("SELECT * FROM users", 1500.0, Some(3), true);
    monitor.record_request(RequestInfo::default(), 3000.0);

    for _ in 0..2 {
        let req = Request::builder()
            .method("POST")
            .uri("/reset")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, summary) = get_json(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    for kind in ["database", "redis", "api", "celery", "system", "web-vitals"] {
        let agg = &summary[kind]["aggregate"];
        assert_eq!(agg["total"], 0, "{kind}");
        assert_eq!(agg["slow"], 0, "{kind}");
        assert_eq!(agg["avg_duration_ms"], 0.0, "{kind}");
    }
}

#[tokio::test]
async fn csv_export_is_an_attachment() {
    let (monitor, app) = setup(quiet_config());
    monitor.record_datastore("UPDATE orders SET paid = 1", 20.0, Some(1), true);

    let req = Request::builder()
        .uri("/export?format=csv")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"performance_metrics.csv\""
    );
    let text = String::from_utf8(body).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("metric_type,total,slow,errors,avg_duration_ms"));
    assert!(text.contains("database,1,0,0,20.000"));
}

#[tokio::test]
async fn unsupported_format_is_rejected() {
    let (_, app) = setup(quiet_config());
    for uri in ["/export?format=xml", "/metrics?format=yaml"] {
        let (status, body) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"], "EXPORT_FORMAT_ERROR");
    }
}

#[tokio::test]
async fn prometheus_exposition_counts_each_record_once() {
    let (monitor, app) = setup(quiet_config());
    monitor.record_request(
        RequestInfo {
            endpoint: "/api/a".into(),
            method: "POST".into(),
            status_code: 201,
            ..Default::default()
        },
        15.0,
    );

    let scrape = || Request::builder().uri("/prometheus").body(Body::empty()).unwrap();
    let (status, headers, _) = send(&app, scrape()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain; version=0.0.4"));

    let (_, _, body) = send(&app, scrape()).await;
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains(
        "perfmon_http_requests_total{endpoint=\"/api/a\",method=\"POST\",status=\"201\"} 1"
    ));
}

#[tokio::test]
async fn tracked_requests_carry_timing_headers() {
    let (monitor, app) = setup(MonitorConfig::default());

    let req = Request::builder().uri("/config").body(Body::empty()).unwrap();
    let (status, headers, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-response-time-us"));
    assert!(headers["server-timing"].to_str().unwrap().starts_with("total;dur="));

    let recorded = monitor.stores().requests.snapshot();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].endpoint, "/config");
    assert_eq!(recorded[0].status_code, 200);
}

#[tokio::test]
async fn healthz_reports_cache_not_configured() {
    let (_, app) = setup(quiet_config());
    let (status, body) = get_json(&app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["cache"], "not_configured");
}
