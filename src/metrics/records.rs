use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MetricKind, MetricRecord};

// ─── HTTP requests ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestMetric {
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
    /// Route template, e.g. "/api/users/:id"
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_bytes: u64,
    pub response_bytes: u64,
    pub slow: bool,
}

impl MetricRecord for RequestMetric {
    const KIND: MetricKind = MetricKind::Api;
    const FILTER_FIELDS: &'static [&'static str] = &["endpoint", "method", "status_code"];

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    fn duration_ms(&self) -> f64 {
        self.duration_ms
    }
    fn is_slow(&self) -> bool {
        self.slow
    }
    fn is_error(&self) -> bool {
        self.status_code >= 500
    }

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "endpoint" => Some(self.endpoint.clone()),
            "method" => Some(self.method.clone()),
            "status_code" => Some(self.status_code.to_string()),
            _ => None,
        }
    }

    fn breakdown_key(&self) -> Option<String> {
        Some(self.status_code.to_string())
    }
}

// ─── Datastore operations ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatastoreMetric {
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
    /// Whitespace-normalized statement text
    pub statement: String,
    /// Leading verb, upper-cased ("SELECT", "INSERT", ...)
    pub operation: String,
    /// Best-effort parse; "unknown" when no table could be found
    pub table: String,
    pub rows_affected: Option<u64>,
    pub success: bool,
    pub slow: bool,
}

impl MetricRecord for DatastoreMetric {
    const KIND: MetricKind = MetricKind::Database;
    const FILTER_FIELDS: &'static [&'static str] = &["table", "operation", "success"];

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    fn duration_ms(&self) -> f64 {
        self.duration_ms
    }
    fn is_slow(&self) -> bool {
        self.slow
    }
    fn is_error(&self) -> bool {
        !self.success
    }

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "table" => Some(self.table.clone()),
            "operation" => Some(self.operation.clone()),
            "success" => Some(self.success.to_string()),
            _ => None,
        }
    }

    fn breakdown_key(&self) -> Option<String> {
        Some(self.table.clone())
    }
}

// ─── Cache operations ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOp {
    Get,
    Set,
    Delete,
}

impl CacheOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheOp::Get => "get",
            CacheOp::Set => "set",
            CacheOp::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheMetric {
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
    pub operation: CacheOp,
    pub key: String,
    /// Only known for reads that completed
    pub hit: Option<bool>,
    pub success: bool,
    pub slow: bool,
}

impl MetricRecord for CacheMetric {
    const KIND: MetricKind = MetricKind::Redis;
    const FILTER_FIELDS: &'static [&'static str] = &["operation", "key", "success"];

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    fn duration_ms(&self) -> f64 {
        self.duration_ms
    }
    fn is_slow(&self) -> bool {
        self.slow
    }
    fn is_error(&self) -> bool {
        !self.success
    }

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "operation" => Some(self.operation.as_str().to_owned()),
            "key" => Some(self.key.clone()),
            "success" => Some(self.success.to_string()),
            _ => None,
        }
    }

    fn breakdown_key(&self) -> Option<String> {
        Some(self.operation.as_str().to_owned())
    }
}

// ─── Background tasks ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskMetric {
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
    pub task_name: String,
    pub success: bool,
    pub queue: String,
    pub worker: String,
    pub retries: u32,
    pub error: Option<String>,
    pub slow: bool,
}

impl MetricRecord for TaskMetric {
    const KIND: MetricKind = MetricKind::Celery;
    const FILTER_FIELDS: &'static [&'static str] = &["task_name", "queue", "worker", "success"];

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    fn duration_ms(&self) -> f64 {
        self.duration_ms
    }
    fn is_slow(&self) -> bool {
        self.slow
    }
    fn is_error(&self) -> bool {
        !self.success
    }

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "task_name" => Some(self.task_name.clone()),
            "queue" => Some(self.queue.clone()),
            "worker" => Some(self.worker.clone()),
            "success" => Some(self.success.to_string()),
            _ => None,
        }
    }

    fn breakdown_key(&self) -> Option<String> {
        Some(self.task_name.clone())
    }
}

// ─── OS resource samples ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Cpu,
    Memory,
    Disk,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    /// Time spent taking the sample
    pub duration_ms: f64,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_available_bytes: u64,
    pub disk_percent: f64,
    pub network_bytes_sent: u64,
    pub network_bytes_received: u64,
    /// Resources above their configured maximum when sampled
    pub over_threshold: Vec<Resource>,
}

impl MetricRecord for ResourceSample {
    const KIND: MetricKind = MetricKind::System;
    const FILTER_FIELDS: &'static [&'static str] = &[];

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    fn duration_ms(&self) -> f64 {
        self.duration_ms
    }
    fn is_slow(&self) -> bool {
        !self.over_threshold.is_empty()
    }

    fn field(&self, _name: &str) -> Option<String> {
        None
    }

    fn measurements(&self) -> Vec<(String, f64)> {
        vec![
            ("cpu_percent".into(), self.cpu_percent),
            ("memory_percent".into(), self.memory_percent),
            ("disk_percent".into(), self.disk_percent),
        ]
    }
}

// ─── Client-reported page vitals ─────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VitalRating {
    Good,
    NeedsImprovement,
    Poor,
    Unrated,
}

impl VitalRating {
    pub fn as_str(self) -> &'static str {
        match self {
            VitalRating::Good => "good",
            VitalRating::NeedsImprovement => "needs-improvement",
            VitalRating::Poor => "poor",
            VitalRating::Unrated => "unrated",
        }
    }

    /// Bounded label for a vital name. Rated vitals keep their upper-case
    /// name, everything else collapses to `"other"`.
    pub fn label(metric_name: &str) -> &'static str {
        const RATED: [&str; 6] = ["LCP", "FID", "INP", "CLS", "FCP", "TTFB"];
        RATED
            .into_iter()
            .find(|n| n.eq_ignore_ascii_case(metric_name))
            .unwrap_or("other")
    }

    /// Rates a vital against the published web-vitals boundaries.
    /// Timing vitals are in milliseconds, CLS is unitless.
    pub fn rate(metric_name: &str, value: f64) -> Self {
        let (good, poor) = match metric_name.to_ascii_uppercase().as_str() {
            "LCP" => (2500.0, 4000.0),
            "FID" => (100.0, 300.0),
            "INP" => (200.0, 500.0),
            "CLS" => (0.1, 0.25),
            "FCP" => (1800.0, 3000.0),
            "TTFB" => (800.0, 1800.0),
            _ => return VitalRating::Unrated,
        };
        if value <= good {
            VitalRating::Good
        } else if value <= poor {
            VitalRating::NeedsImprovement
        } else {
            VitalRating::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientVitalMetric {
    pub timestamp: DateTime<Utc>,
    pub metric_name: String,
    pub value: f64,
    pub page_url: String,
    pub user_id: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub rating: VitalRating,
}

impl MetricRecord for ClientVitalMetric {
    const KIND: MetricKind = MetricKind::WebVitals;
    const FILTER_FIELDS: &'static [&'static str] =
        &["metric_name", "page_url", "device_type", "browser", "rating"];

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    // Vitals carry their measurement as the duration.
    fn duration_ms(&self) -> f64 {
        self.value
    }
    fn is_slow(&self) -> bool {
        self.rating == VitalRating::Poor
    }

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "metric_name" => Some(self.metric_name.clone()),
            "page_url" => Some(self.page_url.clone()),
            "device_type" => self.device_type.clone(),
            "browser" => self.browser.clone(),
            "rating" => Some(self.rating.as_str().to_owned()),
            _ => None,
        }
    }

    fn breakdown_key(&self) -> Option<String> {
        Some(self.metric_name.clone())
    }

    fn measurements(&self) -> Vec<(String, f64)> {
        vec![(self.metric_name.clone(), self.value)]
    }
}
