//! Cross-store summary and its JSON / CSV renderings.

use std::fmt::Write;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Thresholds;
use crate::error::{MonitorError, Result};
use crate::metrics::{
    BoundedMetricStore, CacheMetric, ClientVitalMetric, DatastoreMetric, MetricKind, MetricRecord,
    RequestMetric, ResourceSample, TaskMetric,
};
use crate::monitor::Monitor;
use crate::query::{self, Aggregate, MetricFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(MonitorError::ExportFormat(s.to_owned())),
        }
    }
}

/// Aggregate plus the most recent records of one store.
#[derive(Debug, Clone, Serialize)]
pub struct Section<T> {
    pub aggregate: Aggregate,
    pub recent: Vec<T>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub generated_at: DateTime<Utc>,
    pub uptime_secs: f64,
    pub thresholds: Thresholds,
    pub database: Section<DatastoreMetric>,
    pub redis: Section<CacheMetric>,
    pub api: Section<RequestMetric>,
    pub celery: Section<TaskMetric>,
    pub system: Section<ResourceSample>,
    #[serde(rename = "web-vitals")]
    pub web_vitals: Section<ClientVitalMetric>,
}

fn section<T: MetricRecord>(store: &BoundedMetricStore<T>, recent: usize) -> Section<T> {
    let result = query::query(store, &MetricFilter::new(recent));
    Section {
        aggregate: result.aggregate,
        recent: result.records,
    }
}

impl Summary {
    pub fn build(monitor: &Monitor) -> Self {
        let stores = monitor.stores();
        let recent = monitor.config().query.recent_per_store;
        Self {
            generated_at: Utc::now(),
            uptime_secs: monitor.uptime().as_secs_f64(),
            thresholds: monitor.thresholds(),
            database: section(&stores.datastore, recent),
            redis: section(&stores.cache, recent),
            api: section(&stores.requests, recent),
            celery: section(&stores.tasks, recent),
            system: section(&stores.resources, recent),
            web_vitals: section(&stores.client_vitals, recent),
        }
    }

    pub fn aggregates(&self) -> [(MetricKind, &Aggregate); 6] {
        [
            (MetricKind::Database, &self.database.aggregate),
            (MetricKind::Redis, &self.redis.aggregate),
            (MetricKind::Api, &self.api.aggregate),
            (MetricKind::Celery, &self.celery.aggregate),
            (MetricKind::System, &self.system.aggregate),
            (MetricKind::WebVitals, &self.web_vitals.aggregate),
        ]
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| MonitorError::Internal(format!("summary serialization failed: {e}")))
    }

    /// One row per metric type. Only the top-level aggregate is kept;
    /// records, percentiles and breakdowns are JSON-only.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("metric_type,total,slow,errors,avg_duration_ms\n");
        for (kind, agg) in self.aggregates() {
            let _ = writeln!(
                out,
                "{},{},{},{},{:.3}",
                kind, agg.total, agg.slow, agg.errors, agg.avg_duration_ms
            );
        }
        out
    }
}

/// Rendered export body and its HTTP metadata.
#[derive(Debug, Clone)]
pub struct ExportPayload {
    pub content_type: &'static str,
    pub body: String,
    pub filename: &'static str,
}

pub fn export(monitor: &Monitor, format: ExportFormat) -> Result<ExportPayload> {
    let summary = Summary::build(monitor);
    Ok(match format {
        ExportFormat::Json => ExportPayload {
            content_type: "application/json",
            body: summary.to_json()?,
            filename: "performance_metrics.json",
        },
        ExportFormat::Csv => ExportPayload {
            content_type: "text/csv; charset=utf-8",
            body: summary.to_csv(),
            filename: "performance_metrics.csv",
        },
    })
}
