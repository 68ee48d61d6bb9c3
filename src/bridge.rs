//! Mirrors stored records into Prometheus collectors.
//!
//! Each store stamps records with an ever-growing sequence number. The bridge
//! keeps one cursor per store and forwards only records at or past it, so a
//! record is counted once no matter how many syncs see it in the store.
//! Records evicted or pruned before the next sync are never forwarded.

use parking_lot::Mutex;
use prometheus::{
    Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::metrics::{BoundedMetricStore, VitalRating};
use crate::monitor::Stores;

/// Latency buckets in seconds.
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Task durations run far longer than request latencies.
const TASK_BUCKETS: &[f64] = &[
    0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0,
];

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCursors {
    pub requests: u64,
    pub datastore: u64,
    pub cache: u64,
    pub tasks: u64,
    pub resources: u64,
    pub client_vitals: u64,
}

/// Number of records forwarded by one sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub requests: usize,
    pub datastore: usize,
    pub cache: usize,
    pub tasks: usize,
    pub resources: usize,
    pub client_vitals: usize,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.requests + self.datastore + self.cache + self.tasks + self.resources + self.client_vitals
    }
}

pub struct PrometheusBridge {
    registry: Registry,

    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_slow_requests_total: IntCounterVec,

    db_queries_total: IntCounterVec,
    db_query_duration_seconds: HistogramVec,
    db_slow_queries_total: IntCounterVec,

    cache_operations_total: IntCounterVec,
    cache_operation_duration_seconds: HistogramVec,

    task_executions_total: IntCounterVec,
    task_duration_seconds: HistogramVec,

    system_cpu_percent: Gauge,
    system_memory_percent: Gauge,
    system_memory_available_bytes: Gauge,
    system_disk_percent: Gauge,
    system_network_sent_bytes: Gauge,
    system_network_received_bytes: Gauge,

    client_vitals_total: IntCounterVec,
    client_vital_last_value: GaugeVec,

    cursors: Mutex<SyncCursors>,
}

fn counter(registry: &Registry, ns: &str, name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    let c = IntCounterVec::new(Opts::new(name, help).namespace(ns), labels)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

fn histogram(
    registry: &Registry,
    ns: &str,
    name: &str,
    help: &str,
    buckets: &[f64],
    labels: &[&str],
) -> Result<HistogramVec> {
    let h = HistogramVec::new(
        HistogramOpts::new(name, help).namespace(ns).buckets(buckets.to_vec()),
        labels,
    )?;
    registry.register(Box::new(h.clone()))?;
    Ok(h)
}

fn gauge(registry: &Registry, ns: &str, name: &str, help: &str) -> Result<Gauge> {
    let g = Gauge::with_opts(Opts::new(name, help).namespace(ns))?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

impl PrometheusBridge {
    /// Builds a private registry with every collector under `namespace`.
    pub fn new(namespace: &str) -> Result<Self> {
        let r = Registry::new();
        let ns = namespace;

        let client_vital_last_value = GaugeVec::new(
            Opts::new("client_vital_last_value", "Most recent reported value per client vital")
                .namespace(ns),
            &["metric_name"],
        )?;
        r.register(Box::new(client_vital_last_value.clone()))?;

        Ok(Self {
            http_requests_total: counter(&r, ns, "http_requests_total",
                "HTTP requests by endpoint, method and status", &["endpoint", "method", "status"])?,
            http_request_duration_seconds: histogram(&r, ns, "http_request_duration_seconds",
                "HTTP request duration in seconds", LATENCY_BUCKETS, &["endpoint", "method"])?,
            http_slow_requests_total: counter(&r, ns, "http_slow_requests_total",
                "HTTP requests over the slow threshold", &["endpoint"])?,

            db_queries_total: counter(&r, ns, "db_queries_total",
                "Datastore queries by table and operation", &["table", "operation"])?,
            db_query_duration_seconds: histogram(&r, ns, "db_query_duration_seconds",
                "Datastore query duration in seconds", LATENCY_BUCKETS, &["table"])?,
            db_slow_queries_total: counter(&r, ns, "db_slow_queries_total",
                "Datastore queries over the slow threshold", &["table"])?,

            cache_operations_total: counter(&r, ns, "cache_operations_total",
                "Cache operations by operation and result", &["operation", "result"])?,
            cache_operation_duration_seconds: histogram(&r, ns, "cache_operation_duration_seconds",
                "Cache operation duration in seconds", LATENCY_BUCKETS, &["operation"])?,

            task_executions_total: counter(&r, ns, "task_executions_total",
                "Background task executions by task and status", &["task", "status"])?,
            task_duration_seconds: histogram(&r, ns, "task_duration_seconds",
                "Background task duration in seconds", TASK_BUCKETS, &["task"])?,

            system_cpu_percent: gauge(&r, ns, "system_cpu_percent", "Last sampled CPU usage")?,
            system_memory_percent: gauge(&r, ns, "system_memory_percent", "Last sampled memory usage")?,
            system_memory_available_bytes: gauge(&r, ns, "system_memory_available_bytes",
                "Last sampled available memory")?,
            system_disk_percent: gauge(&r, ns, "system_disk_percent", "Last sampled disk usage")?,
            system_network_sent_bytes: gauge(&r, ns, "system_network_sent_bytes",
                "Bytes sent across all interfaces at the last sample")?,
            system_network_received_bytes: gauge(&r, ns, "system_network_received_bytes",
                "Bytes received across all interfaces at the last sample")?,

            client_vitals_total: counter(&r, ns, "client_vitals_total",
                "Client vitals reported by name and rating", &["metric_name", "rating"])?,
            client_vital_last_value,

            cursors: Mutex::new(SyncCursors::default()),
            registry: r,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cursors(&self) -> SyncCursors {
        *self.cursors.lock()
    }

    /// Forwards every record appended since the previous sync.
    ///
    /// The cursor lock is held for the whole sync so concurrent callers (the
    /// loop and the exposition handler) never forward the same record twice.
    pub fn sync(&self, stores: &Stores) -> Result<SyncReport> {
        let mut cursors = self.cursors.lock();
        let mut report = SyncReport::default();

        report.requests = forward(&stores.requests, &mut cursors.requests, |r| {
            let status = r.status_code.to_string();
            self.http_requests_total
                .with_label_values(&[r.endpoint.as_str(), r.method.as_str(), status.as_str()])
                .inc();
            self.http_request_duration_seconds
                .with_label_values(&[r.endpoint.as_str(), r.method.as_str()])
                .observe(r.duration_ms / 1000.0);
            if r.slow {
                self.http_slow_requests_total
                    .with_label_values(&[r.endpoint.as_str()])
                    .inc();
            }
        });

        report.datastore = forward(&stores.datastore, &mut cursors.datastore, |r| {
            self.db_queries_total
                .with_label_values(&[r.table.as_str(), r.operation.as_str()])
                .inc();
            self.db_query_duration_seconds
                .with_label_values(&[r.table.as_str()])
                .observe(r.duration_ms / 1000.0);
            if r.slow {
                self.db_slow_queries_total
                    .with_label_values(&[r.table.as_str()])
                    .inc();
            }
        });

        report.cache = forward(&stores.cache, &mut cursors.cache, |r| {
            let result = match (r.success, r.hit) {
                (false, _) => "error",
                (true, Some(true)) => "hit",
                (true, Some(false)) => "miss",
                (true, None) => "ok",
            };
            self.cache_operations_total
                .with_label_values(&[r.operation.as_str(), result])
                .inc();
            self.cache_operation_duration_seconds
                .with_label_values(&[r.operation.as_str()])
                .observe(r.duration_ms / 1000.0);
        });

        report.tasks = forward(&stores.tasks, &mut cursors.tasks, |r| {
            let status = if r.success { "success" } else { "failure" };
            self.task_executions_total
                .with_label_values(&[r.task_name.as_str(), status])
                .inc();
            self.task_duration_seconds
                .with_label_values(&[r.task_name.as_str()])
                .observe(r.duration_ms / 1000.0);
        });

        // Gauges only need the newest sample
        report.resources = forward(&stores.resources, &mut cursors.resources, |s| {
            self.system_cpu_percent.set(s.cpu_percent);
            self.system_memory_percent.set(s.memory_percent);
            self.system_memory_available_bytes
                .set(s.memory_available_bytes as f64);
            self.system_disk_percent.set(s.disk_percent);
            self.system_network_sent_bytes.set(s.network_bytes_sent as f64);
            self.system_network_received_bytes
                .set(s.network_bytes_received as f64);
        });

        // Names are client-supplied, so only rated vitals get their own series
        report.client_vitals = forward(&stores.client_vitals, &mut cursors.client_vitals, |v| {
            let name = VitalRating::label(&v.metric_name);
            self.client_vitals_total
                .with_label_values(&[name, v.rating.as_str()])
                .inc();
            self.client_vital_last_value
                .with_label_values(&[name])
                .set(v.value);
        });

        debug!(forwarded = report.total(), "prometheus sync complete");
        Ok(report)
    }

    /// Prometheus text exposition of the registry.
    pub fn render(&self) -> Result<String> {
        let families = self.registry.gather();
        Ok(TextEncoder::new().encode_to_string(&families)?)
    }
}

fn forward<T: Clone, F: FnMut(&T)>(store: &BoundedMetricStore<T>, cursor: &mut u64, mut f: F) -> usize {
    let (records, next) = store.snapshot_since(*cursor);
    records.iter().for_each(&mut f);
    *cursor = next;
    records.len()
}
