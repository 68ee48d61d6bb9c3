//! Instrumentation hooks. Each hook turns one observed operation into an
//! immutable record, flags it against the thresholds active right now and
//! appends it to the matching store.

pub mod cache;
pub mod datastore;
pub mod request;
pub mod task;

use std::time::Instant;

use chrono::Utc;
use tracing::warn;

use crate::metrics::threshold::{is_slow, resource_breaches};
use crate::metrics::{
    CacheMetric, CacheOp, ClientVitalMetric, DatastoreMetric, RequestMetric, ResourceSample,
    TaskMetric, VitalRating,
};
use crate::monitor::Monitor;
use crate::sampler::ResourceReading;

pub use cache::InstrumentedCache;
pub use datastore::{InstrumentedStore, RowCount};
pub use request::{observe, track_requests, RequestContext, RequestInterceptor, ResponseOutcome};
pub use task::{run_instrumented, run_instrumented_async, TaskInfo};

/// Everything known about a finished HTTP request except its duration.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_bytes: u64,
    pub response_bytes: u64,
}

/// A page vital reported by a browser.
#[derive(Debug, Clone, Default)]
pub struct VitalReport {
    pub metric_name: String,
    pub value: f64,
    pub page_url: String,
    pub user_id: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
}

/// Milliseconds since `start`, as a float.
pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// Durations come from outside callers too; keep them finite and >= 0.
fn clean(duration_ms: f64) -> f64 {
    if duration_ms.is_finite() && duration_ms > 0.0 {
        duration_ms
    } else {
        0.0
    }
}

impl Monitor {
    pub fn record_request(&self, info: RequestInfo, duration_ms: f64) -> RequestMetric {
        let duration_ms = clean(duration_ms);
        let threshold = self.thresholds().slow_api_threshold_ms;
        let slow = is_slow(duration_ms, threshold);

        if slow {
            warn!(
                endpoint = %info.endpoint,
                method = %info.method,
                status = info.status_code,
                duration_ms,
                threshold_ms = threshold,
                "slow request"
            );
        }

        let record = RequestMetric {
            timestamp: Utc::now(),
            duration_ms,
            endpoint: info.endpoint,
            method: info.method,
            status_code: info.status_code,
            client_ip: info.client_ip,
            user_agent: info.user_agent,
            request_bytes: info.request_bytes,
            response_bytes: info.response_bytes,
            slow,
        };
        self.stores().requests.append(record.clone());
        record
    }

    pub fn record_datastore(
        &self,
        statement: &str,
        duration_ms: f64,
        rows_affected: Option<u64>,
        success: bool,
    ) -> DatastoreMetric {
        let duration_ms = clean(duration_ms);
        let threshold = self.thresholds().slow_query_threshold_ms;
        let slow = is_slow(duration_ms, threshold);

        let statement = datastore::normalize_statement(statement);
        let operation = datastore::parse_operation(&statement);
        let table = datastore::parse_table(&statement);

        if slow {
            warn!(
                %table,
                %operation,
                duration_ms,
                threshold_ms = threshold,
                statement = %statement,
                "slow datastore query"
            );
        }

        let record = DatastoreMetric {
            timestamp: Utc::now(),
            duration_ms,
            statement,
            operation,
            table,
            rows_affected,
            success,
            slow,
        };
        self.stores().datastore.append(record.clone());
        record
    }

    pub fn record_cache(
        &self,
        operation: CacheOp,
        key: &str,
        duration_ms: f64,
        hit: Option<bool>,
        success: bool,
    ) -> CacheMetric {
        let duration_ms = clean(duration_ms);
        let threshold = self.thresholds().slow_cache_threshold_ms;
        let slow = is_slow(duration_ms, threshold);

        if slow {
            warn!(
                operation = operation.as_str(),
                key,
                duration_ms,
                threshold_ms = threshold,
                "slow cache operation"
            );
        }

        let record = CacheMetric {
            timestamp: Utc::now(),
            duration_ms,
            operation,
            key: key.to_owned(),
            hit,
            success,
            slow,
        };
        self.stores().cache.append(record.clone());
        record
    }

    /// `error` is the failure message when the task did not succeed.
    pub fn record_task(&self, task: &TaskInfo, duration_ms: f64, error: Option<String>) -> TaskMetric {
        let duration_ms = clean(duration_ms);
        let threshold = self.thresholds().slow_task_threshold_ms;
        let slow = is_slow(duration_ms, threshold);

        if slow {
            warn!(
                task = %task.name,
                queue = %task.queue,
                duration_ms,
                threshold_ms = threshold,
                "slow background task"
            );
        }

        let record = TaskMetric {
            timestamp: Utc::now(),
            duration_ms,
            task_name: task.name.clone(),
            success: error.is_none(),
            queue: task.queue.clone(),
            worker: task.worker.clone(),
            retries: task.retries,
            error,
            slow,
        };
        self.stores().tasks.append(record.clone());
        record
    }

    pub fn record_vital(&self, report: VitalReport) -> ClientVitalMetric {
        let value = clean(report.value);
        let rating = VitalRating::rate(&report.metric_name, value);
        if rating == VitalRating::Poor {
            warn!(
                metric = %report.metric_name,
                value,
                page = %report.page_url,
                "poor client vital"
            );
        }

        let record = ClientVitalMetric {
            timestamp: Utc::now(),
            metric_name: report.metric_name,
            value,
            page_url: report.page_url,
            user_id: report.user_id,
            device_type: report.device_type,
            browser: report.browser,
            rating,
        };
        self.stores().client_vitals.append(record.clone());
        record
    }

    pub fn record_resources(&self, reading: ResourceReading, duration_ms: f64) -> ResourceSample {
        let thresholds = self.thresholds();
        let over_threshold = resource_breaches(
            reading.cpu_percent,
            reading.memory_percent,
            reading.disk_percent,
            &thresholds,
        );

        for resource in &over_threshold {
            warn!(
                ?resource,
                cpu_percent = reading.cpu_percent,
                memory_percent = reading.memory_percent,
                disk_percent = reading.disk_percent,
                "resource usage over threshold"
            );
        }

        let record = ResourceSample {
            timestamp: Utc::now(),
            duration_ms: clean(duration_ms),
            cpu_percent: reading.cpu_percent,
            memory_percent: reading.memory_percent,
            memory_available_bytes: reading.memory_available_bytes,
            disk_percent: reading.disk_percent,
            network_bytes_sent: reading.network_bytes_sent,
            network_bytes_received: reading.network_bytes_received,
            over_threshold,
        };
        self.stores().resources.append(record.clone());
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use serde_json::json;

    fn monitor() -> std::sync::Arc<Monitor> {
        Monitor::new(MonitorConfig::default()).unwrap()
    }

    fn api(path: &str) -> RequestInfo {
        RequestInfo {
            endpoint: path.into(),
            method: "GET".into(),
            status_code: 200,
            ..RequestInfo::default()
        }
    }

    #[test]
    fn request_at_threshold_is_not_slow() {
        let m = monitor();
        let limit = m.thresholds().slow_api_threshold_ms;
        assert!(!m.record_request(api("/a"), limit).slow);
        assert!(m.record_request(api("/a"), limit + 0.01).slow);
        assert_eq!(m.stores().requests.len(), 2);
    }

    #[test]
    fn slow_flag_is_not_recomputed_after_threshold_change() {
        let m = monitor();
        m.record_request(api("/a"), 2500.0);
        let update = json!({"slow_api_threshold_ms": 5000});
        m.update_thresholds(update.as_object().unwrap()).unwrap();
        m.record_request(api("/a"), 2500.0);

        let flags: Vec<bool> = m.stores().requests.snapshot().iter().map(|r| r.slow).collect();
        assert_eq!(flags, vec![true, false]);
    }

    #[test]
    fn datastore_hook_parses_statement() {
        let m = monitor();
        let r = m.record_datastore("SELECT *\n  FROM   \"orders\" WHERE id = 1", 12.0, Some(1), true);
        assert_eq!(r.statement, "SELECT * FROM \"orders\" WHERE id = 1");
        assert_eq!(r.operation, "SELECT");
        assert_eq!(r.table, "orders");
        assert!(!r.slow);
    }

    #[test]
    fn negative_or_nan_durations_are_zeroed() {
        let m = monitor();
        assert_eq!(m.record_cache(CacheOp::Get, "k", -3.0, None, true).duration_ms, 0.0);
        assert_eq!(m.record_cache(CacheOp::Get, "k", f64::NAN, None, true).duration_ms, 0.0);
    }

    #[test]
    fn poor_vital_is_flagged() {
        let m = monitor();
        let r = m.record_vital(VitalReport {
            metric_name: "LCP".into(),
            value: 5200.0,
            page_url: "/dashboard".into(),
            ..VitalReport::default()
        });
        assert_eq!(r.rating, VitalRating::Poor);
    }

    #[test]
    fn negative_vital_is_zeroed_before_rating() {
        let m = monitor();
        let r = m.record_vital(VitalReport {
            metric_name: "LCP".into(),
            value: -5000.0,
            page_url: "/".into(),
            ..VitalReport::default()
        });
        assert_eq!(r.value, 0.0);
        assert_eq!(m.stores().client_vitals.snapshot()[0].value, 0.0);
    }
}
