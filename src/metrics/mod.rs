pub mod percentiles;
pub mod records;
pub mod store;
pub mod threshold;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::MonitorError;

pub use percentiles::PercentileSet;
pub use records::{
    CacheMetric, CacheOp, ClientVitalMetric, DatastoreMetric, RequestMetric, Resource,
    ResourceSample, TaskMetric, VitalRating,
};
pub use store::BoundedMetricStore;

/// The six record families, named by their URL segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    Database,
    Redis,
    Api,
    Celery,
    System,
    WebVitals,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::Database,
        MetricKind::Redis,
        MetricKind::Api,
        MetricKind::Celery,
        MetricKind::System,
        MetricKind::WebVitals,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Database => "database",
            MetricKind::Redis => "redis",
            MetricKind::Api => "api",
            MetricKind::Celery => "celery",
            MetricKind::System => "system",
            MetricKind::WebVitals => "web-vitals",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| MonitorError::NotFound(format!("unknown metric type '{s}'")))
    }
}

/// Behaviour shared by every stored record type.
///
/// Records are immutable once appended; the slow flag is decided by the
/// collector before the record reaches its store.
pub trait MetricRecord: Clone + Serialize + Send + Sync + 'static {
    const KIND: MetricKind;

    /// Exact-match filter keys accepted by queries on this kind.
    const FILTER_FIELDS: &'static [&'static str];

    fn timestamp(&self) -> DateTime<Utc>;

    fn duration_ms(&self) -> f64;

    fn is_slow(&self) -> bool;

    fn is_error(&self) -> bool {
        false
    }

    /// String form of a filterable field, `None` if absent on this record.
    fn field(&self, name: &str) -> Option<String>;

    /// Key counted in the aggregate breakdown (status code, table, ...).
    fn breakdown_key(&self) -> Option<String> {
        None
    }

    /// Named values averaged in the aggregate block.
    fn measurements(&self) -> Vec<(String, f64)> {
        Vec::new()
    }
}
