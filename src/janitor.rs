use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{MonitorError, Result};
use crate::metrics::{BoundedMetricStore, MetricKind, MetricRecord};
use crate::monitor::Stores;

/// Prunes every store by record age.
pub struct RetentionJanitor {
    retention_days: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub cutoff: DateTime<Utc>,
    pub removed: BTreeMap<MetricKind, usize>,
}

impl SweepReport {
    pub fn total_removed(&self) -> usize {
        self.removed.values().sum()
    }
}

impl RetentionJanitor {
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    /// Drops every record with `timestamp < now - retention`.
    pub fn sweep(&self, stores: &Stores, now: DateTime<Utc>) -> Result<SweepReport> {
        let retention = TimeDelta::try_days(i64::from(self.retention_days)).ok_or_else(|| {
            MonitorError::Internal(format!("retention of {} days overflows", self.retention_days))
        })?;
        let cutoff = now.checked_sub_signed(retention).ok_or_else(|| {
            MonitorError::Internal(format!("retention cutoff before {now} is out of range"))
        })?;

        let removed = BTreeMap::from([
            (MetricKind::Database, prune(&stores.datastore, cutoff)),
            (MetricKind::Redis, prune(&stores.cache, cutoff)),
            (MetricKind::Api, prune(&stores.requests, cutoff)),
            (MetricKind::Celery, prune(&stores.tasks, cutoff)),
            (MetricKind::System, prune(&stores.resources, cutoff)),
            (MetricKind::WebVitals, prune(&stores.client_vitals, cutoff)),
        ]);

        let report = SweepReport { cutoff, removed };
        debug!(%cutoff, removed = report.total_removed(), "retention sweep complete");
        Ok(report)
    }
}

fn prune<T: MetricRecord>(store: &BoundedMetricStore<T>, cutoff: DateTime<Utc>) -> usize {
    store.retain(|r| r.timestamp() >= cutoff)
}
