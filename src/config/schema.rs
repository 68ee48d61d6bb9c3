use serde::{Deserialize, Serialize};

use super::thresholds::Thresholds;
use crate::error::{MonitorError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub capacity: CapacitySection,

    #[serde(default)]
    pub retention: RetentionSection,

    #[serde(default)]
    pub sampler: SamplerSection,

    #[serde(default)]
    pub prometheus: PrometheusSection,

    #[serde(default)]
    pub query: QuerySection,

    #[serde(default)]
    pub requests: RequestSection,

    #[serde(default)]
    pub stream: StreamSection,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub thresholds: Thresholds,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retention.days == 0 {
            return Err(MonitorError::config(
                "retention.days",
                "must be at least 1",
            ));
        }
        for (key, secs) in [
            ("retention.sweep_interval_secs", self.retention.sweep_interval_secs),
            ("retention.error_backoff_secs", self.retention.error_backoff_secs),
            ("sampler.interval_secs", self.sampler.interval_secs),
            ("sampler.error_backoff_secs", self.sampler.error_backoff_secs),
            ("prometheus.sync_interval_secs", self.prometheus.sync_interval_secs),
            ("prometheus.error_backoff_secs", self.prometheus.error_backoff_secs),
        ] {
            if secs == 0 {
                return Err(MonitorError::config(key, "must be at least 1"));
            }
        }
        if self.stream.interval_ms < 100 {
            return Err(MonitorError::config(
                "stream.interval_ms",
                "must be at least 100",
            ));
        }
        if self.query.max_limit == 0 {
            return Err(MonitorError::config("query.max_limit", "must be at least 1"));
        }
        if self.query.default_limit > self.query.max_limit {
            return Err(MonitorError::config(
                "query.default_limit",
                "must not exceed query.max_limit",
            ));
        }
        if self.prometheus.namespace.is_empty() {
            return Err(MonitorError::config(
                "prometheus.namespace",
                "must not be empty",
            ));
        }

        self.thresholds.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:3000".into()
}

/// Maximum records held per store. Zero turns appends into no-ops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapacitySection {
    #[serde(default = "default_capacity")]
    pub requests: usize,
    #[serde(default = "default_capacity")]
    pub datastore: usize,
    #[serde(default = "default_capacity")]
    pub cache: usize,
    #[serde(default = "default_task_capacity")]
    pub tasks: usize,
    #[serde(default = "default_resource_capacity")]
    pub resources: usize,
    #[serde(default = "default_capacity")]
    pub client_vitals: usize,
}

impl Default for CapacitySection {
    fn default() -> Self {
        Self {
            requests: default_capacity(),
            datastore: default_capacity(),
            cache: default_capacity(),
            tasks: default_task_capacity(),
            resources: default_resource_capacity(),
            client_vitals: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    10_000
}
fn default_task_capacity() -> usize {
    5_000
}
// One day of samples at the default one-minute interval.
fn default_resource_capacity() -> usize {
    1_440
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionSection {
    #[serde(default = "default_retention_days")]
    pub days: u32,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
            sweep_interval_secs: default_sweep_interval(),
            error_backoff_secs: default_error_backoff(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}
fn default_sweep_interval() -> u64 {
    3600
}
fn default_error_backoff() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplerSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sample_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
}

impl Default for SamplerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sample_interval(),
            error_backoff_secs: default_error_backoff(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_sample_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_sync_backoff")]
    pub error_backoff_secs: u64,
}

impl Default for PrometheusSection {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: default_namespace(),
            sync_interval_secs: default_sync_interval(),
            error_backoff_secs: default_sync_backoff(),
        }
    }
}

fn default_namespace() -> String {
    "perfmon".into()
}
fn default_sync_interval() -> u64 {
    15
}
fn default_sync_backoff() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySection {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Most-recent records per store included in the JSON summary.
    #[serde(default = "default_recent")]
    pub recent_per_store: usize,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            recent_per_store: default_recent(),
        }
    }
}

fn default_limit() -> usize {
    100
}
fn default_max_limit() -> usize {
    1000
}
fn default_recent() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestSection {
    /// Route templates the request interceptor never records.
    #[serde(default = "default_exclude_paths")]
    pub exclude_paths: Vec<String>,
}

impl Default for RequestSection {
    fn default() -> Self {
        Self {
            exclude_paths: default_exclude_paths(),
        }
    }
}

fn default_exclude_paths() -> Vec<String> {
    vec!["/metrics/stream".into(), "/healthz".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamSection {
    #[serde(default = "default_stream_interval")]
    pub interval_ms: u64,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            interval_ms: default_stream_interval(),
        }
    }
}

fn default_stream_interval() -> u64 {
    1000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    /// e.g. "redis://127.0.0.1:6379/"; unset disables the cache probe.
    #[serde(default)]
    pub redis_url: Option<String>,
}
