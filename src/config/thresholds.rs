use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MonitorError, Result};

/// Limits used to flag slow or over-threshold records at insertion time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
    #[serde(default = "default_query_ms")]
    pub slow_query_threshold_ms: f64,
    #[serde(default = "default_api_ms")]
    pub slow_api_threshold_ms: f64,
    #[serde(default = "default_cache_ms")]
    pub slow_cache_threshold_ms: f64,
    #[serde(default = "default_task_ms")]
    pub slow_task_threshold_ms: f64,
    #[serde(default = "default_cpu_pct")]
    pub cpu_usage_max_percent: f64,
    #[serde(default = "default_memory_pct")]
    pub memory_usage_max_percent: f64,
    #[serde(default = "default_disk_pct")]
    pub disk_usage_max_percent: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: default_query_ms(),
            slow_api_threshold_ms: default_api_ms(),
            slow_cache_threshold_ms: default_cache_ms(),
            slow_task_threshold_ms: default_task_ms(),
            cpu_usage_max_percent: default_cpu_pct(),
            memory_usage_max_percent: default_memory_pct(),
            disk_usage_max_percent: default_disk_pct(),
        }
    }
}

fn default_query_ms() -> f64 {
    1000.0
}
fn default_api_ms() -> f64 {
    2000.0
}
fn default_cache_ms() -> f64 {
    100.0
}
fn default_task_ms() -> f64 {
    30_000.0
}
fn default_cpu_pct() -> f64 {
    80.0
}
fn default_memory_pct() -> f64 {
    85.0
}
fn default_disk_pct() -> f64 {
    90.0
}

impl Thresholds {
    pub const KEYS: [&'static str; 7] = [
        "slow_query_threshold_ms",
        "slow_api_threshold_ms",
        "slow_cache_threshold_ms",
        "slow_task_threshold_ms",
        "cpu_usage_max_percent",
        "memory_usage_max_percent",
        "disk_usage_max_percent",
    ];

    fn slot(&mut self, key: &str) -> Option<&mut f64> {
        match key {
            "slow_query_threshold_ms" => Some(&mut self.slow_query_threshold_ms),
            "slow_api_threshold_ms" => Some(&mut self.slow_api_threshold_ms),
            "slow_cache_threshold_ms" => Some(&mut self.slow_cache_threshold_ms),
            "slow_task_threshold_ms" => Some(&mut self.slow_task_threshold_ms),
            "cpu_usage_max_percent" => Some(&mut self.cpu_usage_max_percent),
            "memory_usage_max_percent" => Some(&mut self.memory_usage_max_percent),
            "disk_usage_max_percent" => Some(&mut self.disk_usage_max_percent),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut copy = *self;
        for key in Self::KEYS {
            if let Some(v) = copy.slot(key) {
                check_value(key, *v)?;
            }
        }
        Ok(())
    }

    /// Returns a copy with `update` applied, or the first offending key.
    /// `self` is never touched, so a rejected update changes nothing.
    pub fn with_update(&self, update: &Map<String, Value>) -> Result<Self> {
        let mut next = *self;
        for (key, value) in update {
            let number = value.as_f64().ok_or_else(|| {
                MonitorError::config(key, format!("value must be numeric, got {value}"))
            })?;
            check_value(key, number)?;
            let slot = next
                .slot(key)
                .ok_or_else(|| MonitorError::config(key, "unknown threshold key"))?;
            *slot = number;
        }
        Ok(next)
    }
}

fn check_value(key: &str, v: f64) -> Result<()> {
    if !v.is_finite() || v < 0.0 {
        return Err(MonitorError::config(
            key,
            "must be a finite, non-negative number",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn update_applies_known_keys() {
        let t = Thresholds::default();
        let next = t
            .with_update(&map(json!({"slow_api_threshold_ms": 500, "cpu_usage_max_percent": 70.5})))
            .unwrap();
        assert_eq!(next.slow_api_threshold_ms, 500.0);
        assert_eq!(next.cpu_usage_max_percent, 70.5);
        assert_eq!(next.slow_query_threshold_ms, t.slow_query_threshold_ms);
    }

    #[test]
    fn unknown_key_rejects_whole_update() {
        let t = Thresholds::default();
        let err = t
            .with_update(&map(json!({"slow_api_threshold_ms": 500, "bogus_key": 1})))
            .unwrap_err();
        assert!(err.to_string().contains("bogus_key"));
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        let t = Thresholds::default();
        let err = t
            .with_update(&map(json!({"slow_cache_threshold_ms": "fast"})))
            .unwrap_err();
        assert!(err.to_string().contains("slow_cache_threshold_ms"));
        assert!(t.with_update(&map(json!({"slow_task_threshold_ms": true}))).is_err());
        assert!(t.with_update(&map(json!({"slow_task_threshold_ms": -1}))).is_err());
    }
}
