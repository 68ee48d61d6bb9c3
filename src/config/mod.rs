//! Monitor configuration (strict YAML parsing).

pub mod schema;
pub mod thresholds;

use std::fs;

use crate::error::{MonitorError, Result};

pub use schema::{
    CacheSection, CapacitySection, MonitorConfig, PrometheusSection, QuerySection,
    RequestSection, RetentionSection, SamplerSection, ServerSection, StreamSection,
};
pub use thresholds::Thresholds;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_ENV: &str = "PERF_MONITOR_CONFIG";

pub fn load_from_file(path: &str) -> Result<MonitorConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| MonitorError::config(path, format!("read failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<MonitorConfig> {
    let cfg: MonitorConfig = serde_yaml::from_str(s)
        .map_err(|e| MonitorError::config("yaml", e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Loads the file named by `PERF_MONITOR_CONFIG`, or validated defaults.
pub fn load_from_env() -> Result<MonitorConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => load_from_file(&path),
        _ => {
            let cfg = MonitorConfig::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = load_from_str("{}").expect("must parse");
        assert_eq!(cfg.query.max_limit, 1000);
        assert_eq!(cfg.retention.days, 30);
        assert_eq!(cfg.thresholds.slow_api_threshold_ms, 2000.0);
    }

    #[test]
    fn unknown_nested_field_is_rejected() {
        let bad = r#"
capacity:
  requestz: 10
"#;
        let err = load_from_str(bad).expect_err("must fail");
        assert_eq!(err.client_code().as_str(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let ok = r#"
retention:
  days: 7
thresholds:
  slow_query_threshold_ms: 250
"#;
        let cfg = load_from_str(ok).expect("must parse");
        assert_eq!(cfg.retention.days, 7);
        assert_eq!(cfg.retention.sweep_interval_secs, 3600);
        assert_eq!(cfg.thresholds.slow_query_threshold_ms, 250.0);
        assert_eq!(cfg.thresholds.slow_cache_threshold_ms, 100.0);
    }

    #[test]
    fn default_limit_above_max_is_rejected() {
        let bad = r#"
query:
  default_limit: 5000
  max_limit: 1000
"#;
        assert!(load_from_str(bad).is_err());
    }
}
