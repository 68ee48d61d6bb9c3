//! Filtering, sorting, pagination and aggregates over store snapshots.
//! Nothing here mutates a store: every read works on a copied snapshot.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::config::QuerySection;
use crate::error::{MonitorError, Result};
use crate::metrics::{BoundedMetricStore, MetricKind, MetricRecord, PercentileSet};

/// Parameters accepted on every kind, in addition to its own filter fields.
const COMMON_PARAMS: [&str; 8] = [
    "limit", "offset", "slow_only", "hours", "since", "until", "sort", "order",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Timestamp,
    Duration,
}

/// Conjunction of optional predicates plus ordering and paging.
#[derive(Debug, Clone)]
pub struct MetricFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub slow_only: bool,
    /// Exact matches on kind-specific fields
    pub fields: Vec<(String, String)>,
    pub sort: SortKey,
    pub ascending: bool,
    pub limit: usize,
    pub offset: usize,
}

impl MetricFilter {
    /// Matches everything, newest first.
    pub fn new(limit: usize) -> Self {
        Self {
            since: None,
            until: None,
            slow_only: false,
            fields: Vec::new(),
            sort: SortKey::Timestamp,
            ascending: false,
            limit,
            offset: 0,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn slow_only(mut self) -> Self {
        self.slow_only = true;
        self
    }

    /// Parses URL query parameters for kind `T`. The limit is clamped to
    /// `cfg.max_limit`; unknown parameters are rejected.
    pub fn from_params<T: MetricRecord>(
        params: &HashMap<String, String>,
        cfg: &QuerySection,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let mut filter = Self::new(cfg.default_limit);

        for (key, value) in params {
            match key.as_str() {
                "limit" => filter.limit = parse_number::<usize>(key, value)?,
                "offset" => filter.offset = parse_number::<usize>(key, value)?,
                "slow_only" => filter.slow_only = parse_bool(key, value)?,
                "hours" => {
                    let hours = parse_number::<f64>(key, value)?;
                    if !hours.is_finite() || hours <= 0.0 {
                        return Err(MonitorError::Query("hours must be a positive number".into()));
                    }
                    let window = TimeDelta::try_milliseconds((hours * 3_600_000.0) as i64)
                        .ok_or_else(|| MonitorError::Query("hours is out of range".into()))?;
                    let from = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
                    filter.since = Some(filter.since.map_or(from, |s| s.max(from)));
                }
                "since" => {
                    let from = parse_time(key, value)?;
                    filter.since = Some(filter.since.map_or(from, |s| s.max(from)));
                }
                "until" => filter.until = Some(parse_time(key, value)?),
                "sort" => {
                    filter.sort = match value.as_str() {
                        "timestamp" => SortKey::Timestamp,
                        "duration" => SortKey::Duration,
                        other => {
                            return Err(MonitorError::Query(format!(
                                "sort must be 'timestamp' or 'duration', got '{other}'"
                            )))
                        }
                    }
                }
                "order" => {
                    filter.ascending = match value.as_str() {
                        "asc" => true,
                        "desc" => false,
                        other => {
                            return Err(MonitorError::Query(format!(
                                "order must be 'asc' or 'desc', got '{other}'"
                            )))
                        }
                    }
                }
                field if T::FILTER_FIELDS.contains(&field) => {
                    filter.fields.push((field.to_owned(), value.clone()));
                }
                other => {
                    let mut accepted: Vec<&str> = COMMON_PARAMS.to_vec();
                    accepted.extend_from_slice(T::FILTER_FIELDS);
                    return Err(MonitorError::Query(format!(
                        "unknown parameter '{other}' for {} (accepted: {})",
                        T::KIND,
                        accepted.join(", ")
                    )));
                }
            }
        }

        filter.limit = filter.limit.min(cfg.max_limit);
        // Stable order regardless of HashMap iteration
        filter.fields.sort();
        Ok(filter)
    }

    pub fn matches<T: MetricRecord>(&self, record: &T) -> bool {
        let ts = record.timestamp();
        if self.since.is_some_and(|s| ts < s) || self.until.is_some_and(|u| ts > u) {
            return false;
        }
        if self.slow_only && !record.is_slow() {
            return false;
        }
        self.fields
            .iter()
            .all(|(name, want)| record.field(name).as_deref() == Some(want.as_str()))
    }
}

fn parse_number<N: std::str::FromStr>(key: &str, value: &str) -> Result<N> {
    value
        .trim()
        .parse()
        .map_err(|_| MonitorError::Query(format!("{key} must be a number, got '{value}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(MonitorError::Query(format!("{key} must be true or false, got '{value}'"))),
    }
}

fn parse_time(key: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MonitorError::Query(format!("{key} must be an RFC 3339 timestamp: {e}")))
}

/// Aggregate block computed over a full store snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Aggregate {
    pub total: usize,
    pub slow: usize,
    pub errors: usize,
    pub avg_duration_ms: f64,
    pub percentiles: PercentileSet,
    /// Count per status code, table, operation, task or vital name
    pub breakdown: BTreeMap<String, u64>,
    /// Mean of each named measurement (vital values, resource percentages)
    pub averages: BTreeMap<String, f64>,
    pub latest: Option<DateTime<Utc>>,
}

pub fn aggregate<T: MetricRecord>(records: &[T]) -> Aggregate {
    let total = records.len();
    let mut slow = 0;
    let mut errors = 0;
    let mut duration_sum = 0.0;
    let mut breakdown: BTreeMap<String, u64> = BTreeMap::new();
    let mut sums: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    let mut latest: Option<DateTime<Utc>> = None;

    for r in records {
        if r.is_slow() {
            slow += 1;
        }
        if r.is_error() {
            errors += 1;
        }
        duration_sum += r.duration_ms();
        if let Some(key) = r.breakdown_key() {
            *breakdown.entry(key).or_default() += 1;
        }
        for (name, value) in r.measurements() {
            let entry = sums.entry(name).or_default();
            entry.0 += value;
            entry.1 += 1;
        }
        latest = Some(latest.map_or(r.timestamp(), |l| l.max(r.timestamp())));
    }

    Aggregate {
        total,
        slow,
        errors,
        avg_duration_ms: if total > 0 { duration_sum / total as f64 } else { 0.0 },
        percentiles: PercentileSet::from_durations(records.iter().map(MetricRecord::duration_ms)),
        breakdown,
        averages: sums
            .into_iter()
            .map(|(name, (sum, n))| (name, sum / n as f64))
            .collect(),
        latest,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult<T> {
    pub kind: MetricKind,
    /// Computed over the whole store, not the filtered page
    pub aggregate: Aggregate,
    /// Records matching the filter before paging
    pub matched: usize,
    pub offset: usize,
    pub limit: usize,
    pub records: Vec<T>,
}

/// Snapshots `store` once, then aggregates, filters, sorts and pages the copy.
pub fn query<T: MetricRecord>(store: &BoundedMetricStore<T>, filter: &MetricFilter) -> QueryResult<T> {
    let snapshot = store.snapshot();
    let aggregate = aggregate(&snapshot);

    let mut matched: Vec<T> = snapshot.into_iter().filter(|r| filter.matches(r)).collect();

    // Later insertions first so equal keys come out newest-first under a
    // stable sort; ascending order keeps insertion order for ties.
    if !filter.ascending {
        matched.reverse();
    }
    let compare = |a: &T, b: &T| -> Ordering {
        match filter.sort {
            SortKey::Timestamp => a.timestamp().cmp(&b.timestamp()),
            SortKey::Duration => a.duration_ms().total_cmp(&b.duration_ms()),
        }
    };
    if filter.ascending {
        matched.sort_by(compare);
    } else {
        matched.sort_by(|a, b| compare(b, a));
    }

    let total_matched = matched.len();
    let records = matched
        .into_iter()
        .skip(filter.offset)
        .take(filter.limit)
        .collect();

    QueryResult {
        kind: T::KIND,
        aggregate,
        matched: total_matched,
        offset: filter.offset,
        limit: filter.limit,
        records,
    }
}
