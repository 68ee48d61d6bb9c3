//! Stateless threshold checks. Callers pass the threshold snapshot that is
//! active at insertion time; nothing here is ever re-evaluated later.

use super::records::Resource;
use crate::config::Thresholds;

/// Strictly greater-than: a value equal to the limit is not slow.
pub fn is_slow(duration_ms: f64, threshold_ms: f64) -> bool {
    duration_ms > threshold_ms
}

/// Resources whose usage percentage is over its configured maximum.
pub fn resource_breaches(
    cpu_percent: f64,
    memory_percent: f64,
    disk_percent: f64,
    thresholds: &Thresholds,
) -> Vec<Resource> {
    [
        (Resource::Cpu, cpu_percent, thresholds.cpu_usage_max_percent),
        (Resource::Memory, memory_percent, thresholds.memory_usage_max_percent),
        (Resource::Disk, disk_percent, thresholds.disk_usage_max_percent),
    ]
    .into_iter()
    .filter(|(_, value, max)| is_slow(*value, *max))
    .map(|(resource, _, _)| resource)
    .collect()
}
