//! In-process performance monitor: bounded metric stores fed by
//! instrumentation hooks, threshold flagging, retention pruning, resource
//! sampling, queries, JSON/CSV export and a Prometheus bridge.

use std::sync::Arc;

use redis::aio::ConnectionManager;

mod background;
pub mod bridge;
pub mod collectors;
pub mod config;
pub mod error;
pub mod export;
pub mod handlers;
pub mod janitor;
pub mod metrics;
pub mod monitor;
pub mod query;
pub mod sampler;
pub mod server;

pub use error::{MonitorError, Result};
pub use monitor::Monitor;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Central metrics engine. Collectors push records, handlers read snapshots.
    pub monitor: Arc<Monitor>,

    /// Instrumented Redis handle, probed by `/healthz` when configured.
    pub cache: Option<collectors::InstrumentedCache<ConnectionManager>>,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self {
            monitor,
            cache: None,
        }
    }
}
