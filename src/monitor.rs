use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bridge::PrometheusBridge;
use crate::config::{CapacitySection, MonitorConfig, Thresholds};
use crate::error::Result;
use crate::janitor::RetentionJanitor;
use crate::metrics::{
    BoundedMetricStore, CacheMetric, ClientVitalMetric, DatastoreMetric, MetricKind,
    RequestMetric, ResourceSample, TaskMetric,
};
use crate::sampler::{ResourceProbe, ResourceSampler, SysinfoProbe};
use crate::background;

/// One bounded store per record family.
pub struct Stores {
    pub requests: BoundedMetricStore<RequestMetric>,
    pub datastore: BoundedMetricStore<DatastoreMetric>,
    pub cache: BoundedMetricStore<CacheMetric>,
    pub tasks: BoundedMetricStore<TaskMetric>,
    pub resources: BoundedMetricStore<ResourceSample>,
    pub client_vitals: BoundedMetricStore<ClientVitalMetric>,
}

impl Stores {
    pub fn new(capacity: &CapacitySection) -> Self {
        Self {
            requests: BoundedMetricStore::new(capacity.requests),
            datastore: BoundedMetricStore::new(capacity.datastore),
            cache: BoundedMetricStore::new(capacity.cache),
            tasks: BoundedMetricStore::new(capacity.tasks),
            resources: BoundedMetricStore::new(capacity.resources),
            client_vitals: BoundedMetricStore::new(capacity.client_vitals),
        }
    }

    pub fn clear_all(&self) {
        self.requests.clear();
        self.datastore.clear();
        self.cache.clear();
        self.tasks.clear();
        self.resources.clear();
        self.client_vitals.clear();
    }

    pub fn sizes(&self) -> BTreeMap<MetricKind, usize> {
        BTreeMap::from([
            (MetricKind::Database, self.datastore.len()),
            (MetricKind::Redis, self.cache.len()),
            (MetricKind::Api, self.requests.len()),
            (MetricKind::Celery, self.tasks.len()),
            (MetricKind::System, self.resources.len()),
            (MetricKind::WebVitals, self.client_vitals.len()),
        ])
    }
}

/// The performance monitor. Built once at startup and handed to every
/// collector and handler as `Arc<Monitor>`.
pub struct Monitor {
    config: MonitorConfig,
    thresholds: RwLock<Thresholds>,
    stores: Stores,
    bridge: PrometheusBridge,
    started_at: Instant,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let bridge = PrometheusBridge::new(&config.prometheus.namespace)?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Arc::new(Self {
            thresholds: RwLock::new(config.thresholds),
            stores: Stores::new(&config.capacity),
            bridge,
            started_at: Instant::now(),
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
            config,
        }))
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn bridge(&self) -> &PrometheusBridge {
        &self.bridge
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Copy of the thresholds active right now.
    pub fn thresholds(&self) -> Thresholds {
        *self.thresholds.read()
    }

    /// Applies the whole update or none of it.
    pub fn update_thresholds(&self, update: &Map<String, Value>) -> Result<Thresholds> {
        let mut guard = self.thresholds.write();
        let next = guard.with_update(update)?;
        *guard = next;
        info!(keys = ?update.keys().collect::<Vec<_>>(), "thresholds updated");
        Ok(next)
    }

    /// Clears every store. Prometheus cursors are left alone since store
    /// sequence numbers never rewind.
    pub fn reset(&self) {
        self.stores.clear_all();
        warn!("all metric stores reset");
    }

    /// Spawns the janitor, the sysinfo sampler and the Prometheus sync loop
    /// according to config. Must be called inside a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        self.start_with_probe(SysinfoProbe::new());
    }

    /// No-op once loops are running or after `shutdown`.
    pub fn start_with_probe<P: ResourceProbe>(self: &Arc<Self>, probe: P) {
        let mut workers = self.workers.lock();
        if *self.shutdown_tx.borrow() {
            warn!("monitor already shut down, background loops not started");
            return;
        }
        if !workers.is_empty() {
            warn!("background loops already running");
            return;
        }

        let janitor = RetentionJanitor::new(self.config.retention.days);
        let monitor = self.clone();
        workers.push(tokio::spawn(background::run_loop(
            "retention-janitor",
            Duration::from_secs(self.config.retention.sweep_interval_secs),
            Duration::from_secs(self.config.retention.error_backoff_secs),
            self.shutdown_tx.subscribe(),
            move || janitor.sweep(monitor.stores(), chrono::Utc::now()).map(|_| ()),
        )));

        if self.config.sampler.enabled {
            let mut sampler = ResourceSampler::new(self.clone(), probe);
            workers.push(tokio::spawn(background::run_loop(
                "resource-sampler",
                Duration::from_secs(self.config.sampler.interval_secs),
                Duration::from_secs(self.config.sampler.error_backoff_secs),
                self.shutdown_tx.subscribe(),
                move || sampler.tick().map(|_| ()),
            )));
        }

        if self.config.prometheus.enabled {
            let monitor = self.clone();
            workers.push(tokio::spawn(background::run_loop(
                "prometheus-sync",
                Duration::from_secs(self.config.prometheus.sync_interval_secs),
                Duration::from_secs(self.config.prometheus.error_backoff_secs),
                self.shutdown_tx.subscribe(),
                move || monitor.bridge().sync(monitor.stores()).map(|_| ()),
            )));
        }

        info!(loops = workers.len(), "background loops started");
    }

    /// Receiver that flips to `true` once `shutdown` is called.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Stops every background loop and waits for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for h in handles {
            // Ignore JoinError, a loop that panicked is already gone
            let _ = h.await;
        }
        info!("monitor shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejected_update_leaves_thresholds_untouched() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        let before = monitor.thresholds();
        let update = json!({"slow_api_threshold_ms": 500, "bogus_key": 1});
        assert!(monitor.update_thresholds(update.as_object().unwrap()).is_err());
        assert_eq!(monitor.thresholds(), before);

        let update = json!({"slow_api_threshold_ms": 500});
        let after = monitor.update_thresholds(update.as_object().unwrap()).unwrap();
        assert_eq!(after.slow_api_threshold_ms, 500.0);
        assert_eq!(monitor.thresholds().slow_api_threshold_ms, 500.0);
    }

    #[tokio::test]
    async fn shutdown_stops_background_loops() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        monitor.start_with_probe(crate::sampler::tests::FixedProbe::default());
        assert_eq!(monitor.workers.lock().len(), 3);

        tokio::time::timeout(Duration::from_secs(5), monitor.shutdown())
            .await
            .expect("loops must stop promptly");
        assert!(monitor.workers.lock().is_empty());
        assert!(*monitor.shutdown_signal().borrow());
    }

    #[tokio::test]
    async fn start_is_idempotent_and_refused_after_shutdown() {
        use crate::sampler::tests::FixedProbe;

        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        monitor.start_with_probe(FixedProbe::default());
        monitor.start_with_probe(FixedProbe::default());
        assert_eq!(monitor.workers.lock().len(), 3);

        monitor.shutdown().await;
        monitor.start_with_probe(FixedProbe::default());
        assert!(monitor.workers.lock().is_empty());
    }
}
