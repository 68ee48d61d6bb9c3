//! Periodic OS resource sampling.

use std::sync::Arc;
use std::time::Instant;

use sysinfo::{Disks, Networks, System};

use crate::error::{MonitorError, Result};
use crate::metrics::ResourceSample;
use crate::monitor::Monitor;

/// One raw reading of machine resources.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceReading {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_available_bytes: u64,
    pub disk_percent: f64,
    pub network_bytes_sent: u64,
    pub network_bytes_received: u64,
}

/// Source of resource readings. Swappable so the loop can be driven
/// without touching the real OS.
pub trait ResourceProbe: Send + 'static {
    fn read(&mut self) -> Result<ResourceReading>;
}

/// `sysinfo`-backed probe. CPU usage is the delta since the previous read,
/// so the very first reading after construction may report 0%.
///
/// Disk and interface lists are enumerated once here; each read only
/// refreshes their counters.
pub struct SysinfoProbe {
    system: System,
    disks: Disks,
    networks: Networks,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn read(&mut self) -> Result<ResourceReading> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let total_memory = self.system.total_memory();
        if total_memory == 0 {
            return Err(MonitorError::Internal(
                "system memory information unavailable".into(),
            ));
        }
        let available = self.system.available_memory();
        let memory_percent =
            total_memory.saturating_sub(available) as f64 / total_memory as f64 * 100.0;

        self.disks.refresh();
        let (disk_total, disk_free) = self.disks.iter().fold((0u64, 0u64), |(t, f), d| {
            (t + d.total_space(), f + d.available_space())
        });
        let disk_percent = if disk_total > 0 {
            disk_total.saturating_sub(disk_free) as f64 / disk_total as f64 * 100.0
        } else {
            0.0
        };

        self.networks.refresh();
        let (sent, received) = self.networks.iter().fold((0u64, 0u64), |(s, r), (_, data)| {
            (s + data.total_transmitted(), r + data.total_received())
        });

        Ok(ResourceReading {
            cpu_percent: f64::from(self.system.global_cpu_usage()),
            memory_percent,
            memory_available_bytes: available,
            disk_percent,
            network_bytes_sent: sent,
            network_bytes_received: received,
        })
    }
}

/// Pushes one `ResourceSample` per tick into the monitor.
pub struct ResourceSampler<P> {
    monitor: Arc<Monitor>,
    probe: P,
}

impl<P: ResourceProbe> ResourceSampler<P> {
    pub fn new(monitor: Arc<Monitor>, probe: P) -> Self {
        Self { monitor, probe }
    }

    pub fn tick(&mut self) -> Result<ResourceSample> {
        let start = Instant::now();
        let reading = self.probe.read()?;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        Ok(self.monitor.record_resources(reading, duration_ms))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Probe returning a fixed reading.
    #[derive(Default)]
    pub(crate) struct FixedProbe(pub ResourceReading);

    impl ResourceProbe for FixedProbe {
        fn read(&mut self) -> Result<ResourceReading> {
            Ok(self.0)
        }
    }

    struct FailingProbe;

    impl ResourceProbe for FailingProbe {
        fn read(&mut self) -> Result<ResourceReading> {
            Err(MonitorError::Internal("probe offline".into()))
        }
    }

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn warnings_during<F: FnOnce()>(f: F) -> usize {
        let count = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(count.clone()));
        tracing::subscriber::with_default(subscriber, f);
        count.load(Ordering::SeqCst)
    }

    #[test]
    fn over_threshold_cpu_logs_a_warning() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        let update = json!({"cpu_usage_max_percent": 80});
        monitor.update_thresholds(update.as_object().unwrap()).unwrap();

        let hot = ResourceReading {
            cpu_percent: 95.0,
            memory_percent: 40.0,
            disk_percent: 40.0,
            ..ResourceReading::default()
        };
        let mut sampler = ResourceSampler::new(monitor.clone(), FixedProbe(hot));
        let warned = warnings_during(|| {
            let sample = sampler.tick().unwrap();
            assert!(sample.over_threshold.contains(&crate::metrics::Resource::Cpu));
        });
        assert_eq!(warned, 1);

        let calm = ResourceReading { cpu_percent: 50.0, ..hot };
        let mut sampler = ResourceSampler::new(monitor.clone(), FixedProbe(calm));
        let warned = warnings_during(|| {
            let sample = sampler.tick().unwrap();
            assert!(sample.over_threshold.is_empty());
        });
        assert_eq!(warned, 0);
        assert_eq!(monitor.stores().resources.len(), 2);
    }

    #[test]
    fn sysinfo_reads_reuse_disk_and_network_handles() {
        let mut probe = SysinfoProbe::new();
        let first = probe.read().unwrap();
        let second = probe.read().unwrap();
        for r in [first, second] {
            assert!((0.0..=100.0).contains(&r.memory_percent));
            assert!((0.0..=100.0).contains(&r.disk_percent));
        }
        // Cumulative interface counters never go backwards
        assert!(second.network_bytes_sent >= first.network_bytes_sent);
        assert!(second.network_bytes_received >= first.network_bytes_received);
    }

    #[test]
    fn probe_failure_surfaces_as_error() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        let mut sampler = ResourceSampler::new(monitor.clone(), FailingProbe);
        assert!(sampler.tick().is_err());
        assert!(monitor.stores().resources.is_empty());
    }
}
