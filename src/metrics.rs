//! Host metrics sampled for the config-service heartbeat and the node status rows.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use sysinfo::{Disks, Networks, System};

/// One sample of this host's load and capacity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub cpu_percent: u32,
    pub mem_used: u64,
    pub mem_free: u64,
    pub disk_used: u64,
    pub disk_free: u64,
    /// Bytes received on all interfaces since boot.
    pub netio_input: u64,
    /// Bytes sent on all interfaces since boot.
    pub netio_output: u64,
}

pub trait MetricsSource: Send + Sync {
    fn sample(&self) -> NodeMetrics;
}

/// `sysinfo`-backed sampler. CPU usage is measured between consecutive samples.
pub struct SystemMetrics {
    system: Mutex<System>,
}

impl SystemMetrics {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for SystemMetrics {
    fn sample(&self) -> NodeMetrics {
        let (cpu_percent, mem_used, mem_free) = {
            let mut system = self
                .system
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            system.refresh_cpu_usage();
            system.refresh_memory();
            (
                system.global_cpu_usage().round() as u32,
                system.used_memory(),
                system.available_memory(),
            )
        };

        let disks = Disks::new_with_refreshed_list();
        let (disk_total, disk_free) = disks.list().iter().fold((0u64, 0u64), |acc, disk| {
            (acc.0 + disk.total_space(), acc.1 + disk.available_space())
        });

        let networks = Networks::new_with_refreshed_list();
        let (netio_input, netio_output) = networks
            .list()
            .values()
            .fold((0u64, 0u64), |acc, data| {
                (acc.0 + data.total_received(), acc.1 + data.total_transmitted())
            });

        NodeMetrics {
            cpu_percent,
            mem_used,
            mem_free,
            disk_used: disk_total.saturating_sub(disk_free),
            disk_free,
            netio_input,
            netio_output,
        }
    }
}

/// Fixed sample, for tests and hosts where probing is unwanted.
pub struct StaticMetrics(pub NodeMetrics);

impl MetricsSource for StaticMetrics {
    fn sample(&self) -> NodeMetrics {
        self.0.clone()
    }
}
