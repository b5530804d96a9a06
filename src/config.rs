//! Node configuration: a JSON file, overridden from the command line.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{MetaError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address clients, gateways and sibling nodes connect to.
    pub listen_addr: SocketAddr,
    /// This node's id as configured fleet-wide, e.g. `"0x08000001"`.
    pub node_id: String,
    pub region_id: u32,
    pub system_id: u32,
    /// Runtime worker threads. Zero or more than the host has means the default.
    pub workers: usize,
    pub config_service: ConfigServiceConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigServiceConfig {
    pub addr: String,
    pub node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub heartbeat_interval_secs: u64,
    pub status_interval_secs: u64,
    pub gateway_expiry_secs: u64,
    pub sweep_interval_secs: u64,
    pub config_retry_attempts: usize,
    pub config_retry_delay_secs: u64,
    pub peer_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9110)),
            node_id: "0x08000001".to_string(),
            region_id: 1,
            system_id: 1,
            workers: 0,
            config_service: ConfigServiceConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Default for ConfigServiceConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9120".to_string(),
            node_id: "0x0a000001".to_string(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 10,
            status_interval_secs: 10,
            gateway_expiry_secs: 15,
            sweep_interval_secs: 5,
            config_retry_attempts: 3,
            config_retry_delay_secs: 3,
            peer_timeout_secs: 5,
        }
    }
}

impl TimingConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    pub fn gateway_expiry(&self) -> Duration {
        Duration::from_secs(self.gateway_expiry_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn config_retry_delay(&self) -> Duration {
        Duration::from_secs(self.config_retry_delay_secs)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MetaError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| MetaError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        parse_node_id(&self.node_id)?;
        parse_node_id(&self.config_service.node_id)?;

        if self.config_service.addr.trim().is_empty() {
            return Err(MetaError::Config("config_service.addr is empty".to_string()));
        }

        let t = &self.timing;
        let intervals = [
            ("heartbeat_interval_secs", t.heartbeat_interval_secs),
            ("status_interval_secs", t.status_interval_secs),
            ("sweep_interval_secs", t.sweep_interval_secs),
            ("gateway_expiry_secs", t.gateway_expiry_secs),
            ("peer_timeout_secs", t.peer_timeout_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(MetaError::Config(format!("timing.{} must be non-zero", name)));
        }
        if t.config_retry_attempts == 0 {
            return Err(MetaError::Config(
                "timing.config_retry_attempts must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn node_id(&self) -> Result<u32> {
        parse_node_id(&self.node_id)
    }

    pub fn config_service_id(&self) -> Result<u32> {
        parse_node_id(&self.config_service.node_id)
    }

    /// Configured worker count, clamped to three quarters of the host's cores.
    pub fn worker_threads(&self) -> usize {
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        let default = (cores * 3 / 4).max(1);
        if self.workers == 0 || self.workers > default {
            default
        } else {
            self.workers
        }
    }
}

/// Parses a node id written as hex (`"0x08000001"`, `"08000001"`) into its wire form.
pub fn parse_node_id(raw: &str) -> Result<u32> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 16)
        .map_err(|_| MetaError::Config(format!("invalid node id {:?}", raw)))
}
