//! Periodic node-status rows built from host metrics.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config_client::client::META_VERSION;
use crate::metrics::MetricsSource;
use crate::storage::{MetadataStore, NodeStatus};

pub struct StatusReporter {
    region_id: u32,
    system_id: u32,
    metrics: Arc<dyn MetricsSource>,
    store: Arc<dyn MetadataStore>,
}

impl StatusReporter {
    pub fn new(
        region_id: u32,
        system_id: u32,
        metrics: Arc<dyn MetricsSource>,
        store: Arc<dyn MetadataStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            region_id,
            system_id,
            metrics,
            store,
        })
    }

    /// Samples the host once and stores the row.
    pub fn report(&self) {
        let status = NodeStatus {
            region_id: self.region_id,
            system_id: self.system_id,
            meta_version: META_VERSION,
            metrics: self.metrics.sample(),
            timestamp: crate::unix_now(),
        };
        debug!(
            "Node status: cpu {}%, disk free {}",
            status.metrics.cpu_percent, status.metrics.disk_free
        );
        if let Err(e) = self.store.insert_node_status(status) {
            error!("Failed to record node status: {}", e);
        }
    }

    pub async fn run(self: Arc<Self>, every: Duration, mut shutdown: watch::Receiver<bool>) {
        info!("Status reporter started (every {:?})", every);
        let mut interval = tokio::time::interval(every);

        loop {
            tokio::select! {
                _ = interval.tick() => self.report(),
                _ = shutdown.changed() => {
                    info!("Status reporter stopping");
                    break;
                }
            }
        }
    }
}
