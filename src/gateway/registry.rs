use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::types::*;
use crate::error::{MetaError, Result};
use crate::storage::MetadataStore;

/// How often `select_gateway` retries when the winning group vanished under it.
const SELECT_ATTEMPTS: usize = 3;

/// Concurrent gateway registry.
///
/// Each group lives in its own `DashMap` entry, so a heartbeat only locks the group it
/// touches. The liveness map is written before the group map on register; eviction locks
/// the group first and re-checks liveness, so a heartbeat racing a sweep is never lost.
pub struct GatewayRegistry {
    groups: DashMap<u32, GroupEntry>,
    liveness: DashMap<u32, Liveness>,
    expiry: Duration,
}

impl GatewayRegistry {
    pub fn new(expiry: Duration) -> Arc<Self> {
        Arc::new(Self {
            groups: DashMap::new(),
            liveness: DashMap::new(),
            expiry,
        })
    }

    /// Records a heartbeat. Returns true when the gateway was not live before.
    pub fn register_heartbeat(&self, report: GatewayReport, now: u64) -> bool {
        let sgw_id = report.addr.gateway_id;
        let previous = self.liveness.insert(
            sgw_id,
            Liveness {
                last_seen: now,
                group_id: report.group_id,
            },
        );

        if let Some(prev) = previous
            && prev.group_id != report.group_id
        {
            info!(
                "Gateway {} moved from group {} to {}",
                sgw_id, prev.group_id, report.group_id
            );
            self.detach(sgw_id, prev.group_id);
        }

        let mut group = self
            .groups
            .entry(report.group_id)
            .or_insert_with(|| GroupEntry::new(&report));
        group.disk_free = report.disk_free;
        group.region_id = report.region_id;
        group.system_id = report.system_id;
        match group.rotation.iter_mut().find(|a| a.gateway_id == sgw_id) {
            Some(existing) => *existing = report.addr,
            None => group.rotation.push_back(report.addr),
        }

        previous.is_none()
    }

    /// Picks a gateway from the group with the most free disk, lowest group id on ties,
    /// and rotates that group so the next call hands out its next address.
    pub fn select_gateway(&self) -> Result<Selection> {
        for _ in 0..SELECT_ATTEMPTS {
            let winner = self
                .groups
                .iter()
                .filter(|g| !g.rotation.is_empty())
                .max_by(|a, b| {
                    a.disk_free
                        .cmp(&b.disk_free)
                        .then_with(|| b.group_id.cmp(&a.group_id))
                })
                .map(|g| g.group_id);

            let Some(group_id) = winner else {
                return Err(MetaError::NoGatewayAvailable);
            };

            if let Some(mut group) = self.groups.get_mut(&group_id)
                && let Some(addr) = group.rotation.pop_front()
            {
                group.rotation.push_back(addr);
                return Ok(Selection {
                    addr,
                    region_id: group.region_id,
                    system_id: group.system_id,
                    group_id,
                });
            }
        }

        Err(MetaError::NoGatewayAvailable)
    }

    /// Evicts every gateway silent for longer than the expiry window and returns their ids.
    pub fn sweep_expired(&self, now: u64) -> Vec<u32> {
        let limit = self.expiry.as_secs();
        let stale: Vec<u32> = self
            .liveness
            .iter()
            .filter(|entry| now.saturating_sub(entry.last_seen) > limit)
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = Vec::new();
        for sgw_id in stale {
            let removed = self
                .liveness
                .remove_if(&sgw_id, |_, live| now.saturating_sub(live.last_seen) > limit);
            if let Some((_, live)) = removed
                && self.detach(sgw_id, live.group_id)
            {
                evicted.push(sgw_id);
            }
        }
        evicted
    }

    /// Removes `sgw_id` from `group_id` unless it re-registered there meanwhile.
    fn detach(&self, sgw_id: u32, group_id: u32) -> bool {
        let emptied = match self.groups.get_mut(&group_id) {
            Some(mut group) => {
                if self
                    .liveness
                    .get(&sgw_id)
                    .is_some_and(|live| live.group_id == group_id)
                {
                    return false;
                }
                group.rotation.retain(|a| a.gateway_id != sgw_id);
                group.rotation.is_empty()
            }
            None => return true,
        };

        if emptied {
            self.groups.remove_if(&group_id, |_, g| g.rotation.is_empty());
        }
        true
    }

    pub fn is_live(&self, sgw_id: u32) -> bool {
        self.liveness.contains_key(&sgw_id)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn gateway_count(&self) -> usize {
        self.liveness.len()
    }

    /// Current rotation of a group, front first.
    pub fn addresses(&self, group_id: u32) -> Vec<GatewayAddr> {
        self.groups
            .get(&group_id)
            .map(|g| g.rotation.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Background eviction loop; marks evicted gateways inactive in `store`.
    pub async fn run_sweeper(
        self: Arc<Self>,
        store: Arc<dyn MetadataStore>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Gateway sweeper started (every {:?}, expiry {:?})", every, self.expiry);
        let mut interval = tokio::time::interval(every);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => {
                    info!("Gateway sweeper stopping");
                    break;
                }
            }

            for sgw_id in self.sweep_expired(crate::unix_now()) {
                warn!("Gateway {} expired after {:?} without heartbeat", sgw_id, self.expiry);
                if let Err(e) = store.set_gateway_active(sgw_id, false) {
                    error!("Failed to mark gateway {} inactive: {}", sgw_id, e);
                }
            }
        }
    }
}
