use std::collections::VecDeque;
use std::net::Ipv4Addr;

/// Where a gateway accepts transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GatewayAddr {
    pub ip: u32,
    pub port: u16,
    pub gateway_id: u32,
}

impl GatewayAddr {
    pub fn ipv4(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip)
    }
}

/// What one heartbeat tells the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayReport {
    pub group_id: u32,
    pub region_id: u32,
    pub system_id: u32,
    pub disk_free: u64,
    pub addr: GatewayAddr,
}

/// Registry state for one gateway group.
#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub group_id: u32,
    pub region_id: u32,
    pub system_id: u32,
    /// Free disk from the most recent heartbeat of any member.
    pub disk_free: u64,
    /// Round-robin order; the front is handed out next.
    pub rotation: VecDeque<GatewayAddr>,
}

impl GroupEntry {
    pub fn new(report: &GatewayReport) -> Self {
        Self {
            group_id: report.group_id,
            region_id: report.region_id,
            system_id: report.system_id,
            disk_free: report.disk_free,
            rotation: VecDeque::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Liveness {
    /// Unix seconds of the last heartbeat.
    pub last_seen: u64,
    pub group_id: u32,
}

/// A gateway picked for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub addr: GatewayAddr,
    pub region_id: u32,
    pub system_id: u32,
    pub group_id: u32,
}
