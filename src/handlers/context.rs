use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config_client::{ConfigLookup, ConfigReply, PeerEndpoint, SiteVersions};
use crate::gateway::GatewayRegistry;
use crate::peer::PeerTransport;
use crate::storage::MetadataStore;
use crate::wire::{Command, Header, PeerType, frame};

/// Who this node is on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeIdentity {
    pub node_id: u32,
    pub region_id: u32,
    pub system_id: u32,
}

/// What the connection loop does after a handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Write this frame back on the same connection.
    Reply(Bytes),
    /// Nothing to send.
    Silent,
    /// Close the connection without replying.
    Close,
}

impl Outcome {
    pub fn reply(header: Header, body: &[u8]) -> Self {
        Outcome::Reply(frame(header, body))
    }
}

/// Shared state handed to every handler. Cheap to share across connection tasks.
pub struct NodeContext {
    pub identity: NodeIdentity,
    pub gateways: Arc<GatewayRegistry>,
    pub store: Arc<dyn MetadataStore>,
    pub config: Arc<dyn ConfigLookup>,
    pub peers: Arc<dyn PeerTransport>,
    versions: DashMap<u32, SiteVersions>,
}

impl NodeContext {
    pub fn new(
        identity: NodeIdentity,
        gateways: Arc<GatewayRegistry>,
        store: Arc<dyn MetadataStore>,
        config: Arc<dyn ConfigLookup>,
        peers: Arc<dyn PeerTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            gateways,
            store,
            config,
            peers,
            versions: DashMap::new(),
        })
    }

    pub fn reply_header(
        &self,
        request: &Header,
        command: Command,
        ack_code: u32,
        dst_type: PeerType,
    ) -> Header {
        request.reply(command, ack_code, self.identity.node_id, dst_type)
    }

    /// Config for `site_id`, preferring a pending push notice over a fresh query.
    pub async fn site_config(&self, site_id: u32) -> Option<ConfigReply> {
        if let Some(notice) = self.config.peek_notice(site_id) {
            return Some(notice);
        }
        self.config.lookup(site_id).await
    }

    /// Sibling nodes that may hold rows for `site_id`, excluding this node.
    pub async fn peer_regions(&self, site_id: u32) -> Vec<PeerEndpoint> {
        let Some(reply) = self.site_config(site_id).await else {
            warn!("No config for site {}, serving local rows only", site_id);
            return Vec::new();
        };
        let peers: Vec<PeerEndpoint> = reply
            .peer_regions(site_id)
            .into_iter()
            .filter(|p| p.node_id != self.identity.node_id)
            .collect();
        debug!("Site {} has {} peer regions", site_id, peers.len());
        peers
    }

    /// Versions reported to a heart-beating client, cached per site.
    ///
    /// A pushed notice replaces the cached value; a failed lookup reports zeros and is
    /// not cached.
    pub async fn site_versions(&self, site_id: u32) -> SiteVersions {
        if let Some(notice) = self.config.take_notice(site_id) {
            let versions = notice.versions();
            self.versions.insert(site_id, versions);
            return versions;
        }
        if let Some(cached) = self.versions.get(&site_id) {
            return *cached;
        }
        match self.config.lookup(site_id).await {
            Some(reply) => {
                let versions = reply.versions();
                self.versions.insert(site_id, versions);
                versions
            }
            None => SiteVersions::default(),
        }
    }
}
