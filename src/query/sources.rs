use bytes::Bytes;

use super::gather::{RowSource, RowsFuture};
use super::types::{FileEntry, RemoteRows};
use crate::config_client::PeerEndpoint;
use crate::error::MetaError;
use crate::gateway::Selection;
use crate::peer::{PeerTransport, peer_request};
use crate::storage::{FileFilter, MetadataStore, SortSpec};
use crate::wire::codec::parse_json;
use crate::wire::{ACK_OK, Command, Header};

/// This node's own catalog.
pub struct LocalSource<'a> {
    pub store: &'a dyn MetadataStore,
    pub filter: FileFilter,
    pub sort: SortSpec,
    pub gateway: Option<Selection>,
}

impl RowSource for LocalSource<'_> {
    fn name(&self) -> String {
        "local store".to_string()
    }

    fn fetch(&self, offset: u64, limit: u32) -> RowsFuture<'_> {
        Box::pin(async move {
            let rows = self
                .store
                .query_files(&self.filter, &self.sort, offset, limit)?;
            Ok(rows
                .iter()
                .map(|row| FileEntry::from_row(row, self.gateway.as_ref()))
                .collect())
        })
    }
}

/// A sibling region answering `REMOTE_QUERY_DATA`.
pub struct PeerSource<'a> {
    pub transport: &'a dyn PeerTransport,
    pub peer: PeerEndpoint,
    pub origin: Header,
    pub local_id: u32,
    /// The client's filter body, forwarded untouched.
    pub body: Bytes,
}

impl RowSource for PeerSource<'_> {
    fn name(&self) -> String {
        format!("region {} ({})", self.peer.region_id, self.peer.address())
    }

    fn fetch(&self, offset: u64, limit: u32) -> RowsFuture<'_> {
        Box::pin(async move {
            let request = peer_request(
                self.local_id,
                &self.origin,
                Command::RemoteQueryData,
                &self.peer,
                offset,
                limit,
                &self.body,
            );
            let reply = self.transport.exchange(&self.peer, request).await?;
            if reply.header.command != Command::RemoteQueryDataResp.code()
                || reply.header.ack_code != ACK_OK
            {
                return Err(MetaError::PeerUnreachable {
                    peer: self.peer.address(),
                    reason: format!(
                        "unexpected reply 0x{:08x} ack {}",
                        reply.header.command, reply.header.ack_code
                    ),
                });
            }
            let rows: RemoteRows = parse_json(&reply.body)?;
            Ok(rows.into_values().flatten().collect())
        })
    }
}
