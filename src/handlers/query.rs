use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use super::context::{NodeContext, Outcome};
use crate::error::Result;
use crate::peer::peer_request;
use crate::query::{
    FileEntry, FileQuery, LocalSource, PeerSource, REMOTE_ROWS_KEY, RemoteRows, RowSource, gather_page,
};
use crate::storage::FileFilter;
use crate::wire::codec::{encode_task, json_body, parse_json};
use crate::wire::{ACK_OK, Command, Header, PeerType};

/// Local match count. A store failure counts as zero so the requester still gets a reply.
fn local_count(ctx: &NodeContext, filter: &FileFilter) -> u64 {
    ctx.store.count_files(filter).unwrap_or_else(|e| {
        error!("Local count failed: {}", e);
        0
    })
}

/// `CLIENT_QUERY_NUM`: local count plus the count of every sibling region.
///
/// The requester's site is the header's `src_id`. An unreachable region adds nothing.
pub async fn handle_query_count(
    ctx: &NodeContext,
    header: &Header,
    body: &[u8],
) -> Result<Outcome> {
    let query: FileQuery = parse_json(body)?;
    let local = local_count(ctx, &query.filter());

    let mut remote = 0u64;
    for peer in ctx.peer_regions(header.src_id).await {
        let request = peer_request(
            ctx.identity.node_id,
            header,
            Command::RemoteQueryNum,
            &peer,
            0,
            0,
            body,
        );
        match ctx.peers.exchange(&peer, request).await {
            Ok(reply)
                if reply.header.command == Command::RemoteQueryNumResp.code()
                    && reply.header.ack_code == ACK_OK =>
            {
                debug!("Region {} counts {}", peer.region_id, reply.header.total);
                remote += reply.header.total;
            }
            Ok(reply) => warn!(
                "Region {} answered count with 0x{:08x} ack {}",
                peer.region_id, reply.header.command, reply.header.ack_code
            ),
            Err(e) => warn!("Skipping region {} in count: {}", peer.region_id, e),
        }
    }

    info!(
        "Count for site {}: {} local + {} remote",
        header.src_id, local, remote
    );
    let mut reply = ctx.reply_header(header, Command::ClientQueryNumResp, ACK_OK, PeerType::Client);
    reply.total = local + remote;
    Ok(Outcome::reply(reply, body))
}

/// `CLIENT_QUERY_DATA`: one globally sorted page across this node and its sibling regions.
///
/// The reply body is the page as back-to-back task records. Proxy slots point at this
/// node's selected gateway; sgw slots keep the gateway of the region holding the row.
pub async fn handle_query_data(
    ctx: &NodeContext,
    header: &Header,
    body: &[u8],
) -> Result<Outcome> {
    let query: FileQuery = parse_json(body)?;
    let sort = query.sort();
    let gateway = ctx.gateways.select_gateway().ok();

    let mut page: Vec<FileEntry> = Vec::new();
    if header.count > 0 {
        let peers = ctx.peer_regions(header.src_id).await;
        let local = LocalSource {
            store: ctx.store.as_ref(),
            filter: query.filter(),
            sort: sort.clone(),
            gateway,
        };
        let forwarded = Bytes::copy_from_slice(body);
        let remote: Vec<PeerSource<'_>> = peers
            .into_iter()
            .map(|peer| PeerSource {
                transport: ctx.peers.as_ref(),
                peer,
                origin: *header,
                local_id: ctx.identity.node_id,
                body: forwarded.clone(),
            })
            .collect();

        let mut sources: Vec<&dyn RowSource> = vec![&local];
        sources.extend(remote.iter().map(|p| p as &dyn RowSource));
        page = gather_page(&sources, &sort, header.offset, header.count).await;
    }

    let mut buf = BytesMut::new();
    for entry in page.iter_mut() {
        if let Some(selection) = &gateway {
            entry.set_proxy(selection);
        }
        encode_task(&entry.to_task(), &mut buf)?;
    }

    info!(
        "Query page for site {}: {} rows at offset {}",
        header.src_id,
        page.len(),
        header.offset
    );
    let mut reply = ctx.reply_header(header, Command::ClientQueryDataResp, ACK_OK, PeerType::Client);
    reply.count = page.len() as u32;
    Ok(Outcome::reply(reply, &buf))
}

/// `REMOTE_QUERY_NUM`: local count only, for a sibling node.
pub async fn handle_remote_query_count(
    ctx: &NodeContext,
    header: &Header,
    body: &[u8],
) -> Result<Outcome> {
    let query: FileQuery = parse_json(body)?;
    let local = local_count(ctx, &query.filter());

    let mut reply = ctx.reply_header(header, Command::RemoteQueryNumResp, ACK_OK, PeerType::Metadata);
    reply.total = local;
    reply.count = 0;
    Ok(Outcome::reply(reply, body))
}

/// `REMOTE_QUERY_DATA`: local rows `[offset, offset + count)` for a sibling node.
///
/// Rows travel under the `"site_id"` key of the reply object. A store failure answers with
/// an empty list.
pub async fn handle_remote_query_data(
    ctx: &NodeContext,
    header: &Header,
    body: &[u8],
) -> Result<Outcome> {
    let query: FileQuery = parse_json(body)?;
    let gateway = ctx.gateways.select_gateway().ok();

    let rows = ctx
        .store
        .query_files(&query.filter(), &query.sort(), header.offset, header.count)
        .unwrap_or_else(|e| {
            error!("Local page for node 0x{:08x} failed: {}", header.src_id, e);
            Vec::new()
        });
    let entries: Vec<FileEntry> = rows
        .iter()
        .map(|row| FileEntry::from_row(row, gateway.as_ref()))
        .collect();
    let served = entries.len();

    let mut result: RemoteRows = BTreeMap::new();
    result.insert(REMOTE_ROWS_KEY.to_string(), entries);
    let reply_body = json_body(&result)?;

    debug!(
        "Serving {} rows at offset {} to node 0x{:08x}",
        served, header.offset, header.src_id
    );
    let mut reply = ctx.reply_header(header, Command::RemoteQueryDataResp, ACK_OK, PeerType::Metadata);
    reply.count = served as u32;
    Ok(Outcome::reply(reply, &reply_body))
}
