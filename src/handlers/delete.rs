use bytes::BytesMut;
use tracing::{error, info, warn};

use super::context::{NodeContext, Outcome};
use crate::error::Result;
use crate::peer::peer_request;
use crate::storage::FileKey;
use crate::wire::codec::{decode_task, encode_task};
use crate::wire::{ACK_NOT_FOUND, ACK_OK, Command, Header, PeerType, TaskRecord};

fn file_key(record: &TaskRecord) -> FileKey {
    FileKey {
        site_id: record.info.site_id,
        app_id: record.info.app_id,
        file_name: record.info.file_name.text(),
        user_id: record.owner.user_id,
        customer_id: record.owner.customer_id.clone(),
        timestamp: record.info.timestamp,
    }
}

fn delete_local(ctx: &NodeContext, record: &TaskRecord) -> usize {
    match ctx.store.delete_files(&file_key(record)) {
        Ok(n) => n,
        Err(e) => {
            error!("Local delete of {:?} failed: {}", record.info.file_name, e);
            0
        }
    }
}

/// Points both gateway slots at this node's selected gateway, when there is one.
fn refresh_gateway(ctx: &NodeContext, record: &mut TaskRecord) {
    if let Ok(selection) = ctx.gateways.select_gateway() {
        let addr = selection.addr;
        record.info.region_id = selection.region_id as u16;
        record.info.set_gateway(addr.ip, addr.port, addr.gateway_id);
        record.info.set_proxy(addr.ip, addr.port, addr.gateway_id);
    }
}

fn task_reply(
    ctx: &NodeContext,
    header: &Header,
    command: Command,
    ack: u32,
    dst_type: PeerType,
    record: &TaskRecord,
) -> Result<Outcome> {
    let mut buf = BytesMut::new();
    encode_task(record, &mut buf)?;
    Ok(Outcome::reply(ctx.reply_header(header, command, ack, dst_type), &buf))
}

/// `CLIENT_DEL`: delete locally, else ask sibling regions one at a time.
///
/// Sibling regions are those of the requesting site, the header's `src_id`. The first region
/// that deletes the row wins and its record is relayed back with the proxy slot rewritten to
/// this node's gateway. No match anywhere answers not-found.
pub async fn handle_delete(ctx: &NodeContext, header: &Header, body: &[u8]) -> Result<Outcome> {
    let (mut record, _) = decode_task(body)?;
    let site_id = header.src_id;

    if delete_local(ctx, &record) > 0 {
        info!("Deleted {:?} of site {} locally", record.info.file_name, site_id);
        refresh_gateway(ctx, &mut record);
        return task_reply(ctx, header, Command::ClientDelResp, ACK_OK, PeerType::Client, &record);
    }

    for peer in ctx.peer_regions(site_id).await {
        let request = peer_request(ctx.identity.node_id, header, Command::RemoteDel, &peer, 0, 0, body);
        let reply = match ctx.peers.exchange(&peer, request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Skipping region {} for delete: {}", peer.region_id, e);
                continue;
            }
        };
        if reply.header.command != Command::RemoteDelResp.code() || reply.header.ack_code != ACK_OK {
            info!("Region {} has no match for {:?}", peer.region_id, record.info.file_name);
            continue;
        }

        let mut relayed = match decode_task(&reply.body) {
            Ok((remote, _)) => remote,
            Err(e) => {
                warn!("Region {} confirmed delete with unreadable body: {}", peer.region_id, e);
                record.clone()
            }
        };
        if let Ok(selection) = ctx.gateways.select_gateway() {
            let addr = selection.addr;
            relayed.info.region_id = selection.region_id as u16;
            relayed.info.set_proxy(addr.ip, addr.port, addr.gateway_id);
        }
        info!(
            "Region {} deleted {:?} of site {}",
            peer.region_id, record.info.file_name, site_id
        );
        return task_reply(ctx, header, Command::ClientDelResp, ACK_OK, PeerType::Client, &relayed);
    }

    info!("No region holds {:?} of site {}", record.info.file_name, site_id);
    let reply = ctx.reply_header(header, Command::ClientDelResp, ACK_NOT_FOUND, PeerType::Client);
    Ok(Outcome::reply(reply, body))
}

/// `REMOTE_DEL`: local delete only, for a sibling node.
pub async fn handle_remote_delete(
    ctx: &NodeContext,
    header: &Header,
    body: &[u8],
) -> Result<Outcome> {
    let (mut record, _) = decode_task(body)?;

    if delete_local(ctx, &record) > 0 {
        info!(
            "Deleted {:?} of site {} for node 0x{:08x}",
            record.info.file_name, record.info.site_id, header.src_id
        );
        refresh_gateway(ctx, &mut record);
        return task_reply(ctx, header, Command::RemoteDelResp, ACK_OK, PeerType::Metadata, &record);
    }

    let reply = ctx.reply_header(header, Command::RemoteDelResp, ACK_NOT_FOUND, PeerType::Metadata);
    Ok(Outcome::reply(reply, body))
}
