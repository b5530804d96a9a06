use bytes::BytesMut;
use tracing::{error, info, warn};

use super::context::{NodeContext, Outcome};
use crate::error::Result;
use crate::storage::FileMetadata;
use crate::wire::codec::{decode_task, encode_task};
use crate::wire::{ACK_NOT_FOUND, ACK_OK, Command, Header, PeerType};

/// `CLIENT_UPLOAD_ROUTE`: pick the gateway the client should upload to.
///
/// The gateway fills both the sgw and proxy slots of the echoed record. The catalog row is
/// written at routing time.
pub async fn handle_upload_route(
    ctx: &NodeContext,
    header: &Header,
    body: &[u8],
) -> Result<Outcome> {
    let (mut record, _) = decode_task(body)?;

    let selection = match ctx.gateways.select_gateway() {
        Ok(selection) => selection,
        Err(e) => {
            warn!(
                "Upload route for site {} file {:?}: {}",
                record.info.site_id, record.info.file_name, e
            );
            record.info.set_gateway(0, 0, 0);
            record.info.set_proxy(0, 0, 0);
            let mut buf = BytesMut::new();
            encode_task(&record, &mut buf)?;
            let reply = ctx.reply_header(
                header,
                Command::ClientUploadRouteResp,
                ACK_NOT_FOUND,
                PeerType::Client,
            );
            return Ok(Outcome::reply(reply, &buf));
        }
    };

    let addr = selection.addr;
    record.info.region_id = selection.region_id as u16;
    record.info.set_gateway(addr.ip, addr.port, addr.gateway_id);
    record.info.set_proxy(addr.ip, addr.port, addr.gateway_id);

    let row = FileMetadata {
        site_id: record.info.site_id,
        app_id: record.info.app_id,
        file_name: record.info.file_name.text(),
        region_id: selection.region_id,
        system_id: selection.system_id,
        group_id: selection.group_id,
        user_id: record.owner.user_id,
        customer_id: record.owner.customer_id.clone(),
        timestamp: record.info.timestamp,
    };
    if let Err(e) = ctx.store.insert_file(row) {
        error!("Failed to catalog upload of {:?}: {}", record.info.file_name, e);
    }

    info!(
        "Routing upload of {:?} (site {}) to gateway {} at {}:{}",
        record.info.file_name,
        record.info.site_id,
        addr.gateway_id,
        addr.ipv4(),
        addr.port
    );

    let mut buf = BytesMut::new();
    encode_task(&record, &mut buf)?;
    let reply = ctx.reply_header(header, Command::ClientUploadRouteResp, ACK_OK, PeerType::Client);
    Ok(Outcome::reply(reply, &buf))
}

/// `CLIENT_UPLOAD_SUCCESS`: the client finished a transfer. Logged, no reply.
pub async fn handle_upload_success(
    _ctx: &NodeContext,
    _header: &Header,
    body: &[u8],
) -> Result<Outcome> {
    let (record, _) = decode_task(body)?;
    info!(
        "Upload of {:?} ({} bytes) by site {} completed via gateway {}",
        record.info.file_name, record.info.file_len, record.info.site_id, record.info.sgw_id
    );
    Ok(Outcome::Silent)
}
