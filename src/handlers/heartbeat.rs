use serde_json::json;
use tracing::{debug, error, info};

use super::context::{NodeContext, Outcome};
use crate::error::Result;
use crate::gateway::{GatewayAddr, GatewayReport};
use crate::storage::{ClientStatus, GatewayStatic, GatewayStatus};
use crate::wire::codec::{decode_client_heartbeat, decode_gateway_heartbeat, json_body};
use crate::wire::{ACK_OK, Command, Header, PeerType};

/// `CLIENT_HB`: record the client's status and tell it which versions to run.
pub async fn handle_client_heartbeat(
    ctx: &NodeContext,
    header: &Header,
    body: &[u8],
) -> Result<Outcome> {
    let hb = decode_client_heartbeat(body)?;
    debug!("Client heartbeat from site {}", hb.site_id);

    let status = ClientStatus {
        heartbeat: hb,
        received_at: crate::unix_now(),
    };
    if let Err(e) = ctx.store.insert_client_status(status) {
        error!("Failed to record heartbeat of site {}: {}", hb.site_id, e);
    }

    let versions = ctx.site_versions(hb.site_id).await;
    let reply_body = json_body(&json!({
        "config_version": versions.config_version,
        "client_version": versions.client_version,
    }))?;

    let mut reply = ctx.reply_header(header, Command::ClientHbResp, ACK_OK, PeerType::Client);
    reply.total = reply_body.len() as u64;
    reply.count = reply_body.len() as u32;
    Ok(Outcome::reply(reply, &reply_body))
}

/// `SGW_HB`: register a storage gateway of this region.
///
/// A gateway claiming another region or system is a misconfiguration; the connection is
/// closed without a reply.
pub async fn handle_gateway_heartbeat(
    ctx: &NodeContext,
    header: &Header,
    body: &[u8],
) -> Result<Outcome> {
    let hb = decode_gateway_heartbeat(body)?;
    let sgw_id = header.src_id;

    if hb.region_id != ctx.identity.region_id || hb.system_id != ctx.identity.system_id {
        error!(
            "Gateway {} reports region {} system {}, this node serves region {} system {}",
            sgw_id, hb.region_id, hb.system_id, ctx.identity.region_id, ctx.identity.system_id
        );
        return Ok(Outcome::Close);
    }

    let now = crate::unix_now();
    let newly_seen = ctx.gateways.register_heartbeat(
        GatewayReport {
            group_id: hb.group_id,
            region_id: hb.region_id,
            system_id: hb.system_id,
            disk_free: hb.disk_free,
            addr: GatewayAddr {
                ip: hb.listen_ip,
                port: hb.listen_port,
                gateway_id: sgw_id,
            },
        },
        now,
    );

    if let Err(e) = ctx.store.insert_gateway_status(GatewayStatus {
        sgw_id,
        heartbeat: hb,
        received_at: now,
    }) {
        error!("Failed to record heartbeat of gateway {}: {}", sgw_id, e);
    }

    if newly_seen {
        info!(
            "Gateway {} joined group {} at {}:{}",
            sgw_id,
            hb.group_id,
            std::net::Ipv4Addr::from(hb.listen_ip),
            hb.listen_port
        );
        let record = GatewayStatic {
            sgw_id,
            region_id: hb.region_id,
            system_id: hb.system_id,
            group_id: hb.group_id,
            ip: hb.listen_ip,
            port: hb.listen_port,
            version: hb.sgw_version,
            active: true,
        };
        if let Err(e) = ctx.store.upsert_gateway_static(record) {
            error!("Failed to register gateway {}: {}", sgw_id, e);
        }
    }

    let reply = ctx.reply_header(header, Command::SgwHbResp, ACK_OK, PeerType::Gateway);
    Ok(Outcome::reply(reply, &[]))
}
