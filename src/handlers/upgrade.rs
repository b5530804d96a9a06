use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::context::{NodeContext, Outcome};
use crate::error::Result;
use crate::wire::codec::{json_body, parse_json};
use crate::wire::lenient;
use crate::wire::{ACK_NOT_FOUND, ACK_OK, Command, Header, PeerType};

#[derive(Debug, Deserialize)]
struct UpgradeRequest {
    #[serde(deserialize_with = "lenient::u32_from_any")]
    site_id: u32,
}

fn unavailable(ctx: &NodeContext, header: &Header, command: Command) -> Result<Outcome> {
    let reply = ctx.reply_header(header, command, ACK_NOT_FOUND, PeerType::Client);
    Ok(Outcome::reply(reply, b"{}"))
}

/// `CLIENT_CONFIG_UPGRADE`: which metadata node the site should talk to.
pub async fn handle_config_upgrade(
    ctx: &NodeContext,
    header: &Header,
    body: &[u8],
) -> Result<Outcome> {
    let request: UpgradeRequest = parse_json(body)?;
    let home = ctx
        .site_config(request.site_id)
        .await
        .and_then(|config| config.home_region());

    let Some(home) = home else {
        warn!("No home region known for site {}", request.site_id);
        return unavailable(ctx, header, Command::ClientConfigUpgradeResp);
    };

    let reply_body = json_body(&json!({
        "region_id": home.region_id,
        "metadata_ip": home.ip,
        "metadata_port": home.port,
    }))?;
    let reply = ctx.reply_header(header, Command::ClientConfigUpgradeResp, ACK_OK, PeerType::Client);
    Ok(Outcome::reply(reply, &reply_body))
}

/// `CLIENT_UPGRADE`: where the site downloads the current client package.
pub async fn handle_client_upgrade(
    ctx: &NodeContext,
    header: &Header,
    body: &[u8],
) -> Result<Outcome> {
    let request: UpgradeRequest = parse_json(body)?;

    let Some(config) = ctx.site_config(request.site_id).await else {
        warn!("No upgrade info for site {}", request.site_id);
        return unavailable(ctx, header, Command::ClientUpgradeResp);
    };

    let reply_body = json_body(&config.upgrade_package())?;
    let reply = ctx.reply_header(header, Command::ClientUpgradeResp, ACK_OK, PeerType::Client);
    Ok(Outcome::reply(reply, &reply_body))
}
