use tracing::{debug, error, warn};

use super::context::{NodeContext, Outcome};
use super::{delete, heartbeat, query, upgrade, upload};
use crate::error::Result;
use crate::wire::{Command, Header};

/// Routes one decoded request to its handler.
///
/// Unknown opcodes and opcodes this node never serves are logged and dropped; the
/// connection stays open. Handler errors are returned to the connection loop, which
/// decides whether they end the connection.
pub async fn dispatch(ctx: &NodeContext, header: &Header, body: &[u8]) -> Result<Outcome> {
    let command = match Command::try_from(header.command) {
        Ok(command) => command,
        Err(e) => {
            error!("{} from peer 0x{:08x}", e, header.src_id);
            return Ok(Outcome::Silent);
        }
    };
    debug!(
        "{:?} from 0x{:08x} (trans {}, {} body bytes)",
        command,
        header.src_id,
        header.trans_id,
        body.len()
    );

    match command {
        Command::ClientUploadRoute => upload::handle_upload_route(ctx, header, body).await,
        Command::ClientUploadSuccess => upload::handle_upload_success(ctx, header, body).await,
        Command::ClientQueryNum => query::handle_query_count(ctx, header, body).await,
        Command::ClientQueryData => query::handle_query_data(ctx, header, body).await,
        Command::ClientConfigUpgrade => upgrade::handle_config_upgrade(ctx, header, body).await,
        Command::ClientUpgrade => upgrade::handle_client_upgrade(ctx, header, body).await,
        Command::ClientDel => delete::handle_delete(ctx, header, body).await,
        Command::ClientHb => heartbeat::handle_client_heartbeat(ctx, header, body).await,
        Command::SgwHb => heartbeat::handle_gateway_heartbeat(ctx, header, body).await,
        Command::RemoteQueryNum => query::handle_remote_query_count(ctx, header, body).await,
        Command::RemoteQueryData => query::handle_remote_query_data(ctx, header, body).await,
        Command::RemoteDel => delete::handle_remote_delete(ctx, header, body).await,
        other => {
            warn!("Ignoring {:?} on the client port", other);
            Ok(Outcome::Silent)
        }
    }
}
