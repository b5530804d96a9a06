use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::types::*;
use crate::config::NodeConfig;
use crate::error::{MetaError, Result};
use crate::metrics::MetricsSource;
use crate::storage::NodeStatus;
use crate::wire::codec::{json_body, parse_json};
use crate::wire::{Command, Frame, Header, PeerType, frame, read_message, write_frame};

/// Version reported in the node's own status heartbeat.
pub const META_VERSION: u32 = 1;

const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 30_000;

pub type LookupFuture<'a> = Pin<Box<dyn Future<Output = Option<ConfigReply>> + Send + 'a>>;

/// What handlers need from the config service.
pub trait ConfigLookup: Send + Sync {
    /// Queries the config for `site_id`, retrying; `None` once every attempt timed out.
    fn lookup(&self, site_id: u32) -> LookupFuture<'_>;

    /// Removes and returns a pushed notice for `site_id`.
    fn take_notice(&self, site_id: u32) -> Option<ConfigReply>;

    /// Returns a pushed notice for `site_id` without consuming it.
    fn peek_notice(&self, site_id: u32) -> Option<ConfigReply>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: usize,
    /// How long each attempt waits for the reply.
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct ConfigClientSettings {
    pub addr: String,
    pub local_id: u32,
    pub service_id: u32,
    pub region_id: u32,
    pub system_id: u32,
    pub heartbeat_interval: Duration,
    pub retry: RetryPolicy,
}

impl ConfigClientSettings {
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        Ok(Self {
            addr: config.config_service.addr.clone(),
            local_id: config.node_id()?,
            service_id: config.config_service_id()?,
            region_id: config.region_id,
            system_id: config.system_id,
            heartbeat_interval: config.timing.heartbeat_interval(),
            retry: RetryPolicy {
                attempts: config.timing.config_retry_attempts,
                delay: config.timing.config_retry_delay(),
            },
        })
    }
}

/// Key under which a pushed notice for `site_id` is kept.
pub fn notice_key(site_id: u64) -> String {
    format!("{}_info", site_id)
}

/// Single persistent connection to the config service.
///
/// Queries are correlated by site id: a waiter is registered under `site_id` before the
/// query goes out and the receive loop resolves every waiter registered for the reply's
/// `trans_id`.
pub struct ConfigClient {
    settings: ConfigClientSettings,
    writer: Mutex<Option<OwnedWriteHalf>>,
    waiters: DashMap<String, Vec<oneshot::Sender<ConfigReply>>>,
    notices: DashMap<String, ConfigReply>,
    metrics: Arc<dyn MetricsSource>,
    sequence: AtomicU64,
}

impl ConfigClient {
    pub fn new(settings: ConfigClientSettings, metrics: Arc<dyn MetricsSource>) -> Arc<Self> {
        Arc::new(Self {
            settings,
            writer: Mutex::new(None),
            waiters: DashMap::new(),
            notices: DashMap::new(),
            metrics,
            sequence: AtomicU64::new(0),
        })
    }

    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    fn header(&self, command: Command) -> Header {
        let mut header = Header::new(
            command,
            (PeerType::Metadata, self.settings.local_id),
            (PeerType::Config, self.settings.service_id),
        );
        header.sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        header
    }

    async fn send(&self, header: Header, body: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(MetaError::ConnectionClosed);
        };
        if let Err(e) = write_frame(stream, &frame(header, body)).await {
            *writer = None;
            return Err(e);
        }
        Ok(())
    }

    pub async fn send_query(&self, site_id: u32) -> Result<()> {
        let mut header = self.header(Command::ConfigQuery);
        header.trans_id = u64::from(site_id);
        let body = json_body(&ConfigQueryBody { site_id })?;
        self.send(header, &body).await
    }

    pub async fn send_heartbeat(&self) -> Result<()> {
        let status = NodeStatus {
            region_id: self.settings.region_id,
            system_id: self.settings.system_id,
            meta_version: META_VERSION,
            metrics: self.metrics.sample(),
            timestamp: crate::unix_now(),
        };
        let body = json_body(&status)?;
        self.send(self.header(Command::ConfigHb), &body).await
    }

    /// Sends the query for `site_id` up to the retry budget, waiting `delay` after each send.
    pub async fn query(&self, site_id: u32) -> Option<ConfigReply> {
        let key = site_id.to_string();
        let (tx, mut rx) = oneshot::channel();
        self.waiters.entry(key.clone()).or_default().push(tx);

        let attempts = self.settings.retry.attempts;
        for attempt in 1..=attempts {
            if let Err(e) = self.send_query(site_id).await {
                warn!(
                    "Config query for site {} not sent (attempt {}/{}): {}",
                    site_id, attempt, attempts, e
                );
            }
            match tokio::time::timeout(self.settings.retry.delay, &mut rx).await {
                Ok(Ok(reply)) => return Some(reply),
                Ok(Err(_)) => break,
                Err(_) => debug!(
                    "No config reply for site {} yet (attempt {}/{})",
                    site_id, attempt, attempts
                ),
            }
        }

        drop(rx);
        self.prune_waiters(&key);
        warn!("{}", MetaError::ConfigLookupExhausted { site_id, attempts });
        None
    }

    fn prune_waiters(&self, key: &str) {
        if let Some(mut pending) = self.waiters.get_mut(key) {
            pending.retain(|tx| !tx.is_closed());
        }
        self.waiters.remove_if(key, |_, pending| pending.is_empty());
    }

    fn deliver(&self, trans_id: u64, reply: ConfigReply) {
        let Some((_, pending)) = self.waiters.remove(&trans_id.to_string()) else {
            debug!("Config reply for site {} has no waiter, dropped", trans_id);
            return;
        };
        for tx in pending {
            let _ = tx.send(reply.clone());
        }
    }

    /// Routes one frame received from the config service.
    ///
    /// An unparsable config body is a framing error; the caller drops the connection.
    pub fn handle_frame(&self, frame: Frame) -> Result<()> {
        let site = frame.header.trans_id;
        match Command::try_from(frame.header.command) {
            Ok(Command::ConfigHbResp) => debug!("Config service acknowledged heartbeat"),
            Ok(Command::ConfigQueryResp) => {
                let reply = parse_json::<ConfigReply>(&frame.body)?;
                self.deliver(site, reply);
            }
            Ok(Command::ConfigInfo) => {
                let reply = parse_json::<ConfigReply>(&frame.body)?;
                info!("Config change notice for site {}", site);
                self.notices.insert(notice_key(site), reply);
            }
            Ok(other) => warn!("Unexpected {:?} from config service", other),
            Err(e) => error!("Config service sent {}", e),
        }
        Ok(())
    }

    /// Keeps the connection up until shutdown, reconnecting with exponential backoff.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match TcpStream::connect(&self.settings.addr).await {
                Ok(stream) => {
                    info!("Connected to config service at {}", self.settings.addr);
                    backoff_ms = INITIAL_BACKOFF_MS;
                    if self.serve_connection(stream, &mut shutdown).await {
                        break;
                    }
                    warn!("Config service connection lost");
                }
                Err(e) => warn!("Config service {} unreachable: {}", self.settings.addr, e),
            }

            let jitter = rand::random::<u64>() % 50;
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(backoff_ms + jitter)) => {}
                _ = shutdown.changed() => break,
            }
            backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
        }

        info!("Config client stopped");
    }

    /// Drives one connection. Returns true when shutdown was requested.
    async fn serve_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let (mut reader, writer) = stream.into_split();
        *self.writer.lock().await = Some(writer);

        // The heartbeat runs in its own task so a pending read is never cancelled mid-frame.
        let mut heartbeat = tokio::spawn(Arc::clone(self).heartbeat_loop());

        let stop = loop {
            tokio::select! {
                received = read_message(&mut reader) => match received {
                    Ok(frame) => {
                        if let Err(e) = self.handle_frame(frame) {
                            warn!("Dropping config service connection: {}", e);
                            break false;
                        }
                    }
                    Err(e) => {
                        warn!("Config service receive failed: {}", e);
                        break false;
                    }
                },
                _ = &mut heartbeat => break false,
                _ = shutdown.changed() => break true,
            }
        };

        heartbeat.abort();
        *self.writer.lock().await = None;
        stop
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.settings.heartbeat_interval);
        loop {
            interval.tick().await;
            if let Err(e) = self.send_heartbeat().await {
                warn!("Config heartbeat failed: {}", e);
                return;
            }
        }
    }
}

impl ConfigLookup for ConfigClient {
    fn lookup(&self, site_id: u32) -> LookupFuture<'_> {
        Box::pin(self.query(site_id))
    }

    fn take_notice(&self, site_id: u32) -> Option<ConfigReply> {
        self.notices
            .remove(&notice_key(u64::from(site_id)))
            .map(|(_, reply)| reply)
    }

    fn peek_notice(&self, site_id: u32) -> Option<ConfigReply> {
        self.notices
            .get(&notice_key(u64::from(site_id)))
            .map(|r| r.value().clone())
    }
}
