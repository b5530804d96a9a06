use anyhow::Context;
use clap::Parser;
use metadata_node::config::NodeConfig;
use metadata_node::config_client::{ConfigClient, ConfigClientSettings};
use metadata_node::gateway::GatewayRegistry;
use metadata_node::handlers::{NodeContext, NodeIdentity};
use metadata_node::metrics::SystemMetrics;
use metadata_node::peer::TcpPeerTransport;
use metadata_node::server;
use metadata_node::status::StatusReporter;
use metadata_node::storage::MemoryStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "metadata-node", about = "Regional metadata server node")]
struct Args {
    /// JSON config file; command-line values override it
    #[arg(short, long, env = "META_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "META_LISTEN")]
    listen: Option<SocketAddr>,

    /// Node id in hex, e.g. 0x08000001
    #[arg(long, env = "META_NODE_ID")]
    node_id: Option<String>,

    #[arg(long, env = "META_REGION_ID")]
    region_id: Option<u32>,

    #[arg(long, env = "META_SYSTEM_ID")]
    system_id: Option<u32>,

    #[arg(long, env = "META_WORKERS")]
    workers: Option<usize>,

    /// Config service address, host:port
    #[arg(long, env = "META_CONFIG_SERVICE")]
    config_service: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NodeConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(node_id) = self.node_id {
            config.node_id = node_id;
        }
        if let Some(region_id) = self.region_id {
            config.region_id = region_id;
        }
        if let Some(system_id) = self.system_id {
            config.system_id = system_id;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(addr) = self.config_service {
            config.config_service.addr = addr;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config = args.into_config()?;

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
        .context("building runtime")?
        .block_on(run(config))
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let identity = NodeIdentity {
        node_id: config.node_id()?,
        region_id: config.region_id,
        system_id: config.system_id,
    };
    tracing::info!(
        "Starting metadata node 0x{:08x} (region {}, system {}) on {}",
        identity.node_id,
        identity.region_id,
        identity.system_id,
        config.listen_addr
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 1. Catalog and status storage:
    let store = Arc::new(MemoryStore::new());

    // 2. Gateway registry:
    let gateways = GatewayRegistry::new(config.timing.gateway_expiry());

    // 3. Host metrics:
    let metrics = Arc::new(SystemMetrics::new());

    // 4. Config service link:
    let settings = ConfigClientSettings::from_config(&config)?;
    let config_client = ConfigClient::new(settings, metrics.clone());

    // 5. Sibling transport and shared handler context:
    let peers = Arc::new(TcpPeerTransport::new(config.timing.peer_timeout()));
    let ctx = NodeContext::new(
        identity,
        gateways.clone(),
        store.clone(),
        config_client.clone(),
        peers,
    );

    // 6. Background loops:
    tokio::spawn(gateways.run_sweeper(
        store.clone(),
        config.timing.sweep_interval(),
        shutdown_rx.clone(),
    ));
    tokio::spawn(config_client.run(shutdown_rx.clone()));
    let reporter = StatusReporter::new(identity.region_id, identity.system_id, metrics, store);
    tokio::spawn(reporter.run(config.timing.status_interval(), shutdown_rx.clone()));

    // 7. Listener:
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    let server = tokio::spawn(server::serve(listener, ctx, shutdown_rx));

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);
    server.await.context("listener task")?;

    Ok(())
}
