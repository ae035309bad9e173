//! Cask node entry point: config load, logging, `Site` wiring, background
//! task spawn, and HTTP server start.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cask_cluster::{Node, Site};
use cask_core::Config;
use cask_http::{build_router, AppState};
use cask_storage::{Backend, LocalBackend};
use clap::Parser;
use tracing::{info, info_span, Instrument};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cask")]
#[command(version = cask_core::VERSION)]
#[command(about = "A peer-to-peer, content-addressed object store", long_about = None)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Bind address
    #[arg(long, env = "CASK_BIND_ADDRESS")]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, env = "CASK_PORT")]
    port: Option<u16>,

    /// Local storage root
    #[arg(long, env = "CASK_DISK_BACKEND_ROOT")]
    storage_root: Option<String>,

    /// Cluster secret shared by all peers
    #[arg(long, env = "CASK_CLUSTER_SECRET")]
    cluster_secret: Option<String>,

    /// Comma-separated seed neighbor URLs
    #[arg(long, env = "CASK_NEIGHBORS")]
    neighbors: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CASK_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    let mut config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::from_env()
    };

    if let Some(bind) = cli.bind {
        config.node.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.node.port = port;
    }
    if let Some(root) = cli.storage_root {
        config.storage.root = root.into();
    }
    if let Some(secret) = cli.cluster_secret {
        config.cluster.secret = secret;
    }
    if let Some(neighbors) = cli.neighbors {
        config.cluster.neighbors = neighbors
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    config.clamp();

    let uuid_prefix: String = config.node.uuid.chars().take(8).collect();
    let span = info_span!("node", id = %uuid_prefix);

    run(config).instrument(span).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(version = cask_core::VERSION, "starting cask node");

    std::fs::create_dir_all(&config.storage.root)?;
    let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(&config.storage.root));
    info!(backend = backend.name(), root = %config.storage.root.display(), "storage backend ready");

    let myself = Node::new(
        config.node.uuid.clone(),
        config.node.base_url.clone(),
        config.node.writeable,
    );

    let site = Site::new(
        myself,
        config.cluster.secret.clone(),
        Duration::from_secs(config.cluster.heartbeat_interval_secs),
        backend,
        config.cluster.replication,
        config.cluster.max_replication,
        Duration::from_secs(config.aae.interval_secs),
    );

    for url in &config.cluster.neighbors {
        match site.cluster.join_neighbor(url).await {
            Ok(node) => info!(peer = %node.base_url, "joined seed neighbor"),
            Err(e) => {
                tracing::warn!(url, error = %e, "failed to join seed neighbor at startup")
            }
        }
    }

    site.spawn_background_tasks();

    let addr: SocketAddr = format!("{}:{}", config.node.bind_address, config.node.port).parse()?;
    let state = AppState::new(site);
    let router = build_router(state);

    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
