//! shroud daemon: entry point for running a shroud node.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use shroud_ledger::load_genesis;
use shroud_network::{ApiFetcher, UdpTransport};
use shroud_node::{
    init_logging, load_or_create_api_token, load_wallet, LogFormat, NodeConfig, NodeMetrics,
    NodeRuntime, ShroudNode, ShutdownController,
};
use shroud_rpc::{ApiState, RpcServer};
use shroud_types::{Clock, SystemClock};

#[derive(Parser)]
#[command(name = "shroud-daemon", about = "shroud node daemon")]
struct Cli {
    /// Path to a TOML configuration file. Flags and env vars override it.
    #[arg(long, env = "SHROUD_CONFIG")]
    config: Option<PathBuf>,

    /// UDP address other peers reach this node on.
    #[arg(long, env = "SHROUD_ADDRESS")]
    address: Option<String>,

    /// Local socket address the UDP transport binds.
    #[arg(long, env = "SHROUD_UDP_BIND")]
    udp_bind: Option<String>,

    /// HTTP address other peers reach the API on.
    #[arg(long, env = "SHROUD_HTTP")]
    http: Option<String>,

    /// Local socket address the HTTP API binds.
    #[arg(long, env = "SHROUD_HTTP_BIND")]
    http_bind: Option<String>,

    /// HTTP address of a peer to bootstrap and join through.
    #[arg(long, env = "SHROUD_BOOTSTRAP")]
    bootstrap: Option<String>,

    /// SOCKS5 proxy for outbound HTTP, e.g. "127.0.0.1:9050".
    #[arg(long, env = "SHROUD_SOCKS_PROXY")]
    socks_proxy: Option<String>,

    #[arg(long, env = "SHROUD_GENESIS")]
    genesis: Option<PathBuf>,

    /// Directory holding the node key.
    #[arg(long, env = "SHROUD_KEYS")]
    keys: Option<PathBuf>,

    #[arg(long, env = "SHROUD_API_TOKEN_FILE")]
    api_token_file: Option<PathBuf>,

    /// "human" or "json".
    #[arg(long, env = "SHROUD_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level or filter directive, e.g. "info" or "shroud_network=debug".
    #[arg(long, env = "SHROUD_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node operations.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node.
    Run,
}

impl Cli {
    /// The file config (or defaults) with every given flag applied on top.
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_toml_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => NodeConfig::default(),
        };
        if let Some(v) = &self.address {
            config.address = v.clone();
        }
        if let Some(v) = &self.udp_bind {
            config.udp_bind = v.clone();
        }
        if let Some(v) = &self.http {
            config.http = v.clone();
        }
        if let Some(v) = &self.http_bind {
            config.http_bind = v.clone();
        }
        if self.bootstrap.is_some() {
            config.bootstrap = self.bootstrap.clone();
        }
        if self.socks_proxy.is_some() {
            config.socks_proxy = self.socks_proxy.clone();
        }
        if let Some(v) = &self.genesis {
            config.path_genesis = v.clone();
        }
        if let Some(v) = &self.keys {
            config.path_keys = v.clone();
        }
        if let Some(v) = &self.api_token_file {
            config.path_api_token = v.clone();
        }
        if let Some(v) = &self.log_format {
            config.log_format = v.clone();
        }
        if let Some(v) = &self.log_level {
            config.log_level = v.clone();
        }
        Ok(config.normalized())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.node_config()?;
    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level)?;

    match cli.command {
        Command::Node {
            action: NodeAction::Run,
        } => run(config).await?,
    }
    Ok(())
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let wallet = load_wallet(&config.key_file())
        .with_context(|| format!("loading key {}", config.key_file().display()))?;
    let api_token = load_or_create_api_token(&config.path_api_token)?;
    let genesis = load_genesis(&config.path_genesis)
        .with_context(|| format!("loading genesis {}", config.path_genesis.display()))?;
    let metrics = Arc::new(NodeMetrics::new()?);
    let clock = Arc::new(SystemClock);

    let transport = Arc::new(UdpTransport::bind(&config.udp_bind).await?);
    let fetcher = ApiFetcher::new(
        Duration::from_millis(config.network_fetch_timeout_ms),
        config.socks_proxy.as_deref(),
        config.http.clone(),
    )?;
    let shutdown = ShutdownController::new();
    let http_bind = config.http_bind.clone();

    tracing::info!(
        address = %config.address,
        http = %config.http,
        bootstrap = config.bootstrap.as_deref().unwrap_or("none"),
        "starting shroud node"
    );
    let node = ShroudNode::new(
        config,
        Box::new(wallet),
        genesis,
        Arc::clone(&metrics),
        clock.now_ms(),
    )?;
    let (runtime, handle) =
        NodeRuntime::new(node, transport, clock, fetcher, shutdown.clone());
    let server = RpcServer::new(http_bind, ApiState::new(handle, api_token, metrics));

    let mut node_task = tokio::spawn(runtime.run());
    let mut rpc_task = tokio::spawn(server.serve(shutdown.subscribe()));

    tokio::select! {
        _ = shutdown.wait_for_signal() => {
            tracing::info!("shutdown signal received, stopping node");
        }
        result = &mut node_task => {
            shutdown.shutdown();
            result.context("node runtime panicked")??;
        }
        result = &mut rpc_task => {
            shutdown.shutdown();
            result.context("API server panicked")??;
        }
    }

    if !node_task.is_finished() {
        node_task.await.context("node runtime panicked")??;
    }
    if !rpc_task.is_finished() {
        rpc_task.await.context("API server panicked")??;
    }
    tracing::info!("shroud daemon exited cleanly");
    Ok(())
}
