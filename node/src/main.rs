//! # Lucky Shop Node
//!
//! Entry point for the `lucky-node` binary. Parses CLI arguments, loads the
//! configuration, initializes logging and metrics, restores or deploys the
//! shop, and serves the HTTP/WS API.
//!
//! Subcommands:
//!
//! - `run`     start the node
//! - `init`    initialize a data directory and generate the administrator key
//! - `keygen`  print a fresh keypair
//! - `status`  query a running node's status endpoint
//! - `version` print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;
mod service;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;

use lucky_contracts::TokenLedger;
use lucky_protocol::crypto::ShopKeypair;
use lucky_protocol::storage::ChainStore;
use lucky_protocol::{Address, SystemClock};

use cli::{Commands, LuckyNodeCli};
use config::NodeConfig;
use logging::LogFormat;
use metrics::ShopMetrics;
use service::ShopService;

/// Administrator key file inside the data directory.
const ADMIN_KEY_FILE: &str = "admin.key";
/// Deployment manifest written on every start.
const DEPLOYMENT_FILE: &str = "deployment.json";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LuckyNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Keygen => {
            keygen();
            Ok(())
        }
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Addresses of the running deployment, written to `deployment.json`.
#[derive(Debug, Serialize)]
struct DeploymentManifest {
    network: String,
    shop: Address,
    token: Address,
    administrator: Address,
    last_block_timestamp: u64,
    block_height: u64,
}

/// Starts the node: restores or deploys the shop, then serves the API and
/// metrics endpoints until a shutdown signal arrives.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config = NodeConfig::resolve(&args)?;
    logging::init_logging(&config.node.log_level, config.log_format())?;

    let data_dir = config.node.data_dir.clone();
    tracing::info!(
        rpc_port = config.node.rpc_port,
        metrics_port = config.node.metrics_port,
        network = %config.node.network,
        data_dir = %data_dir.display(),
        "starting lucky-node"
    );

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let admin = load_admin_key(args.admin_key.as_deref(), &data_dir)?;
    let administrator = Address::from_public_key(&admin.public_key());

    // --- Persistent storage ---
    let db_path = data_dir.join("db");
    let store = ChainStore::open(&db_path)
        .with_context(|| format!("failed to open chain store at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "chain store opened");

    // --- Metrics ---
    let shop_metrics = Arc::new(ShopMetrics::new().context("failed to register metrics")?);

    // --- Shop ---
    let service = Arc::new(ShopService::open(
        store,
        Arc::new(SystemClock),
        administrator,
        config.shop.initial_supply,
        Arc::clone(&shop_metrics),
        config.faucet_limit(),
    )?);
    write_manifest(&data_dir, &config.node.network, &service)?;

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            lucky_protocol::config::PROTOCOL_VERSION,
        ),
        network: config.node.network.clone(),
        service,
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", config.node.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(shop_metrics);
    let metrics_addr = format!("0.0.0.0:{}", config.node.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("lucky-node stopped");
    Ok(())
}

/// Loads the administrator key from `--admin-key`, falling back to
/// `admin.key` in the data directory.
fn load_admin_key(flag: Option<&str>, data_dir: &Path) -> Result<ShopKeypair> {
    if let Some(hex_key) = flag {
        tracing::warn!("administrator key passed on the command line");
        return ShopKeypair::from_hex(hex_key.trim()).context("invalid --admin-key");
    }
    let key_path = data_dir.join(ADMIN_KEY_FILE);
    if !key_path.exists() {
        bail!(
            "no administrator key at {}; run `lucky-node init --data-dir {}` first",
            key_path.display(),
            data_dir.display()
        );
    }
    let contents = std::fs::read_to_string(&key_path)
        .with_context(|| format!("failed to read {}", key_path.display()))?;
    ShopKeypair::from_hex(contents.trim())
        .with_context(|| format!("invalid administrator key in {}", key_path.display()))
}

fn write_manifest(data_dir: &Path, network: &str, service: &ShopService) -> Result<()> {
    let manifest = service.read(|chain| DeploymentManifest {
        network: network.to_string(),
        shop: chain.shop().address(),
        token: chain.shop().token().address(),
        administrator: chain.shop().administrator(),
        last_block_timestamp: chain.last_timestamp(),
        block_height: chain.height(),
    });
    let path = data_dir.join(DEPLOYMENT_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(
        shop = %manifest.shop,
        token = %manifest.token,
        path = %path.display(),
        "deployment manifest written"
    );
    Ok(())
}

/// Initializes a data directory: default config plus a fresh administrator key.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("lucky_node=info", LogFormat::Pretty)?;

    let data_dir: PathBuf = config::expand_home(&args.data_dir);
    tracing::info!(data_dir = %data_dir.display(), network = %args.network, "initializing node");

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = data_dir.join(ADMIN_KEY_FILE);
    if key_path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to replace the administrator key",
            key_path.display()
        );
    }

    let mut node_config = NodeConfig::default();
    node_config.node.data_dir = data_dir.clone();
    node_config.node.network = args.network.clone();
    node_config.shop.faucet_enabled = args.network != "mainnet";
    node_config.validate()?;

    let config_path = data_dir.join(config::CONFIG_FILE_NAME);
    std::fs::write(&config_path, node_config.to_toml()?)
        .with_context(|| format!("failed to write config to {}", config_path.display()))?;

    let keypair = ShopKeypair::generate();
    std::fs::write(&key_path, keypair.secret_key_hex())
        .with_context(|| format!("failed to write administrator key to {}", key_path.display()))?;

    // Restrict permissions on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    let administrator = Address::from_public_key(&keypair.public_key());
    tracing::info!(%administrator, key_path = %key_path.display(), "administrator key generated");

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Network        : {}", args.network);
    println!("  Config         : {}", config_path.display());
    println!("  Admin key      : {}", key_path.display());
    println!("  Administrator  : {}", administrator);

    Ok(())
}

fn keygen() {
    let keypair = ShopKeypair::generate();
    println!("secret_key : {}", keypair.secret_key_hex());
    println!("public_key : {}", keypair.public_key().to_hex());
    println!("address    : {}", Address::from_public_key(&keypair.public_key()));
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.rpc_url.trim_end_matches('/'));
    let body = http_get(&url).await?;
    println!("{}", body);
    Ok(())
}

/// Plain HTTP/1.1 GET over a tokio TCP stream. Only `http://` URLs.
async fn http_get(url: &str) -> Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| anyhow::anyhow!("only http:// URLs are supported: {}", url))?;
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => (h, p.parse::<u16>().context("bad port")?),
        None => (authority, 80),
    };

    let addr = format!("{}:{}", host, port);
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, host,
    );
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    // Everything after the first blank line is the body.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());

    Ok(body)
}

/// Prints version information to stdout.
fn print_version() {
    println!("lucky-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", lucky_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// If a handler cannot be installed the corresponding branch never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
