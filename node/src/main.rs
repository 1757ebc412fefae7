// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Levy Node
//!
//! Entry point for the `levy-node` binary. Parses CLI arguments, initializes
//! logging and metrics, restores or deploys the ledger, and serves the HTTP
//! API next to a Prometheus endpoint.
//!
//! Subcommands:
//!
//! - `run`: serve the ledger
//! - `init`: create the data directory, an owner key and a config
//! - `keygen`: print a fresh secp256k1 key and its address
//! - `sign-permit`: sign an EIP-2612 permit offline
//! - `version`: print build version information

mod api;
mod cli;
mod config;
mod ledger;
mod logging;
mod metrics;
mod store;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

use levy_contracts::{PermitRequest, TokenConfig};
use levy_protocol::crypto::{Eip712Domain, LevyKeypair};
use levy_protocol::types::format_amount;
use levy_protocol::Address;

use cli::{Commands, LevyNodeCli};
use config::{NodeConfig, CONFIG_FILE, OWNER_KEY_FILE};
use ledger::NodeLedger;
use logging::LogFormat;
use metrics::NodeMetrics;
use store::{SnapshotStore, SnapshotWriter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LevyNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Keygen => {
            keygen();
            Ok(())
        }
        Commands::SignPermit(args) => sign_permit(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Restores (or deploys) the ledger and serves the API and metrics
/// endpoints until a shutdown signal arrives.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| args.data_dir.join(CONFIG_FILE));
    let config = NodeConfig::load(&config_path)
        .with_context(|| "run `levy-node init` first or pass --config")?;

    logging::init_logging(
        "levy_node=info,levy_contracts=info,tower_http=debug",
        LogFormat::from_str_lossy(&config.log_format),
    );

    let rpc_port = args.rpc_port.unwrap_or(config.rpc_port);
    let metrics_port = args.metrics_port.unwrap_or(config.metrics_port);
    tracing::info!(
        network = %config.network,
        chain_id = config.token.chain_id,
        rpc_port,
        metrics_port,
        data_dir = %args.data_dir.display(),
        "starting levy-node"
    );

    std::fs::create_dir_all(&args.data_dir).with_context(|| {
        format!("failed to create data directory: {}", args.data_dir.display())
    })?;

    // --- Ledger ---
    let store = SnapshotStore::in_dir(&args.data_dir);
    let ledger = match store.load()? {
        Some(snapshot) => NodeLedger::restore(&config, snapshot)?,
        None => {
            let ledger = NodeLedger::genesis(&config)?;
            store.save(&ledger.snapshot())?;
            tracing::info!(path = %store.path().display(), "genesis snapshot written");
            ledger
        }
    };

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics.observe_balances(
        ledger.token().total_supply(),
        ledger.token().accumulator_balance(),
    );

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: config.network.clone(),
        ledger: Arc::new(Mutex::new(ledger)),
        snapshots: SnapshotWriter::new(store),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.bind, metrics_port);
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

    tracing::info!("levy-node stopped");
    Ok(())
}

/// Creates the data directory, an owner key and a config for `network`.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("levy_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    let config_path = data_dir.join(CONFIG_FILE);
    if config_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            config_path.display()
        );
    }
    tracing::info!(data_dir = %data_dir.display(), network = %args.network, "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let keypair = LevyKeypair::generate();
    let owner = keypair.address();
    let key_path = data_dir.join(OWNER_KEY_FILE);
    write_secret(&key_path, &keypair)?;

    let config = NodeConfig::for_network(&args.network, owner)?;
    config.save(&config_path)?;

    tracing::info!(
        owner = %owner,
        key_path = %key_path.display(),
        "owner key generated"
    );

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Network        : {}", config.network);
    println!("  Chain id       : {}", config.token.chain_id);
    println!(
        "  Initial supply : {} {}",
        format_amount(config.token.initial_supply),
        config.token.symbol
    );
    println!("  Owner key      : {}", key_path.display());
    println!("  Owner address  : {}", owner);

    Ok(())
}

/// Writes a hex secret key readable by the current user only.
fn write_secret(path: &Path, keypair: &LevyKeypair) -> Result<()> {
    std::fs::write(path, hex::encode(keypair.secret_key_bytes()))
        .with_context(|| format!("failed to write key to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

fn keygen() {
    let keypair = LevyKeypair::generate();
    println!("address : {}", keypair.address());
    println!("secret  : {}", hex::encode(keypair.secret_key_bytes()));
}

/// Signs a permit and prints the JSON body `POST /permit` accepts.
fn sign_permit(args: cli::SignPermitArgs) -> Result<()> {
    let keypair = LevyKeypair::from_hex(&args.key).context("invalid signer key")?;
    let spender: Address = args
        .spender
        .parse()
        .with_context(|| format!("invalid spender address: {}", args.spender))?;
    let token = match &args.config {
        Some(path) => NodeConfig::load(path)?.token,
        None => TokenConfig::devnet(keypair.address()),
    };
    let domain = permit_domain(&token, args.chain_id);

    let request = PermitRequest::sign(
        &keypair,
        &domain,
        spender,
        args.value,
        args.nonce,
        args.deadline,
    )
    .context("failed to sign permit")?;

    eprintln!(
        "domain separator 0x{} (chain {})",
        hex::encode(domain.separator()),
        domain.chain_id
    );
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}

fn permit_domain(token: &TokenConfig, chain_id: Option<u64>) -> Eip712Domain {
    Eip712Domain {
        name: token.name.clone(),
        version: token.version.clone(),
        chain_id: chain_id.unwrap_or(token.chain_id),
        verifying_contract: token.ledger_account,
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("levy-node {}", env!("CARGO_PKG_VERSION"));
    println!("permit    EIP-2612 v{}", levy_protocol::config::PERMIT_VERSION);
    println!("rustc     {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use levy_contracts::LevyToken;
    use levy_contracts::RewardPool;

    #[test]
    fn offline_domain_matches_the_ledger() {
        let owner = Address::from_tag(0x01);
        let config = NodeConfig::for_network("devnet", owner).unwrap();
        let token = LevyToken::new(
            &config.token,
            Box::new(RewardPool::new(config.token.staking_sink)),
            None,
        )
        .unwrap();

        let chain = config.token.chain_id;
        assert_eq!(
            permit_domain(&config.token, None).separator(),
            token.domain_separator(chain)
        );
        assert_eq!(
            permit_domain(&config.token, Some(5)).separator(),
            token.domain_separator(5)
        );
    }

    #[test]
    fn secret_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(OWNER_KEY_FILE);
        let keypair = LevyKeypair::generate();
        write_secret(&path, &keypair).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let restored = LevyKeypair::from_hex(&raw).unwrap();
        assert_eq!(restored.address(), keypair.address());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
