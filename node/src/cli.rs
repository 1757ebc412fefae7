//! # CLI Interface
//!
//! Defines the command-line argument structure for `levy-node` using
//! `clap` derive. Subcommands: `run`, `init`, `keygen`, `sign-permit` and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Levy devnet node.
///
/// Hosts one Levy token deployment in memory, serves it over HTTP,
/// exposes Prometheus metrics, and signs EIP-2612 permits offline.
#[derive(Parser, Debug)]
#[command(
    name = "levy-node",
    about = "Levy token devnet node",
    version,
    propagate_version = true
)]
pub struct LevyNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Initialize a data directory: owner key plus config.
    Init(InitArgs),
    /// Generate a secp256k1 key and print it with its address.
    Keygen,
    /// Sign an EIP-2612 permit and print the request as JSON.
    SignPermit(SignPermitArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (JSON).
    ///
    /// When omitted, the node looks for `config.json` in the data directory.
    #[arg(long, short = 'c', env = "LEVY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory holding the config, the owner key and the ledger
    /// snapshot.
    #[arg(long, short = 'd', env = "LEVY_DATA_DIR", default_value = ".levy")]
    pub data_dir: PathBuf,

    /// Overrides the config's API port.
    #[arg(long, env = "LEVY_RPC_PORT")]
    pub rpc_port: Option<u16>,

    /// Overrides the config's metrics port.
    #[arg(long, env = "LEVY_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Address to bind both listeners to.
    #[arg(long, env = "LEVY_BIND", default_value = "0.0.0.0")]
    pub bind: String,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    #[arg(long, short = 'd', env = "LEVY_DATA_DIR", default_value = ".levy")]
    pub data_dir: PathBuf,

    /// Network to configure for: mainnet, testnet, devnet, or a numeric
    /// chain id.
    #[arg(long, default_value = "devnet")]
    pub network: String,

    /// Overwrite an existing config and key.
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct SignPermitArgs {
    /// Hex-encoded secp256k1 secret key of the owner.
    #[arg(long, env = "LEVY_SIGNER_KEY")]
    pub key: String,

    /// Account allowed to spend.
    #[arg(long)]
    pub spender: String,

    /// Allowance to grant, in base units.
    #[arg(long)]
    pub value: u128,

    /// The owner's current permit nonce.
    #[arg(long, default_value_t = 0)]
    pub nonce: u64,

    /// Unix seconds after which the permit is void.
    #[arg(long)]
    pub deadline: u64,

    /// Chain id to sign for. Defaults to the config's chain id.
    #[arg(long)]
    pub chain_id: Option<u64>,

    /// Config to read the domain (name, version, ledger account) from.
    /// Without one the devnet defaults are used.
    #[arg(long, short = 'c', env = "LEVY_CONFIG")]
    pub config: Option<PathBuf>,
}
