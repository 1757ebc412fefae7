//! # Node Configuration
//!
//! `levy-node init` writes a [`NodeConfig`] as pretty JSON into the data
//! directory; `levy-node run` reads it back. The token's genesis parameters
//! are embedded verbatim so a restarted node can rebuild the exact same
//! deployment when no snapshot exists yet.

use std::path::Path;

use anyhow::{Context, Result};
use levy_contracts::TokenConfig;
use levy_protocol::config::{
    chain_id_for_network, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT, ONE_TOKEN,
};
use levy_protocol::{Address, Amount, ChainId};
use serde::{Deserialize, Serialize};

/// File name of the config inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// File name of the owner key written by `init`.
pub const OWNER_KEY_FILE: &str = "owner.key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network name, for display.
    pub network: String,
    pub rpc_port: u16,
    pub metrics_port: u16,
    /// `pretty` or `json`.
    pub log_format: String,
    pub token: TokenConfig,
    /// Tokens the owner puts into the devnet pool at genesis.
    pub pool_seed_tokens: Amount,
    /// Counterpart units the devnet pool starts with.
    pub pool_seed_counterpart: Amount,
}

impl NodeConfig {
    /// Defaults for `network` with `owner` holding the genesis supply.
    pub fn for_network(network: &str, owner: Address) -> Result<Self> {
        let chain_id: ChainId = chain_id_for_network(network)
            .with_context(|| format!("unknown network: {network}"))?;
        let mut token = TokenConfig::devnet(owner);
        token.chain_id = chain_id;

        Ok(Self {
            network: network.to_lowercase(),
            rpc_port: DEFAULT_RPC_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: "pretty".into(),
            token,
            pool_seed_tokens: 10_000_000 * ONE_TOKEN,
            pool_seed_counterpart: 10_000 * ONE_TOKEN,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("failed to encode config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.token.validate().context("invalid token config")?;
        if self.pool_seed_tokens > self.token.initial_supply {
            anyhow::bail!("pool seed exceeds the initial supply");
        }
        Ok(())
    }
}
