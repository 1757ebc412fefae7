//! Genesis parameters of one token deployment.
//!
//! Everything here is fixed at construction except the liquidity threshold,
//! which the owner can move later. The node writes a `TokenConfig` into its
//! config file on `init` and reads it back on `run`.

use levy_protocol::config::{
    CHAIN_ID_DEVNET, DEFAULT_LIQUIDITY_THRESHOLD, INITIAL_SUPPLY, PERMIT_VERSION, TOKEN_NAME,
    TOKEN_SYMBOL,
};
use levy_protocol::{Address, Amount, ChainId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fees::{FeeError, FeeSchedule};

/// A deployment that cannot be brought up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must not be the zero address")]
    ZeroAddress(&'static str),

    #[error("ledger, staking and issuance accounts must be distinct")]
    SystemAccountCollision,

    #[error("initial holder must not be a system account")]
    HolderIsSystemAccount,

    #[error(transparent)]
    Fees(#[from] FeeError),

    #[error("staking sink {attached} does not match configured {configured}")]
    StakingSinkMismatch {
        attached: Address,
        configured: Address,
    },

    #[error("balances do not sum to total supply")]
    InconsistentLedger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Token name; also the EIP-712 domain name.
    pub name: String,
    pub symbol: String,
    /// EIP-712 domain version.
    pub version: String,
    /// Chain id the domain separator is first cached for.
    pub chain_id: ChainId,
    /// The ledger's own account (holds the liquidity accumulator).
    pub ledger_account: Address,
    /// May change the threshold, the automation switch and exclusions.
    pub owner: Address,
    pub staking_sink: Address,
    pub issuance_sink: Address,
    /// Identity the exchange uses to pull tokens.
    pub router: Address,
    /// The pool the automator contributes to. Transfers *from* it skip
    /// automation; it is also fee-excluded.
    pub liquidity_pool: Option<Address>,
    /// Receives the genesis mint.
    pub initial_holder: Address,
    pub initial_supply: Amount,
    pub liquidity_threshold: Amount,
    pub fees: FeeSchedule,
}

impl TokenConfig {
    /// A devnet deployment where `owner` holds the whole genesis supply and
    /// system accounts use fixed tagged addresses.
    pub fn devnet(owner: Address) -> Self {
        Self {
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            version: PERMIT_VERSION.to_string(),
            chain_id: CHAIN_ID_DEVNET,
            ledger_account: Address::from_tag(0xc0),
            owner,
            staking_sink: Address::from_tag(0x5a),
            issuance_sink: Address::from_tag(0x15),
            router: Address::from_tag(0x70),
            liquidity_pool: Some(Address::from_tag(0x9a)),
            initial_holder: owner,
            initial_supply: INITIAL_SUPPLY,
            liquidity_threshold: DEFAULT_LIQUIDITY_THRESHOLD,
            fees: FeeSchedule::default(),
        }
    }

    /// Structural checks. Reports the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("ledger_account", self.ledger_account),
            ("owner", self.owner),
            ("staking_sink", self.staking_sink),
            ("issuance_sink", self.issuance_sink),
            ("router", self.router),
            ("initial_holder", self.initial_holder),
        ];
        if let Some((name, _)) = required.iter().find(|(_, addr)| addr.is_zero()) {
            return Err(ConfigError::ZeroAddress(*name));
        }

        let system = [self.ledger_account, self.staking_sink, self.issuance_sink];
        if system[0] == system[1] || system[0] == system[2] || system[1] == system[2] {
            return Err(ConfigError::SystemAccountCollision);
        }
        if system.contains(&self.initial_holder) {
            return Err(ConfigError::HolderIsSystemAccount);
        }
        if self.liquidity_pool.map_or(false, |p| p.is_zero()) {
            return Err(ConfigError::ZeroAddress("liquidity_pool"));
        }

        Ok(self.fees.validate()?)
    }

    /// Accounts that start out fee-excluded.
    pub fn genesis_exclusions(&self) -> Vec<Address> {
        let mut accounts = vec![
            self.ledger_account,
            self.owner,
            self.staking_sink,
            self.issuance_sink,
        ];
        accounts.extend(self.liquidity_pool);
        accounts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devnet_config_is_valid() {
        assert!(TokenConfig::devnet(Address::from_tag(0x01)).validate().is_ok());
    }

    #[test]
    fn zero_owner_rejected() {
        let cfg = TokenConfig::devnet(Address::ZERO);
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroAddress("owner")));
    }

    #[test]
    fn colliding_system_accounts_rejected() {
        let mut cfg = TokenConfig::devnet(Address::from_tag(0x01));
        cfg.staking_sink = cfg.ledger_account;
        assert_eq!(cfg.validate(), Err(ConfigError::SystemAccountCollision));
    }

    #[test]
    fn holder_cannot_be_a_sink() {
        let mut cfg = TokenConfig::devnet(Address::from_tag(0x01));
        cfg.initial_holder = cfg.issuance_sink;
        assert_eq!(cfg.validate(), Err(ConfigError::HolderIsSystemAccount));
    }

    #[test]
    fn bad_fee_schedule_rejected() {
        let mut cfg = TokenConfig::devnet(Address::from_tag(0x01));
        cfg.fees.tax_per_mille = 1_000;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Fees(FeeError::RatesTooHigh { .. }))
        ));
    }

    #[test]
    fn genesis_exclusions_include_pool() {
        let cfg = TokenConfig::devnet(Address::from_tag(0x01));
        let ex = cfg.genesis_exclusions();
        assert!(ex.contains(&cfg.ledger_account));
        assert!(ex.contains(&cfg.owner));
        assert!(ex.contains(&Address::from_tag(0x9a)));
    }
}
