//! # Protocol Configuration & Constants
//!
//! Every magic number in Levy lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong.
//!
//! Fee rates and the EIP-712 strings are part of the deployed token's
//! identity: signatures produced by wallets commit to the name and version,
//! and holders price the fee schedule in. Changing any of them after launch
//! is a redeployment, not a patch.

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Mainnet chain id.
pub const CHAIN_ID_MAINNET: u64 = 0x4C45_5659; // "LEVY"

/// Testnet chain id.
pub const CHAIN_ID_TESTNET: u64 = 0x4C45_5654; // "LEVT"

/// Devnet chain id. Reset whenever we feel like it.
pub const CHAIN_ID_DEVNET: u64 = 0x4C45_5644; // "LEVD"

// ---------------------------------------------------------------------------
// Token Metadata
// ---------------------------------------------------------------------------

/// Human-readable token name. Also the EIP-712 domain `name`.
pub const TOKEN_NAME: &str = "Levy";

/// Ticker symbol.
pub const TOKEN_SYMBOL: &str = "LEVY";

/// Decimal places. Every amount in the ledger is an integer count of
/// 10^-18 units; the protocol never divides for display.
pub const TOKEN_DECIMALS: u8 = 18;

/// One whole token in base units.
pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

/// EIP-712 domain `version`. Bump only together with a redeployment.
pub const PERMIT_VERSION: &str = "1";

/// Genesis supply: one billion tokens.
pub const INITIAL_SUPPLY: u128 = 1_000_000_000 * ONE_TOKEN;

// ---------------------------------------------------------------------------
// Fee Parameters
// ---------------------------------------------------------------------------

/// Denominator for every fee rate. Rates are expressed per mille.
pub const FEE_DENOMINATOR: u128 = 1_000;

/// Share of every taxed transfer redirected to the staking reward pool (2%).
pub const TAX_RATE_PER_MILLE: u16 = 20;

/// Share accumulated for automated liquidity provisioning (2%).
pub const LIQUIDITY_RATE_PER_MILLE: u16 = 20;

/// Share burned outright (1%).
pub const DEFLATION_RATE_PER_MILLE: u16 = 10;

/// Default ledger-owned balance that triggers liquidity automation:
/// 500k tokens, i.e. 0.05% of genesis supply.
pub const DEFAULT_LIQUIDITY_THRESHOLD: u128 = 500_000 * ONE_TOKEN;

// ---------------------------------------------------------------------------
// Well-known Addresses
// ---------------------------------------------------------------------------

/// The unrecoverable sink that receives LP receipts. Nobody holds the key
/// to `0x…dEaD`, which is the whole point.
pub const DEAD_ADDRESS_BYTES: [u8; 20] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0xde, 0xad,
];

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_RPC_PORT: u16 = 9851;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9852;

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Returns a friendly name for a chain id, mainly for logging.
/// Unknown chains get a hex dump.
pub fn network_name(chain_id: u64) -> String {
    match chain_id {
        CHAIN_ID_MAINNET => "mainnet".to_string(),
        CHAIN_ID_TESTNET => "testnet".to_string(),
        CHAIN_ID_DEVNET => "devnet".to_string(),
        other => format!("unknown(0x{:08X})", other),
    }
}

/// Parses a network name into its chain id. Accepts the names produced by
/// [`network_name`] (case-insensitive) or a decimal chain id.
pub fn chain_id_for_network(name: &str) -> Option<u64> {
    match name.to_lowercase().as_str() {
        "mainnet" => Some(CHAIN_ID_MAINNET),
        "testnet" => Some(CHAIN_ID_TESTNET),
        "devnet" => Some(CHAIN_ID_DEVNET),
        other => other.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_ids_are_distinct() {
        assert_ne!(CHAIN_ID_MAINNET, CHAIN_ID_TESTNET);
        assert_ne!(CHAIN_ID_MAINNET, CHAIN_ID_DEVNET);
        assert_ne!(CHAIN_ID_TESTNET, CHAIN_ID_DEVNET);
    }

    #[test]
    fn test_fee_rates_leave_a_net_amount() {
        let total = TAX_RATE_PER_MILLE + LIQUIDITY_RATE_PER_MILLE + DEFLATION_RATE_PER_MILLE;
        assert!(u128::from(total) < FEE_DENOMINATOR);
    }

    #[test]
    fn test_one_token_matches_decimals() {
        assert_eq!(ONE_TOKEN, 10u128.pow(TOKEN_DECIMALS as u32));
    }

    #[test]
    fn test_dead_address_suffix() {
        assert_eq!(&DEAD_ADDRESS_BYTES[18..], &[0xde, 0xad]);
        assert!(DEAD_ADDRESS_BYTES[..18].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_network_name_formatting() {
        assert_eq!(network_name(CHAIN_ID_MAINNET), "mainnet");
        assert_eq!(network_name(0xCAFEBABE), "unknown(0xCAFEBABE)");
    }

    #[test]
    fn test_chain_id_for_network() {
        assert_eq!(chain_id_for_network("DevNet"), Some(CHAIN_ID_DEVNET));
        assert_eq!(chain_id_for_network("31337"), Some(31337));
        assert_eq!(chain_id_for_network("moonbase"), None);
    }
}
