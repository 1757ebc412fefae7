//! Core type definitions shared by every Levy crate.
//!
//! Accounts are 20-byte identities derived from secp256k1 public keys, the
//! same shape wallets and off-band signing tools already understand. Amounts
//! are plain `u128` base units with 18 implied decimals.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::DEAD_ADDRESS_BYTES;

/// Token amount in base units (10^-18 of a whole token).
///
/// `u128` holds ~3.4 × 10^20 whole tokens, comfortably above any supply we
/// would ever mint. Every arithmetic path is checked anyway.
pub type Amount = u128;

/// Network identity bound into every permit signature.
pub type ChainId = u64;

/// Length of an account identity in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Errors parsing an [`Address`] from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid hex in address: {0}")]
    InvalidHex(String),

    #[error("invalid address length: expected 20 bytes, got {0}")]
    InvalidLength(usize),
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account identity.
///
/// Displayed and serialized as lowercase `0x`-prefixed hex. Serializing as a
/// string (rather than a byte array) lets addresses be JSON map keys, which
/// is how the ledger snapshot stores balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The null identity. Never a valid owner, spender or recipient.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// The unrecoverable sink `0x…dEaD`.
    pub const DEAD: Address = Address(DEAD_ADDRESS_BYTES);

    /// Wraps raw bytes.
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Builds an address whose last byte is `tag` and every other byte zero
    /// except the first, which is set so the result is never [`Address::ZERO`].
    /// Handy for fixtures and for deriving system accounts in configs.
    pub const fn from_tag(tag: u8) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes[0] = 0x1e;
        bytes[ADDRESS_LENGTH - 1] = tag;
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Returns `true` for the null identity.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// ABI encoding: the 20 bytes left-padded to a 32-byte word.
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }

    /// Lowercase hex with `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses hex with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        let array: [u8; ADDRESS_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// ABI words
// ---------------------------------------------------------------------------

/// ABI encoding of an unsigned integer: big-endian, left-padded to 32 bytes.
pub fn u128_to_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Same as [`u128_to_word`] for `u64` values (nonces, deadlines, chain ids).
pub fn u64_to_word(value: u64) -> [u8; 32] {
    u128_to_word(u128::from(value))
}

/// Renders a base-unit amount as a decimal string with 18 fractional
/// digits, trailing zeros trimmed. `1_500_000_000_000_000_000` → `"1.5"`.
pub fn format_amount(amount: Amount) -> String {
    let one = crate::config::ONE_TOKEN;
    let whole = amount / one;
    let frac = amount % one;
    if frac == 0 {
        return whole.to_string();
    }
    let frac_str = format!("{:018}", frac);
    format!("{}.{}", whole, frac_str.trim_end_matches('0'))
}
