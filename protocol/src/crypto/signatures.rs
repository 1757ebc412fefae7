//! # Recoverable Signatures
//!
//! secp256k1 ECDSA with public-key recovery, in the `(v, r, s)` shape that
//! wallets produce. Verification never takes a public key as input: the
//! signer is *recovered* from the digest and the caller compares the result
//! against the identity it expected. A signature on its own proves nothing.
//!
//! ## Strictness
//!
//! - `v` must be 27/28 (or the raw recovery ids 0/1).
//! - `s` must be in the lower half of the curve order. The high-`s` twin of
//!   every valid signature is rejected so a signature has exactly one
//!   accepted encoding.
//! - `r` and `s` must be non-zero scalars below the curve order.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use super::keys::address_from_verifying_key;
use crate::types::Address;

/// Errors during signature operations.
///
/// Recovery failures carry no detail about which check failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    #[error("non-canonical signature: s is in the upper half of the curve order")]
    HighS,

    #[error("malformed signature scalars")]
    Malformed,

    #[error("signer recovery failed")]
    RecoveryFailed,

    #[error("signing failed")]
    SigningFailed,

    #[error("invalid signature encoding: expected 65 bytes")]
    InvalidLength,
}

/// A recoverable ECDSA signature split into its wire components.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    /// Recovery byte: 27 or 28 (0 or 1 accepted on input).
    pub v: u8,
    /// The `r` scalar, big-endian.
    pub r: [u8; 32],
    /// The `s` scalar, big-endian.
    pub s: [u8; 32],
}

impl RecoverableSignature {
    /// 65-byte encoding `r || s || v`, the layout `eth_signTypedData` returns.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    /// Parses the 65-byte `r || s || v` layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != 65 {
            return Err(SignatureError::InvalidLength);
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { v: bytes[64], r, s })
    }

    /// `0x`-prefixed hex of [`to_bytes`](Self::to_bytes).
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Parses `0x`-prefixed (or bare) hex of the 65-byte layout.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|_| SignatureError::InvalidLength)?;
        Self::from_bytes(&bytes)
    }

    fn recovery_id(&self) -> Result<RecoveryId, SignatureError> {
        let raw = match self.v {
            27 | 28 => self.v - 27,
            0 | 1 => self.v,
            other => return Err(SignatureError::InvalidRecoveryId(other)),
        };
        RecoveryId::from_byte(raw).ok_or(SignatureError::InvalidRecoveryId(self.v))
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature({})", self.to_hex())
    }
}

impl Serialize for RecoverableSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RecoverableSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RecoverableSignature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Recover the identity that signed `digest`.
///
/// The caller MUST compare the result with the identity it expected; a
/// successful recovery only means the signature is well-formed.
pub fn recover_address(
    digest: &[u8; 32],
    signature: &RecoverableSignature,
) -> Result<Address, SignatureError> {
    let recovery_id = signature.recovery_id()?;

    let parsed = Signature::from_scalars(signature.r, signature.s)
        .map_err(|_| SignatureError::Malformed)?;

    // `normalize_s` returns Some only when s was in the upper half.
    if parsed.normalize_s().is_some() {
        return Err(SignatureError::HighS);
    }

    let key = VerifyingKey::recover_from_prehash(digest, &parsed, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    Ok(address_from_verifying_key(&key))
}
