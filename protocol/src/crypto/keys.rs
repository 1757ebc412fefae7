//! # Key Management
//!
//! secp256k1 keypair generation and address derivation.
//!
//! Levy accounts are the last 20 bytes of `keccak256(x || y)` of the
//! uncompressed public key. That is the derivation every wallet already
//! implements, which is what makes off-band permit signing work without
//! bespoke tooling.
//!
//! Key bytes are never logged. `Debug` prints the address only.

use k256::ecdsa::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use super::hash::keccak256;
use super::signatures::{RecoverableSignature, SignatureError};
use crate::types::Address;

/// Errors that can occur during key operations.
///
/// Intentionally vague about *why* something failed.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,
}

/// A Levy identity keypair.
///
/// Intentionally does NOT implement `Serialize`. Exporting a secret key
/// should be a deliberate call to [`secret_key_bytes`](Self::secret_key_bytes).
///
/// # Examples
///
/// ```
/// use levy_protocol::crypto::{recover_address, LevyKeypair};
///
/// let kp = LevyKeypair::generate();
/// let digest = [7u8; 32];
/// let sig = kp.sign_prehash(&digest).unwrap();
/// assert_eq!(recover_address(&digest, &sig).unwrap(), kp.address());
/// ```
#[derive(Clone)]
pub struct LevyKeypair {
    signing_key: SigningKey,
}

impl LevyKeypair {
    /// Generate a fresh keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Reconstruct a keypair from a raw 32-byte secret scalar.
    ///
    /// Fails for zero or for scalars at or above the curve order.
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, KeyError> {
        let signing_key =
            SigningKey::from_bytes(secret.into()).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// Reconstruct a keypair from a hex-encoded secret, `0x` prefix optional.
    ///
    /// For devnet configs and the `sign-permit` CLI. Please don't keep raw
    /// hex keys around in production.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let trimmed = hex_str.trim().strip_prefix("0x").unwrap_or(hex_str.trim());
        let bytes = hex::decode(trimmed).map_err(|_| KeyError::InvalidSecretKey)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Self::from_bytes(&arr)
    }

    /// The account identity controlled by this keypair.
    pub fn address(&self) -> Address {
        address_from_verifying_key(self.signing_key.verifying_key())
    }

    /// Sign a 32-byte digest, producing a low-`s` recoverable signature with
    /// `v ∈ {27, 28}`.
    pub fn sign_prehash(&self, digest: &[u8; 32]) -> Result<RecoverableSignature, SignatureError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|_| SignatureError::SigningFailed)?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        Ok(RecoverableSignature {
            v: 27 + recovery_id.to_byte(),
            r,
            s,
        })
    }

    /// Exports the raw 32-byte secret key. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }
}

impl fmt::Debug for LevyKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LevyKeypair {{ address: {} }}", self.address())
    }
}

/// Derive the account identity from a verifying key.
pub(crate) fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 prefix, hash x || y, keep the last 20 bytes.
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address::new(bytes)
}
