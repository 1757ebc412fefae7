//! # Hashing Utilities
//!
//! Keccak-256 is the only hash Levy uses. It is what wallets, off-band
//! signing tools and every EIP-712 implementation expect, so anything that
//! ends up inside a signature preimage has to go through it.
//!
//! Note that Keccak-256 is *not* NIST SHA3-256: the padding differs and the
//! digests do not match. `sha3::Keccak256` is the pre-standard variant.

use sha3::{Digest, Keccak256};

/// Compute the Keccak-256 hash of the input data.
///
/// # Example
///
/// ```
/// use levy_protocol::crypto::keccak256;
///
/// let hash = keccak256(b"");
/// assert_eq!(
///     hex::encode(hash),
///     "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
/// );
/// ```
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Hash multiple byte slices together without concatenation overhead.
///
/// Used for ABI-encoded preimages like `typehash || owner || spender || …`
/// where every part is already a 32-byte word.
pub fn keccak256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
