//! # Cryptographic Primitives for Levy
//!
//! Everything signature-related flows through here: Keccak-256 hashing,
//! secp256k1 keys, recoverable signatures, and the EIP-712 typed-data
//! digests permits are signed over.
//!
//! Everything here is a thin, type-safe wrapper around `k256` and `sha3`.
//! We don't roll our own.

pub mod hash;
pub mod keys;
pub mod signatures;
pub mod typed_data;

pub use hash::{keccak256, keccak256_multi};
pub use keys::{KeyError, LevyKeypair};
pub use signatures::{recover_address, RecoverableSignature, SignatureError};
pub use typed_data::{typed_data_digest, Eip712Domain, PermitMessage};
