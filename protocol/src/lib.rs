// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Levy Protocol: Core Primitives
//!
//! The vocabulary every other Levy crate speaks: account identities,
//! amounts, Keccak hashing, secp256k1 recoverable signatures and the
//! EIP-712 digests that permits are signed over.
//!
//! ## Architecture
//!
//! - **config**: Protocol constants: token metadata, fee rates, chain ids.
//! - **types**: `Address`, `Amount`, ABI word encoding.
//! - **crypto**: Keccak-256, keys, signer recovery, typed data.
//!
//! ## Design Philosophy
//!
//! 1. Interop first: anything inside a signature preimage matches what
//!    wallets already produce, byte for byte.
//! 2. No unsafe code in crypto paths.
//! 3. If it touches money, it has tests. Plural.

pub mod config;
pub mod crypto;
pub mod types;

pub use types::{Address, Amount, ChainId};
