//! # Typed Structured Data (EIP-712)
//!
//! Permit signatures are produced by wallets and off-band tools, so the
//! hashing scheme below has to match them byte for byte:
//!
//! ```text
//! domain_separator = keccak256(DOMAIN_TYPEHASH || keccak256(name) || keccak256(version)
//!                              || chainId || verifyingContract)
//! struct_hash      = keccak256(PERMIT_TYPEHASH || owner || spender || value || nonce || deadline)
//! digest           = keccak256(0x19 || 0x01 || domain_separator || struct_hash)
//! ```
//!
//! Every field is a 32-byte ABI word. The field order of the permit struct is
//! fixed by the type string and must never change.

use serde::{Deserialize, Serialize};

use super::hash::{keccak256, keccak256_multi};
use crate::types::{u128_to_word, u64_to_word, Address, Amount, ChainId};

/// Type string of the EIP-712 domain.
pub const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Type string of the EIP-2612 permit message.
pub const PERMIT_TYPE: &str =
    "Permit(address owner,address spender,uint256 value,uint256 nonce,uint256 deadline)";

/// `keccak256(DOMAIN_TYPE)`.
pub fn domain_typehash() -> [u8; 32] {
    keccak256(DOMAIN_TYPE.as_bytes())
}

/// `keccak256(PERMIT_TYPE)`.
pub fn permit_typehash() -> [u8; 32] {
    keccak256(PERMIT_TYPE.as_bytes())
}

/// The parameters a domain separator binds a signature to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Domain {
    /// Protocol name (the token name).
    pub name: String,
    /// Protocol version.
    pub version: String,
    /// Network identity.
    pub chain_id: ChainId,
    /// Ledger identity.
    pub verifying_contract: Address,
}

impl Eip712Domain {
    /// Computes the domain separator for these parameters.
    pub fn separator(&self) -> [u8; 32] {
        let name_hash = keccak256(self.name.as_bytes());
        let version_hash = keccak256(self.version.as_bytes());
        let chain = u64_to_word(self.chain_id);
        let contract = self.verifying_contract.to_word();
        keccak256_multi(&[
            &domain_typehash(),
            &name_hash,
            &version_hash,
            &chain,
            &contract,
        ])
    }
}

/// An EIP-2612 permit message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitMessage {
    pub owner: Address,
    pub spender: Address,
    pub value: Amount,
    pub nonce: u64,
    /// Unix timestamp (seconds) after which the permit is void.
    pub deadline: u64,
}

impl PermitMessage {
    /// `hashStruct(Permit)`.
    pub fn struct_hash(&self) -> [u8; 32] {
        keccak256_multi(&[
            &permit_typehash(),
            &self.owner.to_word(),
            &self.spender.to_word(),
            &u128_to_word(self.value),
            &u64_to_word(self.nonce),
            &u64_to_word(self.deadline),
        ])
    }

    /// The digest a wallet signs for this message under `domain_separator`.
    pub fn signing_digest(&self, domain_separator: &[u8; 32]) -> [u8; 32] {
        typed_data_digest(domain_separator, &self.struct_hash())
    }
}

/// Second stage of the scheme: `keccak256(0x1901 || domain || struct_hash)`.
pub fn typed_data_digest(domain_separator: &[u8; 32], struct_hash: &[u8; 32]) -> [u8; 32] {
    keccak256_multi(&[b"\x19\x01", domain_separator, struct_hash])
}
