//! # Delegated Approval (EIP-2612 Permit)
//!
//! A permit is an allowance granted by signature instead of by a call from
//! the owner. The owner signs `(owner, spender, value, nonce, deadline)`
//! under the token's EIP-712 domain off-band; anyone can then submit it.
//!
//! ## Verification order
//!
//! 1. `now > deadline` → expired, before any hashing.
//! 2. Domain separator from the cache, rebuilt if the live chain id moved.
//! 3. Digest over the owner's *current* nonce.
//! 4. Recover the signer; it must equal `owner`.
//! 5. Consume the nonce (exactly once, exactly the value that was signed).
//! 6. Write the allowance.
//!
//! Steps 1 to 4 are pure. The token performs 5 and 6 only after they pass, so a
//! rejected permit leaves nonces and allowances untouched.

use std::collections::HashMap;

use levy_protocol::crypto::{
    recover_address, Eip712Domain, LevyKeypair, PermitMessage, RecoverableSignature,
    SignatureError,
};
use levy_protocol::{Address, Amount, ChainId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a permit was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermitError {
    #[error("expired authorization: deadline {deadline}, now {now}")]
    Expired { deadline: u64, now: u64 },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("nonce overflow for {0}")]
    NonceOverflow(Address),

    #[error("stale nonce for {owner}: expected {expected}, current {current}")]
    NonceMismatch {
        owner: Address,
        expected: u64,
        current: u64,
    },
}

impl From<SignatureError> for PermitError {
    fn from(_: SignatureError) -> Self {
        // Every recovery failure collapses to the same error on purpose:
        // no oracle for *why* a signature was bad.
        PermitError::InvalidSignature
    }
}

// ---------------------------------------------------------------------------
// Domain separator cache
// ---------------------------------------------------------------------------

/// Cached EIP-712 domain separator bound to the chain id it was built for.
///
/// Read through [`separator_for`](Self::separator_for) (pure, rebuilds on a
/// mismatch without storing) or [`refresh`](Self::refresh) (rebuilds and
/// stores). Either way a signature is never checked against a separator for
/// the wrong chain, which is what keeps permits from replaying across a fork
/// that changed the chain id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSeparatorCache {
    name: String,
    version: String,
    verifying_contract: Address,
    cached_chain_id: ChainId,
    #[serde(with = "hex_word")]
    cached_separator: [u8; 32],
}

impl DomainSeparatorCache {
    /// Computes the separator for `chain_id` once, at construction.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        verifying_contract: Address,
        chain_id: ChainId,
    ) -> Self {
        let mut cache = Self {
            name: name.into(),
            version: version.into(),
            verifying_contract,
            cached_chain_id: chain_id,
            cached_separator: [0u8; 32],
        };
        cache.cached_separator = cache.build(chain_id);
        cache
    }

    /// The domain parameters for `chain_id`.
    pub fn domain(&self, chain_id: ChainId) -> Eip712Domain {
        Eip712Domain {
            name: self.name.clone(),
            version: self.version.clone(),
            chain_id,
            verifying_contract: self.verifying_contract,
        }
    }

    /// Separator for the live `chain_id`. Uses the cache on a hit.
    pub fn separator_for(&self, chain_id: ChainId) -> [u8; 32] {
        if chain_id == self.cached_chain_id {
            self.cached_separator
        } else {
            self.build(chain_id)
        }
    }

    /// Like [`separator_for`](Self::separator_for) but stores the rebuilt
    /// value so later reads on the new chain hit the cache.
    pub fn refresh(&mut self, chain_id: ChainId) -> [u8; 32] {
        if chain_id != self.cached_chain_id {
            tracing::info!(
                old_chain_id = self.cached_chain_id,
                new_chain_id = chain_id,
                "chain id changed, rebuilding domain separator"
            );
            self.cached_separator = self.build(chain_id);
            self.cached_chain_id = chain_id;
        }
        self.cached_separator
    }

    pub fn cached_chain_id(&self) -> ChainId {
        self.cached_chain_id
    }

    fn build(&self, chain_id: ChainId) -> [u8; 32] {
        self.domain(chain_id).separator()
    }
}

// ---------------------------------------------------------------------------
// Nonce registry
// ---------------------------------------------------------------------------

/// Per-owner permit counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRegistry {
    nonces: HashMap<Address, u64>,
}

impl NonceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The nonce the next permit from `owner` must be signed over.
    pub fn current(&self, owner: &Address) -> u64 {
        self.nonces.get(owner).copied().unwrap_or(0)
    }

    /// Checks that `expected` is still the current nonce of `owner` and
    /// that it can be advanced. Does not mutate.
    pub fn ensure_consumable(&self, owner: &Address, expected: u64) -> Result<(), PermitError> {
        let current = self.current(owner);
        if current != expected {
            return Err(PermitError::NonceMismatch {
                owner: *owner,
                expected,
                current,
            });
        }
        current
            .checked_add(1)
            .map(|_| ())
            .ok_or(PermitError::NonceOverflow(*owner))
    }

    /// Advances `owner`'s nonce from `expected` to `expected + 1`.
    pub fn consume(&mut self, owner: Address, expected: u64) -> Result<u64, PermitError> {
        self.ensure_consumable(&owner, expected)?;
        let next = expected + 1;
        self.nonces.insert(owner, next);
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A signed permit as submitted to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitRequest {
    pub owner: Address,
    pub spender: Address,
    pub value: Amount,
    /// Unix seconds.
    pub deadline: u64,
    pub signature: RecoverableSignature,
}

impl PermitRequest {
    /// Signs a permit the way a wallet would. Used by the `sign-permit` CLI
    /// and the tests; the ledger itself never holds keys.
    pub fn sign(
        keypair: &LevyKeypair,
        domain: &Eip712Domain,
        spender: Address,
        value: Amount,
        nonce: u64,
        deadline: u64,
    ) -> Result<Self, SignatureError> {
        let owner = keypair.address();
        let message = PermitMessage {
            owner,
            spender,
            value,
            nonce,
            deadline,
        };
        let digest = message.signing_digest(&domain.separator());
        let signature = keypair.sign_prehash(&digest)?;
        Ok(Self {
            owner,
            spender,
            value,
            deadline,
            signature,
        })
    }

    /// The typed message this request claims to carry, at `nonce`.
    pub fn message(&self, nonce: u64) -> PermitMessage {
        PermitMessage {
            owner: self.owner,
            spender: self.spender,
            value: self.value,
            nonce,
            deadline: self.deadline,
        }
    }
}

/// Steps 1, 3 and 4 of verification: deadline, digest, signer.
///
/// Pure; the caller supplies the separator for the live chain and the
/// owner's current nonce.
pub fn verify_permit(
    request: &PermitRequest,
    domain_separator: &[u8; 32],
    nonce: u64,
    now: u64,
) -> Result<(), PermitError> {
    if now > request.deadline {
        return Err(PermitError::Expired {
            deadline: request.deadline,
            now,
        });
    }

    let digest = request.message(nonce).signing_digest(domain_separator);
    let signer = recover_address(&digest, &request.signature)?;

    if signer.is_zero() || signer != request.owner {
        return Err(PermitError::InvalidSignature);
    }
    Ok(())
}

/// Serde helper: 32-byte arrays as `0x`-prefixed hex.
pub(crate) mod hex_word {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(word: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(word)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(&s))
            .map_err(serde::de::Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}
