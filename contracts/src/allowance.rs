//! # Allowance Table
//!
//! `(owner, spender) → amount` approvals consumed by delegated transfers.
//!
//! `approve` overwrites; `increase`/`decrease` apply deltas. Nothing here
//! ever wraps: a decrement below zero or an increment past `u128::MAX`
//! fails and leaves the entry as it was.

use std::collections::HashMap;

use levy_protocol::{Address, Amount};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during allowance operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllowanceError {
    /// Approving from the null identity.
    #[error("approve from the zero address")]
    ZeroOwner,

    /// Approving to the null identity.
    #[error("approve to the zero address")]
    ZeroSpender,

    /// The spender tried to consume more than it was approved for.
    #[error("insufficient allowance: {spender} may spend {allowed} of {owner}, requested {requested}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowed: Amount,
        requested: Amount,
    },

    /// `decrease_allowance` below zero.
    #[error("decreased allowance below zero: current {current}, decrease {decrease}")]
    BelowZero { current: Amount, decrease: Amount },

    /// `increase_allowance` past `u128::MAX`.
    #[error("allowance overflow: current {current}, increase {increase}")]
    Overflow { current: Amount, increase: Amount },
}

/// Approved spending amounts, keyed by owner then spender.
///
/// Nested maps rather than a tuple key so the table serializes to JSON with
/// address strings as keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceTable {
    allowances: HashMap<Address, HashMap<Address, Amount>>,
}

impl AllowanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount `spender` may still spend on behalf of `owner`.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Sets the allowance unconditionally.
    pub fn approve(
        &mut self,
        owner: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<(), AllowanceError> {
        Self::check_identities(&owner, &spender)?;
        self.set(owner, spender, amount);
        Ok(())
    }

    /// Adds `delta` to the current allowance. Returns the new value.
    pub fn increase(
        &mut self,
        owner: Address,
        spender: Address,
        delta: Amount,
    ) -> Result<Amount, AllowanceError> {
        Self::check_identities(&owner, &spender)?;
        let current = self.allowance(&owner, &spender);
        let updated = current.checked_add(delta).ok_or(AllowanceError::Overflow {
            current,
            increase: delta,
        })?;
        self.set(owner, spender, updated);
        Ok(updated)
    }

    /// Subtracts `delta` from the current allowance. Returns the new value.
    pub fn decrease(
        &mut self,
        owner: Address,
        spender: Address,
        delta: Amount,
    ) -> Result<Amount, AllowanceError> {
        Self::check_identities(&owner, &spender)?;
        let current = self.allowance(&owner, &spender);
        let updated = current.checked_sub(delta).ok_or(AllowanceError::BelowZero {
            current,
            decrease: delta,
        })?;
        self.set(owner, spender, updated);
        Ok(updated)
    }

    /// Fails unless `spender` may spend `amount` of `owner`'s balance.
    /// Does not mutate; pair with [`spend`](Self::spend).
    pub fn ensure(
        &self,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<(), AllowanceError> {
        let allowed = self.allowance(owner, spender);
        if allowed < amount {
            return Err(AllowanceError::InsufficientAllowance {
                owner: *owner,
                spender: *spender,
                allowed,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Consumes exactly `amount` from `(owner, spender)`.
    pub fn spend(
        &mut self,
        owner: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<Amount, AllowanceError> {
        self.ensure(&owner, &spender, amount)?;
        let remaining = self.allowance(&owner, &spender) - amount;
        self.set(owner, spender, remaining);
        Ok(remaining)
    }

    /// Removes the `(owner, spender)` entry entirely.
    pub fn revoke(&mut self, owner: &Address, spender: &Address) {
        if let Some(spenders) = self.allowances.get_mut(owner) {
            spenders.remove(spender);
            if spenders.is_empty() {
                self.allowances.remove(owner);
            }
        }
    }

    fn set(&mut self, owner: Address, spender: Address, amount: Amount) {
        self.allowances
            .entry(owner)
            .or_default()
            .insert(spender, amount);
    }

    fn check_identities(owner: &Address, spender: &Address) -> Result<(), AllowanceError> {
        if owner.is_zero() {
            return Err(AllowanceError::ZeroOwner);
        }
        if spender.is_zero() {
            return Err(AllowanceError::ZeroSpender);
        }
        Ok(())
    }
}
