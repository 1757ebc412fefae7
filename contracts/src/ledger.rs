//! # Ledger
//!
//! The ground truth: account balances and the total-supply counter.
//!
//! ## Invariants
//!
//! - `Σ balances == total_supply` after every public call.
//! - No balance goes negative; every operation that would underflow or
//!   overflow fails and leaves the ledger untouched.
//!
//! Multi-step mutations (the taxed-transfer pipeline debits one account and
//! credits up to four others while burning part of the amount) go through a
//! [`LedgerBatch`]: a staged overlay that only touches the ledger when
//! [`LedgerBatch::commit`] is called. Dropping a batch discards it.

use std::collections::HashMap;

use levy_protocol::{Address, Amount};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Attempted to debit more than the available balance.
    #[error("insufficient balance: {account} has {available}, requested {requested}")]
    InsufficientBalance {
        account: Address,
        available: Amount,
        requested: Amount,
    },

    /// A credit or mint would overflow a balance or the total supply.
    #[error("amount overflow: crediting {amount} would exceed u128::MAX")]
    Overflow {
        /// The amount that caused the overflow.
        amount: Amount,
    },

    /// A burn would take the total supply below zero. Only reachable if the
    /// supply invariant was already broken, but we refuse to wrap anyway.
    #[error("supply underflow: burning {amount} from supply {supply}")]
    SupplyUnderflow { supply: Amount, amount: Amount },

    /// Minting to the null identity.
    #[error("mint to the zero address")]
    MintToZero,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Account balances plus total supply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    balances: HashMap<Address, Amount>,
    total_supply: Amount,
}

impl Ledger {
    /// Creates an empty ledger with zero supply.
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `account`, zero if it has never been touched.
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Current total supply.
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Creates new supply and credits it to `account`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::MintToZero`] for the null identity,
    /// [`LedgerError::Overflow`] if supply or balance would overflow.
    pub fn mint(&mut self, account: Address, amount: Amount) -> Result<(), LedgerError> {
        if account.is_zero() {
            return Err(LedgerError::MintToZero);
        }
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { amount })?;
        let new_balance = self
            .balance_of(&account)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { amount })?;

        self.total_supply = new_supply;
        self.balances.insert(account, new_balance);
        Ok(())
    }

    /// Destroys `amount` from `account`, reducing total supply.
    pub fn burn(&mut self, account: Address, amount: Amount) -> Result<(), LedgerError> {
        let mut batch = self.batch();
        batch.debit(account, amount)?;
        batch.retire(amount)?;
        batch.commit();
        Ok(())
    }

    /// Opens a staged batch over this ledger.
    pub fn batch(&mut self) -> LedgerBatch<'_> {
        let supply = self.total_supply;
        LedgerBatch {
            ledger: self,
            pending: HashMap::new(),
            supply,
        }
    }

    /// Recomputes `Σ balances` and compares it with the supply counter.
    /// Returns `false` on mismatch or if the sum itself overflows.
    pub fn is_consistent(&self) -> bool {
        self.balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b))
            .map(|sum| sum == self.total_supply)
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// LedgerBatch
// ---------------------------------------------------------------------------

/// A staged set of balance and supply changes.
///
/// Reads see the staged values, so a debit followed by a credit to the same
/// account nets out exactly as applying them one by one would. Nothing
/// reaches the underlying ledger until [`commit`](Self::commit).
#[derive(Debug)]
pub struct LedgerBatch<'a> {
    ledger: &'a mut Ledger,
    pending: HashMap<Address, Amount>,
    supply: Amount,
}

impl<'a> LedgerBatch<'a> {
    /// Balance of `account` as this batch currently sees it.
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.pending
            .get(account)
            .copied()
            .unwrap_or_else(|| self.ledger.balance_of(account))
    }

    /// Total supply as this batch currently sees it.
    pub fn total_supply(&self) -> Amount {
        self.supply
    }

    /// Stages a debit.
    pub fn debit(&mut self, account: Address, amount: Amount) -> Result<(), LedgerError> {
        let available = self.balance_of(&account);
        let remaining = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account,
                available,
                requested: amount,
            })?;
        self.pending.insert(account, remaining);
        Ok(())
    }

    /// Stages a credit.
    pub fn credit(&mut self, account: Address, amount: Amount) -> Result<(), LedgerError> {
        let updated = self
            .balance_of(&account)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { amount })?;
        self.pending.insert(account, updated);
        Ok(())
    }

    /// Stages a supply reduction for tokens already debited in this batch.
    pub fn retire(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.supply = self
            .supply
            .checked_sub(amount)
            .ok_or(LedgerError::SupplyUnderflow {
                supply: self.supply,
                amount,
            })?;
        Ok(())
    }

    /// Applies every staged change.
    pub fn commit(self) {
        let LedgerBatch {
            ledger,
            pending,
            supply,
        } = self;
        ledger.balances.extend(pending);
        ledger.total_supply = supply;
    }
}
