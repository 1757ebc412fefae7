//! # Fee Policy
//!
//! Splits a transfer amount into three fee shares and the net amount that
//! reaches the recipient:
//!
//! ```text
//! tax       = floor(amount * tax_rate       / 1000)   → staking sink
//! liquidity = floor(amount * liquidity_rate / 1000)   → ledger's own account
//! deflation = floor(amount * deflation_rate / 1000)   → burned
//! net       = amount - tax - liquidity - deflation    → recipient
//! ```
//!
//! Each share is floored independently, so rounding dust always stays with
//! the recipient and the four parts sum to `amount` exactly. If either party
//! is in the exclusion set, every share is zero.

use std::collections::HashSet;

use levy_protocol::config::{
    DEFLATION_RATE_PER_MILLE, FEE_DENOMINATOR, LIQUIDITY_RATE_PER_MILLE, TAX_RATE_PER_MILLE,
};
use levy_protocol::{Address, Amount};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from fee configuration and computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeError {
    /// The three rates together exceed 100%.
    #[error("fee rates sum to {total}‰, which exceeds 1000‰")]
    RatesTooHigh { total: u32 },

    /// `amount * rate` overflowed `u128`.
    #[error("fee computation overflow for amount {0}")]
    Overflow(Amount),
}

/// The three per-mille rates, fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub tax_per_mille: u16,
    pub liquidity_per_mille: u16,
    pub deflation_per_mille: u16,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            tax_per_mille: TAX_RATE_PER_MILLE,
            liquidity_per_mille: LIQUIDITY_RATE_PER_MILLE,
            deflation_per_mille: DEFLATION_RATE_PER_MILLE,
        }
    }
}

impl FeeSchedule {
    /// Builds a schedule, rejecting rates that sum past 1000‰.
    pub fn new(tax: u16, liquidity: u16, deflation: u16) -> Result<Self, FeeError> {
        let schedule = Self {
            tax_per_mille: tax,
            liquidity_per_mille: liquidity,
            deflation_per_mille: deflation,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Sum of the three rates must not exceed 1000‰.
    pub fn validate(&self) -> Result<(), FeeError> {
        let total = u32::from(self.tax_per_mille)
            + u32::from(self.liquidity_per_mille)
            + u32::from(self.deflation_per_mille);
        if u128::from(total) > FEE_DENOMINATOR {
            return Err(FeeError::RatesTooHigh { total });
        }
        Ok(())
    }

    /// Computes the split for `amount`. `exempt` zeroes every share.
    pub fn compute(&self, amount: Amount, exempt: bool) -> Result<FeeShares, FeeError> {
        if exempt {
            return Ok(FeeShares::exempt(amount));
        }

        let tax = share(amount, self.tax_per_mille)?;
        let liquidity = share(amount, self.liquidity_per_mille)?;
        let deflation = share(amount, self.deflation_per_mille)?;

        // Σ shares <= amount whenever the schedule passed `validate`.
        let net = amount
            .checked_sub(tax + liquidity + deflation)
            .ok_or(FeeError::Overflow(amount))?;

        Ok(FeeShares {
            tax,
            liquidity,
            deflation,
            net,
        })
    }
}

fn share(amount: Amount, rate: u16) -> Result<Amount, FeeError> {
    amount
        .checked_mul(u128::from(rate))
        .map(|scaled| scaled / FEE_DENOMINATOR)
        .ok_or(FeeError::Overflow(amount))
}

/// The result of a fee split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeShares {
    /// Redirected to the staking sink.
    pub tax: Amount,
    /// Accumulated under the ledger's own account.
    pub liquidity: Amount,
    /// Burned.
    pub deflation: Amount,
    /// Forwarded to the recipient.
    pub net: Amount,
}

impl FeeShares {
    /// No fees: the whole amount is net.
    pub fn exempt(amount: Amount) -> Self {
        Self {
            net: amount,
            ..Self::default()
        }
    }

    /// `tax + liquidity + deflation`.
    pub fn total_fees(&self) -> Amount {
        self.tax + self.liquidity + self.deflation
    }

    /// `total_fees + net`, i.e. the gross transfer amount.
    pub fn gross(&self) -> Amount {
        self.total_fees() + self.net
    }
}

/// Accounts exempt from fee assessment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeExclusions {
    accounts: HashSet<Address>,
}

impl FeeExclusions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `account`. Returns `false` if it was already excluded.
    pub fn exclude(&mut self, account: Address) -> bool {
        self.accounts.insert(account)
    }

    /// Removes `account`. Returns `false` if it was not excluded.
    pub fn include(&mut self, account: &Address) -> bool {
        self.accounts.remove(account)
    }

    pub fn is_excluded(&self, account: &Address) -> bool {
        self.accounts.contains(account)
    }

    /// A transfer is exempt if either party is excluded.
    pub fn is_exempt(&self, from: &Address, to: &Address) -> bool {
        self.is_excluded(from) || self.is_excluded(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_schedule_split() {
        let shares = FeeSchedule::default().compute(1_000, false).unwrap();
        assert_eq!(shares.tax, 20);
        assert_eq!(shares.liquidity, 20);
        assert_eq!(shares.deflation, 10);
        assert_eq!(shares.net, 950);
    }

    #[test]
    fn shares_floor_and_dust_goes_to_net() {
        // 49 * 20 / 1000 = 0.98 → 0
        let shares = FeeSchedule::default().compute(49, false).unwrap();
        assert_eq!(shares.total_fees(), 0);
        assert_eq!(shares.net, 49);

        // 999: tax 19, liquidity 19, deflation 9, net 952
        let shares = FeeSchedule::default().compute(999, false).unwrap();
        assert_eq!((shares.tax, shares.liquidity, shares.deflation), (19, 19, 9));
        assert_eq!(shares.net, 952);
    }

    #[test]
    fn exempt_transfers_pay_nothing() {
        let shares = FeeSchedule::default().compute(12_345, true).unwrap();
        assert_eq!(shares, FeeShares::exempt(12_345));
    }

    #[test]
    fn rates_over_one_hundred_percent_rejected() {
        assert_eq!(
            FeeSchedule::new(500, 400, 101),
            Err(FeeError::RatesTooHigh { total: 1001 })
        );
        assert!(FeeSchedule::new(500, 400, 100).is_ok());
    }

    #[test]
    fn full_rate_schedule_leaves_zero_net() {
        let schedule = FeeSchedule::new(500, 400, 100).unwrap();
        let shares = schedule.compute(1_000, false).unwrap();
        assert_eq!(shares.net, 0);
        assert_eq!(shares.gross(), 1_000);
    }

    #[test]
    fn huge_amount_overflows_cleanly() {
        assert_eq!(
            FeeSchedule::default().compute(u128::MAX, false),
            Err(FeeError::Overflow(u128::MAX))
        );
    }

    #[test]
    fn exemption_applies_to_either_side() {
        let mut ex = FeeExclusions::new();
        let a = Address::from_tag(1);
        let b = Address::from_tag(2);
        let c = Address::from_tag(3);
        assert!(ex.exclude(a));
        assert!(!ex.exclude(a));
        assert!(ex.is_exempt(&a, &b));
        assert!(ex.is_exempt(&b, &a));
        assert!(!ex.is_exempt(&b, &c));
        assert!(ex.include(&a));
        assert!(!ex.is_exempt(&a, &b));
    }

    proptest! {
        #[test]
        fn split_always_sums_to_amount(amount in 0u128..(u128::MAX / 1_000)) {
            let shares = FeeSchedule::default().compute(amount, false).unwrap();
            prop_assert_eq!(shares.gross(), amount);
        }

        #[test]
        fn arbitrary_valid_schedules_sum_exactly(
            tax in 0u16..=400,
            liq in 0u16..=300,
            def in 0u16..=300,
            amount in 0u128..(u128::MAX / 1_000),
        ) {
            let schedule = FeeSchedule::new(tax, liq, def).unwrap();
            let shares = schedule.compute(amount, false).unwrap();
            prop_assert_eq!(shares.tax, amount * u128::from(tax) / 1_000);
            prop_assert_eq!(shares.gross(), amount);
        }
    }
}
