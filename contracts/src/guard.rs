//! # Recipient Validator
//!
//! A handful of accounts are never valid direct transfer destinations: the
//! null identity, the ledger's own account (its balance *is* the liquidity
//! accumulator), the staking sink (credited only through the tax share), and
//! the issuance sink. The check runs before anything else in the pipeline
//! and applies to every amount, zero included.

use levy_protocol::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a recipient was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecipientError {
    #[error("transfer to the zero address")]
    ZeroAddress,

    #[error("transfer to the ledger's own account")]
    LedgerAccount,

    #[error("transfer to the staking sink")]
    StakingSink,

    #[error("transfer to the issuance sink")]
    IssuanceSink,
}

/// The forbidden destinations of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientGuard {
    pub ledger_account: Address,
    pub staking_sink: Address,
    pub issuance_sink: Address,
}

impl RecipientGuard {
    pub fn new(ledger_account: Address, staking_sink: Address, issuance_sink: Address) -> Self {
        Self {
            ledger_account,
            staking_sink,
            issuance_sink,
        }
    }

    /// Fails if `recipient` may not receive a direct transfer.
    pub fn validate(&self, recipient: &Address) -> Result<(), RecipientError> {
        if recipient.is_zero() {
            Err(RecipientError::ZeroAddress)
        } else if *recipient == self.ledger_account {
            Err(RecipientError::LedgerAccount)
        } else if *recipient == self.staking_sink {
            Err(RecipientError::StakingSink)
        } else if *recipient == self.issuance_sink {
            Err(RecipientError::IssuanceSink)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> RecipientGuard {
        RecipientGuard::new(
            Address::from_tag(0xc0),
            Address::from_tag(0x5a),
            Address::from_tag(0x15),
        )
    }

    #[test]
    fn ordinary_recipient_passes() {
        assert!(guard().validate(&Address::from_tag(0x01)).is_ok());
    }

    #[test]
    fn system_accounts_rejected() {
        let g = guard();
        assert_eq!(g.validate(&Address::ZERO), Err(RecipientError::ZeroAddress));
        assert_eq!(
            g.validate(&g.ledger_account),
            Err(RecipientError::LedgerAccount)
        );
        assert_eq!(g.validate(&g.staking_sink), Err(RecipientError::StakingSink));
        assert_eq!(
            g.validate(&g.issuance_sink),
            Err(RecipientError::IssuanceSink)
        );
    }
}
