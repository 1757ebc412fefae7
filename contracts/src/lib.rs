//! # Levy Ledger
//!
//! The on-ledger logic of the Levy token: a fungible asset whose transfers
//! carry a three-way levy.
//!
//! - **Tax**: redirected to a staking contract, which is notified of the
//!   reward after its balance is credited.
//! - **Liquidity**: accumulated under the ledger's own account and, past a
//!   threshold, swapped half-and-half into a pool whose LP receipt is burned.
//! - **Deflation**: destroyed, shrinking the total supply.
//!
//! Allowances can be granted by an EIP-2612 signed permit as well as by a
//! direct call.
//!
//! ## Design Principles
//!
//! 1. Every balance, supply and allowance update is checked. Overflow and
//!    underflow fail the call; nothing wraps.
//! 2. A failed call mutates nothing. Multi-step updates are staged and
//!    committed at once.
//! 3. External code runs last. The staking sink and the exchange only ever
//!    see committed state, and the exchange may re-enter without starting a
//!    second automation attempt.
//! 4. Every piece of durable state is serializable (serde) so the node can
//!    snapshot it.

pub mod allowance;
pub mod config;
pub mod context;
pub mod exchange;
pub mod fees;
pub mod guard;
pub mod ledger;
pub mod liquidity;
pub mod permit;
pub mod staking;
pub mod token;

pub use config::{ConfigError, TokenConfig};
pub use context::CallContext;
pub use exchange::ConstantProductExchange;
pub use liquidity::{AutomationOutcome, Exchange, ExchangeError};
pub use permit::PermitRequest;
pub use staking::{RewardPool, StakingSink};
pub use token::{LevyToken, TokenError, TokenState, TransferReceipt};
