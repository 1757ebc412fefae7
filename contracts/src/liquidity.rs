//! # Liquidity Accumulator & Automator
//!
//! The liquidity share of every taxed transfer lands on the ledger's own
//! account. Once that balance reaches the threshold, the automator:
//!
//! 1. splits it into `swap_half = floor(balance / 2)` and
//!    `keep_half = balance - swap_half`;
//! 2. records the counterpart holdings as a baseline;
//! 3. asks the exchange to swap `swap_half` for the counterpart asset;
//! 4. measures what actually arrived (`current - baseline`);
//! 5. contributes `keep_half` plus the received counterpart to the pool,
//!    with the LP receipt sent to [`Address::DEAD`].
//!
//! ## Failure handling
//!
//! The exchange is external and untrusted, but it may only fail cleanly: an
//! `Err` means it moved none of the ledger's tokens or counterpart. The
//! automator therefore undoes only its own writes. A failed swap leaves the
//! router approval behind, which is revoked. A failed contribution also
//! gets the counterpart handed over with the call credited back, so the swap
//! stands and its proceeds stay in the ledger's holdings. Either way the
//! failure is reported as an [`AutomationOutcome`] and never propagates to
//! the transfer that triggered the attempt. Whatever is left in the
//! accumulator is retried by a later transfer.
//!
//! ## Reentrancy
//!
//! The exchange receives `&mut LevyToken` and may call back into any public
//! operation. While an attempt is in flight the token's `in_automation` lock
//! is held and the exchange is checked out of the token, so a nested
//! transfer can never start a second attempt. Nested transfers see
//! committed balances only: every ledger mutation is applied before control
//! is handed out. What a nested call commits stays committed, whatever the
//! attempt around it ends in.

use levy_protocol::{Address, Amount};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::CallContext;
use crate::token::LevyToken;

/// Failure reported by an exchange. Expected and recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("no trading route for the requested pair")]
    NoRoute,

    #[error("insufficient liquidity: reserve {reserve}, requested {requested}")]
    InsufficientLiquidity { reserve: Amount, requested: Amount },

    #[error("slippage: output {output} below minimum {minimum}")]
    Slippage { output: Amount, minimum: Amount },

    #[error("zero amount")]
    ZeroAmount,

    #[error("ledger rejected exchange call: {0}")]
    Ledger(String),

    #[error("exchange unavailable: {0}")]
    Unavailable(String),
}

/// What the pool accepted in an `add_liquidity` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LiquidityAdded {
    pub token_amount: Amount,
    pub counterpart_amount: Amount,
    /// LP shares minted to the receipt sink.
    pub liquidity_minted: Amount,
}

/// The external exchange, as the ledger sees it.
///
/// Implementations must be atomic: return `Err` only before mutating
/// themselves and before moving any of the ledger account's tokens or
/// paying out counterpart. Calls made into the token on behalf of other
/// accounts are ordinary transfers and stand either way.
pub trait Exchange: Send {
    /// Identity the exchange spends the ledger's tokens under.
    fn router(&self) -> Address;

    /// Swap `amount_in` tokens held by the ledger's own account for the
    /// counterpart asset, paying the output via
    /// [`LevyToken::receive_counterpart`]. The ledger has approved
    /// [`router`](Self::router) beforehand.
    fn swap_tokens_for_counterpart(
        &mut self,
        token: &mut LevyToken,
        ctx: &CallContext,
        amount_in: Amount,
    ) -> Result<(), ExchangeError>;

    /// Contribute up to `token_amount` tokens and exactly the
    /// `counterpart_amount` already debited from the ledger's holdings.
    /// Unused counterpart is refunded via [`LevyToken::receive_counterpart`];
    /// the LP receipt goes to `lp_recipient`.
    fn add_liquidity(
        &mut self,
        token: &mut LevyToken,
        ctx: &CallContext,
        token_amount: Amount,
        counterpart_amount: Amount,
        lp_recipient: Address,
    ) -> Result<LiquidityAdded, ExchangeError>;
}

/// Owner-controlled automation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquiditySettings {
    /// Minimum ledger-owned balance before an attempt is made.
    pub threshold: Amount,
    /// Master switch.
    pub enabled: bool,
}

/// Result of the post-transfer automation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationOutcome {
    /// Accumulator below threshold; nothing to do.
    BelowThreshold { accumulated: Amount },
    /// The owner switched automation off.
    Disabled,
    /// An attempt is already in flight further up the stack.
    Locked,
    /// The transfer came out of the liquidity pool itself.
    PoolSender,
    /// No exchange attached to this ledger.
    NoExchange,
    /// Swap and liquidity contribution both succeeded.
    Liquified {
        swapped: Amount,
        counterpart_received: Amount,
        tokens_added: Amount,
        counterpart_added: Amount,
    },
    /// The swap failed; the attempt's own writes were undone.
    SwapFailed { reason: String },
    /// The swap stands but the contribution failed; the counterpart handed
    /// over with it was credited back.
    LiquidityFailed { reason: String },
}

impl AutomationOutcome {
    /// `true` when an exchange call was actually attempted.
    pub fn attempted(&self) -> bool {
        matches!(
            self,
            Self::Liquified { .. } | Self::SwapFailed { .. } | Self::LiquidityFailed { .. }
        )
    }

    /// `true` when an attempt was made and failed.
    pub fn failed(&self) -> bool {
        matches!(self, Self::SwapFailed { .. } | Self::LiquidityFailed { .. })
    }
}

/// `(swap_half, keep_half)` with `swap_half = floor(balance / 2)`.
pub fn split_halves(balance: Amount) -> (Amount, Amount) {
    let swap_half = balance / 2;
    (swap_half, balance - swap_half)
}

impl LevyToken {
    /// Post-transfer threshold check, and the attempt if it passes.
    pub(crate) fn maybe_automate(
        &mut self,
        ctx: &CallContext,
        sender: Address,
    ) -> AutomationOutcome {
        let accumulated = self.accumulator_balance();
        let settings = self.state.liquidity;

        if accumulated == 0 || accumulated < settings.threshold {
            return AutomationOutcome::BelowThreshold { accumulated };
        }
        if !settings.enabled {
            return AutomationOutcome::Disabled;
        }
        if self.state.in_automation {
            return AutomationOutcome::Locked;
        }
        if self.state.liquidity_pool == Some(sender) {
            return AutomationOutcome::PoolSender;
        }
        let Some(mut exchange) = self.exchange.take() else {
            return AutomationOutcome::NoExchange;
        };

        self.state.in_automation = true;
        let outcome = self.liquify(ctx, exchange.as_mut(), accumulated);
        self.state.in_automation = false;
        self.exchange = Some(exchange);

        match &outcome {
            AutomationOutcome::Liquified {
                swapped,
                counterpart_received,
                tokens_added,
                ..
            } => tracing::info!(
                accumulated,
                swapped,
                counterpart_received,
                tokens_added,
                "liquidity automation succeeded"
            ),
            AutomationOutcome::SwapFailed { reason }
            | AutomationOutcome::LiquidityFailed { reason } => tracing::warn!(
                accumulated,
                %reason,
                "liquidity automation failed, accumulator left in place"
            ),
            _ => {}
        }
        outcome
    }

    fn liquify(
        &mut self,
        ctx: &CallContext,
        exchange: &mut dyn Exchange,
        accumulated: Amount,
    ) -> AutomationOutcome {
        let (swap_half, keep_half) = split_halves(accumulated);
        let ledger_account = self.state.guard.ledger_account;
        let router = exchange.router();

        // The exchange acts on behalf of the ledger's own account.
        let automation_ctx = ctx.with_caller(ledger_account);

        if let Err(e) = self
            .state
            .allowances
            .approve(ledger_account, router, accumulated)
        {
            return AutomationOutcome::SwapFailed {
                reason: e.to_string(),
            };
        }

        let baseline = self.state.counterpart_balance;
        let outcome = match exchange.swap_tokens_for_counterpart(self, &automation_ctx, swap_half) {
            Ok(()) => {
                let counterpart_received =
                    self.state.counterpart_balance.saturating_sub(baseline);
                self.contribute(
                    exchange,
                    &automation_ctx,
                    swap_half,
                    keep_half,
                    counterpart_received,
                )
            }
            Err(e) => AutomationOutcome::SwapFailed {
                reason: e.to_string(),
            },
        };
        // Leftover router approval is not needed past this attempt.
        self.state.allowances.revoke(&ledger_account, &router);
        outcome
    }

    fn contribute(
        &mut self,
        exchange: &mut dyn Exchange,
        ctx: &CallContext,
        swapped: Amount,
        keep_half: Amount,
        counterpart_received: Amount,
    ) -> AutomationOutcome {
        // Hand the counterpart over with the call, like a payable value.
        self.state.counterpart_balance -= counterpart_received;

        match exchange.add_liquidity(self, ctx, keep_half, counterpart_received, Address::DEAD) {
            Ok(added) => AutomationOutcome::Liquified {
                swapped,
                counterpart_received,
                tokens_added: added.token_amount,
                counterpart_added: added.counterpart_amount,
            },
            Err(e) => {
                self.state.counterpart_balance = self
                    .state
                    .counterpart_balance
                    .saturating_add(counterpart_received);
                AutomationOutcome::LiquidityFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
