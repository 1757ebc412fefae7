//! In-process constant-product exchange.
//!
//! Pairs the token with an abstract counterpart asset. The token side of the
//! pool lives on the ledger as the pair account's balance; the counterpart
//! side, the LP share book and a halt switch live here behind a shared
//! handle so the node can snapshot them while the token owns the boxed
//! exchange.
//!
//! Pricing is `x * y = k` with a 0.3% input fee. Liquidity contributions
//! after the first are matched to the current ratio; the surplus counterpart
//! is refunded to the token and surplus tokens are simply never pulled.

use std::collections::HashMap;
use std::sync::Arc;

use levy_protocol::{Address, Amount};
use parking_lot::Mutex;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::context::CallContext;
use crate::liquidity::{Exchange, ExchangeError, LiquidityAdded};
use crate::token::LevyToken;

/// Input fee in basis points.
pub const SWAP_FEE_BPS: u128 = 30;
const BPS: u128 = 10_000;

/// LP shares locked forever on the first contribution.
pub const MINIMUM_LIQUIDITY: Amount = 1_000;

/// Exchange-side state of the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub counterpart_reserve: Amount,
    pub lp_supply: Amount,
    pub lp_balances: HashMap<Address, Amount>,
    pub swaps: u64,
    /// When set every call fails with [`ExchangeError::Unavailable`].
    #[serde(default)]
    pub halted: bool,
}

/// A single-pair router backed by the token ledger.
#[derive(Debug, Clone)]
pub struct ConstantProductExchange {
    router: Address,
    pair: Address,
    state: Arc<Mutex<PoolState>>,
}

impl ConstantProductExchange {
    pub fn new(router: Address, pair: Address) -> Self {
        Self::with_state(router, pair, PoolState::default())
    }

    pub fn with_state(router: Address, pair: Address, state: PoolState) -> Self {
        Self {
            router,
            pair,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn pair(&self) -> Address {
        self.pair
    }

    pub fn snapshot(&self) -> PoolState {
        self.state.lock().clone()
    }

    pub fn set_halted(&self, halted: bool) {
        self.state.lock().halted = halted;
    }

    pub fn lp_balance(&self, holder: &Address) -> Amount {
        self.state
            .lock()
            .lp_balances
            .get(holder)
            .copied()
            .unwrap_or(0)
    }

    /// Seeds or tops up the pool from `provider`'s tokens plus
    /// `counterpart` units brought from outside the ledger.
    ///
    /// `provider` must have approved the router for `token_amount`.
    pub fn seed(
        &mut self,
        token: &mut LevyToken,
        ctx: &CallContext,
        provider: Address,
        token_amount: Amount,
        counterpart: Amount,
    ) -> Result<LiquidityAdded, ExchangeError> {
        self.deposit(token, ctx, provider, token_amount, counterpart, provider)
    }

    /// Counterpart out for `amount_in` tokens, at current reserves.
    pub fn quote_counterpart_for_tokens(
        &self,
        token: &LevyToken,
        amount_in: Amount,
    ) -> Result<Amount, ExchangeError> {
        let token_reserve = token.balance_of(&self.pair);
        let counterpart_reserve = self.state.lock().counterpart_reserve;
        amount_out(amount_in, token_reserve, counterpart_reserve)
    }

    /// Buys tokens for `recipient` with `counterpart_in` units of the
    /// counterpart asset. The pair is fee-excluded, so the recipient gets
    /// the full output and the token's automation sees `pair` as sender.
    pub fn buy_tokens(
        &mut self,
        token: &mut LevyToken,
        ctx: &CallContext,
        recipient: Address,
        counterpart_in: Amount,
    ) -> Result<Amount, ExchangeError> {
        self.ensure_running()?;
        let token_reserve = token.balance_of(&self.pair);
        let counterpart_reserve = self.state.lock().counterpart_reserve;
        let out = amount_out(counterpart_in, counterpart_reserve, token_reserve)?;
        let new_reserve = counterpart_reserve
            .checked_add(counterpart_in)
            .ok_or_else(|| ExchangeError::Ledger("counterpart reserve overflow".into()))?;

        token
            .transfer(&ctx.with_caller(self.pair), recipient, out)
            .map_err(|e| ExchangeError::Ledger(e.to_string()))?;

        let mut state = self.state.lock();
        state.counterpart_reserve = new_reserve;
        state.swaps += 1;
        Ok(out)
    }

    fn ensure_running(&self) -> Result<(), ExchangeError> {
        if self.state.lock().halted {
            return Err(ExchangeError::Unavailable("pool halted".into()));
        }
        Ok(())
    }

    fn deposit(
        &mut self,
        token: &mut LevyToken,
        ctx: &CallContext,
        provider: Address,
        token_desired: Amount,
        counterpart: Amount,
        lp_recipient: Address,
    ) -> Result<LiquidityAdded, ExchangeError> {
        self.ensure_running()?;
        if token_desired == 0 || counterpart == 0 {
            return Err(ExchangeError::ZeroAmount);
        }

        let token_reserve = token.balance_of(&self.pair);
        let (counterpart_reserve, lp_supply) = {
            let state = self.state.lock();
            (state.counterpart_reserve, state.lp_supply)
        };

        let (token_used, counterpart_used, minted, locked) = if lp_supply == 0 {
            let root = sqrt_of_product(token_desired, counterpart);
            let minted = root
                .checked_sub(MINIMUM_LIQUIDITY)
                .filter(|m| *m > 0)
                .ok_or(ExchangeError::InsufficientLiquidity {
                    reserve: root,
                    requested: MINIMUM_LIQUIDITY,
                })?;
            (token_desired, counterpart, minted, MINIMUM_LIQUIDITY)
        } else {
            if token_reserve == 0 || counterpart_reserve == 0 {
                return Err(ExchangeError::NoRoute);
            }
            let token_optimal = mul_div(counterpart, token_reserve, counterpart_reserve)
                .ok_or_else(|| ExchangeError::Ledger("quote overflow".into()))?;
            let (token_used, counterpart_used) = if token_optimal <= token_desired {
                (token_optimal, counterpart)
            } else {
                let counterpart_optimal = mul_div(token_desired, counterpart_reserve, token_reserve)
                    .ok_or_else(|| ExchangeError::Ledger("quote overflow".into()))?;
                (token_desired, counterpart_optimal)
            };
            let by_token = mul_div(token_used, lp_supply, token_reserve);
            let by_counterpart = mul_div(counterpart_used, lp_supply, counterpart_reserve);
            let minted = by_token
                .zip(by_counterpart)
                .map(|(a, b)| a.min(b))
                .filter(|m| *m > 0)
                .ok_or(ExchangeError::InsufficientLiquidity {
                    reserve: lp_supply,
                    requested: token_used,
                })?;
            (token_used, counterpart_used, minted, 0)
        };

        let overflow = || ExchangeError::Ledger("pool accounting overflow".into());
        let new_reserve = counterpart_reserve
            .checked_add(counterpart_used)
            .ok_or_else(overflow)?;
        let new_supply = lp_supply
            .checked_add(minted)
            .and_then(|s| s.checked_add(locked))
            .ok_or_else(overflow)?;

        let refund = counterpart - counterpart_used;
        let refunds_ledger = refund > 0 && provider == token.ledger_account();
        if refunds_ledger {
            ensure_payable(token, refund)?;
        }

        token
            .transfer_from(&ctx.with_caller(self.router), provider, self.pair, token_used)
            .map_err(|e| ExchangeError::Ledger(e.to_string()))?;

        if refunds_ledger {
            token
                .receive_counterpart(refund)
                .map_err(|e| ExchangeError::Ledger(e.to_string()))?;
        }

        let mut state = self.state.lock();
        state.counterpart_reserve = new_reserve;
        state.lp_supply = new_supply;
        if locked > 0 {
            *state.lp_balances.entry(Address::ZERO).or_default() += locked;
        }
        *state.lp_balances.entry(lp_recipient).or_default() += minted;

        tracing::debug!(
            pair = %self.pair,
            token_used,
            counterpart_used,
            minted,
            "liquidity added"
        );
        Ok(LiquidityAdded {
            token_amount: token_used,
            counterpart_amount: counterpart_used,
            liquidity_minted: minted,
        })
    }
}

impl Exchange for ConstantProductExchange {
    fn router(&self) -> Address {
        self.router
    }

    fn swap_tokens_for_counterpart(
        &mut self,
        token: &mut LevyToken,
        ctx: &CallContext,
        amount_in: Amount,
    ) -> Result<(), ExchangeError> {
        self.ensure_running()?;
        let token_reserve = token.balance_of(&self.pair);
        let counterpart_reserve = self.state.lock().counterpart_reserve;
        let out = amount_out(amount_in, token_reserve, counterpart_reserve)?;
        ensure_payable(token, out)?;

        let seller = ctx.caller;
        token
            .transfer_from(&ctx.with_caller(self.router), seller, self.pair, amount_in)
            .map_err(|e| ExchangeError::Ledger(e.to_string()))?;
        token
            .receive_counterpart(out)
            .map_err(|e| ExchangeError::Ledger(e.to_string()))?;

        let mut state = self.state.lock();
        state.counterpart_reserve -= out;
        state.swaps += 1;
        tracing::debug!(pair = %self.pair, amount_in, out, "swapped tokens for counterpart");
        Ok(())
    }

    fn add_liquidity(
        &mut self,
        token: &mut LevyToken,
        ctx: &CallContext,
        token_amount: Amount,
        counterpart_amount: Amount,
        lp_recipient: Address,
    ) -> Result<LiquidityAdded, ExchangeError> {
        let provider = ctx.caller;
        self.deposit(token, ctx, provider, token_amount, counterpart_amount, lp_recipient)
    }
}

/// Fails unless the ledger can take `amount` more counterpart. Checked
/// before any tokens move, so a payout can never fail halfway through.
fn ensure_payable(token: &LevyToken, amount: Amount) -> Result<(), ExchangeError> {
    token
        .counterpart_balance()
        .checked_add(amount)
        .map(|_| ())
        .ok_or_else(|| ExchangeError::Ledger("counterpart holdings overflow".into()))
}

/// Output of a constant-product swap with the input fee applied.
pub fn amount_out(
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
) -> Result<Amount, ExchangeError> {
    if amount_in == 0 {
        return Err(ExchangeError::ZeroAmount);
    }
    if reserve_in == 0 || reserve_out == 0 {
        return Err(ExchangeError::NoRoute);
    }
    let overflow = || ExchangeError::Ledger("swap quote overflow".into());
    let in_with_fee = mul_div(amount_in, BPS - SWAP_FEE_BPS, BPS).ok_or_else(overflow)?;
    let denominator = reserve_in.checked_add(in_with_fee).ok_or_else(overflow)?;
    let out = mul_div(in_with_fee, reserve_out, denominator).ok_or_else(overflow)?;
    if out == 0 || out >= reserve_out {
        return Err(ExchangeError::InsufficientLiquidity {
            reserve: reserve_out,
            requested: out,
        });
    }
    Ok(out)
}

/// `floor(a * b / d)` over a 256-bit intermediate. `None` if `d == 0` or
/// the quotient does not fit in 128 bits.
pub fn mul_div(a: u128, b: u128, d: u128) -> Option<u128> {
    let product = U256::from(a).checked_mul(U256::from(b))?;
    let quotient = product.checked_div(U256::from(d))?;
    (quotient <= U256::from(u128::MAX)).then(|| quotient.low_u128())
}

/// `floor(sqrt(a * b))`. The root of a product of two `u128` fits in 128
/// bits.
fn sqrt_of_product(a: u128, b: u128) -> u128 {
    (U256::from(a) * U256::from(b)).integer_sqrt().low_u128()
}
