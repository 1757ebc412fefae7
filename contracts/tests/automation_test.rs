//! Integration tests for liquidity automation.
//!
//! A devnet token is wired to an in-process constant-product pool seeded by
//! the owner. The scenarios cover the threshold trigger, fail-soft handling
//! of both exchange calls, reentrant exchanges and the skip conditions.

use std::sync::Arc;

use levy_contracts::exchange::ConstantProductExchange;
use levy_contracts::liquidity::LiquidityAdded;
use levy_contracts::{
    AutomationOutcome, CallContext, Exchange, ExchangeError, LevyToken, RewardPool, TokenConfig,
};
use levy_protocol::config::ONE_TOKEN;
use levy_protocol::{Address, Amount, ChainId};
use parking_lot::Mutex;

const CHAIN: ChainId = 31_337;
const NOW: u64 = 1_700_000_000;

const POOL_TOKENS: Amount = 1_000_000 * ONE_TOKEN;
const POOL_COUNTERPART: Amount = 1_000 * ONE_TOKEN;
const ALICE_FUNDS: Amount = 100_000 * ONE_TOKEN;
const THRESHOLD: Amount = 100 * ONE_TOKEN;

/// Transfer size whose liquidity share (2%) is exactly 50 tokens.
const STEP: Amount = 2_500 * ONE_TOKEN;

fn owner() -> Address {
    Address::from_tag(0x01)
}

fn alice() -> Address {
    Address::from_tag(0xa1)
}

fn bob() -> Address {
    Address::from_tag(0xb0)
}

fn ctx(caller: Address) -> CallContext {
    CallContext::at(caller, CHAIN, NOW)
}

struct Fixture {
    token: LevyToken,
    pool: ConstantProductExchange,
    rewards: RewardPool,
    config: TokenConfig,
}

impl Fixture {
    /// Token plus a seeded pool, with `wrap` deciding what exchange the
    /// token actually talks to.
    fn with_exchange<F>(wrap: F) -> Self
    where
        F: FnOnce(ConstantProductExchange) -> Box<dyn Exchange>,
    {
        let mut config = TokenConfig::devnet(owner());
        config.chain_id = CHAIN;
        config.liquidity_threshold = THRESHOLD;
        let pair = config.liquidity_pool.expect("devnet has a pool");

        let rewards = RewardPool::new(config.staking_sink);
        let mut token = LevyToken::new(&config, Box::new(rewards.clone()), None).unwrap();
        let mut pool = ConstantProductExchange::new(config.router, pair);

        token
            .approve(&ctx(owner()), config.router, POOL_TOKENS)
            .unwrap();
        pool.seed(&mut token, &ctx(owner()), owner(), POOL_TOKENS, POOL_COUNTERPART)
            .unwrap();
        token.attach_exchange(wrap(pool.clone()));
        token
            .transfer(&ctx(owner()), alice(), ALICE_FUNDS)
            .unwrap();

        Self {
            token,
            pool,
            rewards,
            config,
        }
    }

    fn new() -> Self {
        Self::with_exchange(|pool| Box::new(pool) as Box<dyn Exchange>)
    }

    fn step(&mut self) -> AutomationOutcome {
        self.token
            .transfer(&ctx(alice()), bob(), STEP)
            .unwrap()
            .automation
    }

    fn pair(&self) -> Address {
        self.pool.pair()
    }

    /// The sink's ledger balance matches every reward it was told about.
    fn assert_rewards_match_sink(&self) {
        assert_eq!(
            self.rewards.accumulated_reward(),
            self.token.balance_of(&self.config.staking_sink)
        );
    }
}

// ---------------------------------------------------------------------------
// Threshold
// ---------------------------------------------------------------------------

#[test]
fn automation_fires_once_when_threshold_is_reached() {
    let mut fx = Fixture::new();
    assert_eq!(fx.token.accumulator_balance(), 0);

    assert_eq!(
        fx.step(),
        AutomationOutcome::BelowThreshold {
            accumulated: 50 * ONE_TOKEN
        }
    );

    let pair_before = fx.token.balance_of(&fx.pair());
    let outcome = fx.step();
    let AutomationOutcome::Liquified {
        swapped,
        counterpart_received,
        tokens_added,
        counterpart_added,
    } = outcome.clone()
    else {
        panic!("expected liquidity to be added, got {outcome:?}");
    };

    let keep_half = 50 * ONE_TOKEN;
    assert_eq!(swapped, 50 * ONE_TOKEN);
    assert!(counterpart_received > 0);
    assert!(tokens_added > 0 && tokens_added <= keep_half);
    assert_eq!(counterpart_added, counterpart_received);

    assert_eq!(fx.token.accumulator_balance(), keep_half - tokens_added);
    assert_eq!(fx.token.counterpart_balance(), 0);
    assert_eq!(
        fx.token.balance_of(&fx.pair()),
        pair_before + swapped + tokens_added
    );
    assert!(fx.pool.lp_balance(&Address::DEAD) > 0);
    assert_eq!(
        fx.token.allowance(&fx.config.ledger_account, &fx.config.router),
        0
    );
    assert!(fx.token.is_consistent());

    // The leftover plus one more share stays below the threshold.
    assert!(matches!(fx.step(), AutomationOutcome::BelowThreshold { .. }));
    assert_eq!(fx.pool.snapshot().swaps, 1);
}

#[test]
fn threshold_can_be_moved_by_the_owner() {
    let mut fx = Fixture::new();
    fx.token
        .set_liquidity_threshold(&ctx(owner()), 40 * ONE_TOKEN)
        .unwrap();
    assert!(matches!(fx.step(), AutomationOutcome::Liquified { .. }));
}

// ---------------------------------------------------------------------------
// Fail-soft
// ---------------------------------------------------------------------------

#[test]
fn failed_swap_leaves_accumulator_and_transfer_in_place() {
    let mut fx = Fixture::new();
    fx.pool.set_halted(true);

    fx.step();
    let bob_before = fx.token.balance_of(&bob());
    let outcome = fx.step();
    assert!(matches!(outcome, AutomationOutcome::SwapFailed { .. }));

    // The triggering transfer stands.
    assert_eq!(fx.token.balance_of(&bob()) - bob_before, STEP * 95 / 100);
    // The accumulator is untouched and no approval lingers.
    assert_eq!(fx.token.accumulator_balance(), 100 * ONE_TOKEN);
    assert_eq!(fx.token.counterpart_balance(), 0);
    assert_eq!(
        fx.token.allowance(&fx.config.ledger_account, &fx.config.router),
        0
    );
    assert!(fx.token.is_consistent());
    fx.assert_rewards_match_sink();

    // Next transfer retries and succeeds once the pool is back.
    fx.pool.set_halted(false);
    match fx.step() {
        AutomationOutcome::Liquified { swapped, .. } => assert_eq!(swapped, 75 * ONE_TOKEN),
        other => panic!("expected retry to succeed, got {other:?}"),
    }
}

/// Swaps through the real pool but refuses every contribution.
struct ContributionRefused(ConstantProductExchange);

impl Exchange for ContributionRefused {
    fn router(&self) -> Address {
        self.0.router()
    }

    fn swap_tokens_for_counterpart(
        &mut self,
        token: &mut LevyToken,
        ctx: &CallContext,
        amount_in: Amount,
    ) -> Result<(), ExchangeError> {
        self.0.swap_tokens_for_counterpart(token, ctx, amount_in)
    }

    fn add_liquidity(
        &mut self,
        _token: &mut LevyToken,
        _ctx: &CallContext,
        token_amount: Amount,
        _counterpart_amount: Amount,
        _lp_recipient: Address,
    ) -> Result<LiquidityAdded, ExchangeError> {
        Err(ExchangeError::Slippage {
            output: 0,
            minimum: token_amount,
        })
    }
}

#[test]
fn failed_contribution_keeps_the_swap() {
    let mut fx = Fixture::with_exchange(|pool| {
        Box::new(ContributionRefused(pool)) as Box<dyn Exchange>
    });
    fx.step();
    let pair_before = fx.token.balance_of(&fx.pair());

    let outcome = fx.step();
    assert!(matches!(outcome, AutomationOutcome::LiquidityFailed { .. }));

    let swapped = 50 * ONE_TOKEN;
    assert_eq!(fx.token.accumulator_balance(), 100 * ONE_TOKEN - swapped);
    assert_eq!(fx.token.balance_of(&fx.pair()), pair_before + swapped);
    assert!(fx.token.counterpart_balance() > 0);
    assert_eq!(
        fx.token.counterpart_balance(),
        POOL_COUNTERPART - fx.pool.snapshot().counterpart_reserve
    );
    assert_eq!(
        fx.token.allowance(&fx.config.ledger_account, &fx.config.router),
        0
    );
    assert!(fx.token.is_consistent());
}

// ---------------------------------------------------------------------------
// Reentrancy
// ---------------------------------------------------------------------------

/// Where a [`Reentrant`] exchange gives up.
#[derive(Clone, Copy, PartialEq, Eq)]
enum FailAt {
    Nowhere,
    Swap,
    Contribution,
}

/// Performs a taxed transfer back into the token before swapping, and
/// again before failing a contribution.
struct Reentrant {
    inner: ConstantProductExchange,
    nested: Arc<Mutex<Vec<AutomationOutcome>>>,
    fail_at: FailAt,
}

impl Reentrant {
    fn nested_transfer(
        &self,
        token: &mut LevyToken,
        ctx: &CallContext,
    ) -> Result<(), ExchangeError> {
        let receipt = token
            .transfer(&ctx.with_caller(alice()), bob(), STEP)
            .map_err(|e| ExchangeError::Ledger(e.to_string()))?;
        self.nested.lock().push(receipt.automation);
        Ok(())
    }
}

impl Exchange for Reentrant {
    fn router(&self) -> Address {
        self.inner.router()
    }

    fn swap_tokens_for_counterpart(
        &mut self,
        token: &mut LevyToken,
        ctx: &CallContext,
        amount_in: Amount,
    ) -> Result<(), ExchangeError> {
        self.nested_transfer(token, ctx)?;
        if self.fail_at == FailAt::Swap {
            return Err(ExchangeError::NoRoute);
        }
        self.inner.swap_tokens_for_counterpart(token, ctx, amount_in)
    }

    fn add_liquidity(
        &mut self,
        token: &mut LevyToken,
        ctx: &CallContext,
        token_amount: Amount,
        counterpart_amount: Amount,
        lp_recipient: Address,
    ) -> Result<LiquidityAdded, ExchangeError> {
        if self.fail_at == FailAt::Contribution {
            self.nested_transfer(token, ctx)?;
            return Err(ExchangeError::Slippage {
                output: 0,
                minimum: token_amount,
            });
        }
        self.inner
            .add_liquidity(token, ctx, token_amount, counterpart_amount, lp_recipient)
    }
}

fn reentrant_fixture(fail_at: FailAt) -> (Fixture, Arc<Mutex<Vec<AutomationOutcome>>>) {
    let nested = Arc::new(Mutex::new(Vec::new()));
    let handle = nested.clone();
    let fx = Fixture::with_exchange(move |inner| {
        Box::new(Reentrant {
            inner,
            nested: handle,
            fail_at,
        }) as Box<dyn Exchange>
    });
    (fx, nested)
}

#[test]
fn reentrant_transfer_cannot_start_a_second_attempt() {
    let (mut fx, nested) = reentrant_fixture(FailAt::Nowhere);

    fx.step();
    let outcome = fx.step();
    let AutomationOutcome::Liquified { tokens_added, .. } = outcome.clone() else {
        panic!("expected liquidity to be added, got {outcome:?}");
    };

    assert_eq!(*nested.lock(), vec![AutomationOutcome::Locked]);
    // The nested transfer's liquidity share arrived after the snapshot and
    // stays in the accumulator.
    let keep_half = 50 * ONE_TOKEN;
    assert_eq!(
        fx.token.accumulator_balance(),
        keep_half - tokens_added + 50 * ONE_TOKEN
    );
    assert_eq!(fx.pool.snapshot().swaps, 1);
    assert!(fx.token.is_consistent());
    fx.assert_rewards_match_sink();
}

#[test]
fn nested_transfer_survives_a_failed_swap() {
    let (mut fx, nested) = reentrant_fixture(FailAt::Swap);
    let net = STEP * 95 / 100;

    fx.step();
    let bob_before = fx.token.balance_of(&bob());
    let outcome = fx.step();
    assert!(matches!(outcome, AutomationOutcome::SwapFailed { .. }));
    assert_eq!(*nested.lock(), vec![AutomationOutcome::Locked]);

    // Both the triggering and the nested transfer stand.
    assert_eq!(fx.token.balance_of(&bob()), bob_before + 2 * net);
    assert_eq!(fx.token.accumulator_balance(), 150 * ONE_TOKEN);
    assert_eq!(fx.token.balance_of(&fx.config.staking_sink), 150 * ONE_TOKEN);
    fx.assert_rewards_match_sink();

    assert_eq!(fx.token.counterpart_balance(), 0);
    assert_eq!(
        fx.token.allowance(&fx.config.ledger_account, &fx.config.router),
        0
    );
    assert_eq!(fx.pool.snapshot().swaps, 0);
    assert!(fx.token.is_consistent());
}

#[test]
fn nested_transfers_survive_a_failed_contribution() {
    let (mut fx, nested) = reentrant_fixture(FailAt::Contribution);
    let net = STEP * 95 / 100;

    fx.step();
    let bob_before = fx.token.balance_of(&bob());
    let outcome = fx.step();
    assert!(matches!(outcome, AutomationOutcome::LiquidityFailed { .. }));
    assert_eq!(
        *nested.lock(),
        vec![AutomationOutcome::Locked, AutomationOutcome::Locked]
    );

    // The triggering transfer and both nested ones stand, and so does the swap.
    assert_eq!(fx.token.balance_of(&bob()), bob_before + 3 * net);
    let swapped = 50 * ONE_TOKEN;
    assert_eq!(
        fx.token.accumulator_balance(),
        100 * ONE_TOKEN - swapped + 2 * 50 * ONE_TOKEN
    );
    assert_eq!(fx.token.balance_of(&fx.config.staking_sink), 200 * ONE_TOKEN);
    fx.assert_rewards_match_sink();

    assert_eq!(
        fx.token.counterpart_balance(),
        POOL_COUNTERPART - fx.pool.snapshot().counterpart_reserve
    );
    assert!(fx.token.counterpart_balance() > 0);
    assert_eq!(
        fx.token.allowance(&fx.config.ledger_account, &fx.config.router),
        0
    );
    assert!(fx.token.is_consistent());
}

// ---------------------------------------------------------------------------
// Skips
// ---------------------------------------------------------------------------

#[test]
fn disabled_automation_only_accumulates() {
    let mut fx = Fixture::new();
    fx.token
        .set_automation_enabled(&ctx(owner()), false)
        .unwrap();
    fx.step();
    assert_eq!(fx.step(), AutomationOutcome::Disabled);
    assert_eq!(fx.token.accumulator_balance(), 100 * ONE_TOKEN);

    fx.token
        .set_automation_enabled(&ctx(owner()), true)
        .unwrap();
    assert!(matches!(fx.step(), AutomationOutcome::Liquified { .. }));
}

#[test]
fn buys_out_of_the_pool_never_trigger_automation() {
    let mut fx = Fixture::new();
    fx.token
        .set_automation_enabled(&ctx(owner()), false)
        .unwrap();
    fx.step();
    fx.step();
    fx.token
        .set_automation_enabled(&ctx(owner()), true)
        .unwrap();

    let accumulated = fx.token.accumulator_balance();
    let bob_before = fx.token.balance_of(&bob());
    let bought = fx
        .pool
        .buy_tokens(&mut fx.token, &ctx(bob()), bob(), ONE_TOKEN)
        .unwrap();

    // Pair is fee-excluded: full output, no levy, no automation.
    assert_eq!(fx.token.balance_of(&bob()), bob_before + bought);
    assert_eq!(fx.token.accumulator_balance(), accumulated);
    assert_eq!(fx.pool.snapshot().swaps, 1);
}

#[test]
fn no_exchange_is_reported() {
    let mut config = TokenConfig::devnet(owner());
    config.chain_id = CHAIN;
    config.liquidity_threshold = 1;
    let rewards = RewardPool::new(config.staking_sink);
    let mut token = LevyToken::new(&config, Box::new(rewards), None).unwrap();
    token.transfer(&ctx(owner()), alice(), 1_000).unwrap();

    let receipt = token.transfer(&ctx(alice()), bob(), 1_000).unwrap();
    assert_eq!(receipt.automation, AutomationOutcome::NoExchange);
    assert_eq!(token.accumulator_balance(), 20);
}
