//! Integration tests for the taxed-transfer pipeline.
//!
//! These tests drive the token through its public API only: genesis
//! distribution, fee splits, exemptions, delegated transfers and the
//! supply invariant across arbitrary operation sequences.

use levy_contracts::allowance::AllowanceError;
use levy_contracts::fees::FeeShares;
use levy_contracts::guard::RecipientError;
use levy_contracts::ledger::LedgerError;
use levy_contracts::{CallContext, LevyToken, RewardPool, TokenConfig, TokenError};
use levy_protocol::config::ONE_TOKEN;
use levy_protocol::{Address, Amount, ChainId};
use proptest::prelude::*;

const CHAIN: ChainId = 31_337;
const NOW: u64 = 1_700_000_000;

fn owner() -> Address {
    Address::from_tag(0x01)
}

fn alice() -> Address {
    Address::from_tag(0xa1)
}

fn bob() -> Address {
    Address::from_tag(0xb0)
}

fn carol() -> Address {
    Address::from_tag(0xca)
}

fn ctx(caller: Address) -> CallContext {
    CallContext::at(caller, CHAIN, NOW)
}

/// Deploys a token without an exchange and hands `funds` to alice.
fn deploy(funds: Amount) -> (LevyToken, RewardPool, TokenConfig) {
    let mut config = TokenConfig::devnet(owner());
    config.chain_id = CHAIN;
    let rewards = RewardPool::new(config.staking_sink);
    let mut token = LevyToken::new(&config, Box::new(rewards.clone()), None).unwrap();
    token.transfer(&ctx(owner()), alice(), funds).unwrap();
    (token, rewards, config)
}

// ---------------------------------------------------------------------------
// Fee split
// ---------------------------------------------------------------------------

#[test]
fn fee_split_is_exact_for_awkward_amounts() {
    let (mut token, rewards, config) = deploy(1_000_000);
    let supply = token.total_supply();

    // 12_345 * 20 / 1000 = 246.9, 12_345 * 10 / 1000 = 123.45
    let receipt = token.transfer(&ctx(alice()), bob(), 12_345).unwrap();
    assert_eq!(
        receipt.shares,
        FeeShares {
            tax: 246,
            liquidity: 246,
            deflation: 123,
            net: 11_730,
        }
    );
    assert_eq!(receipt.shares.gross(), 12_345);

    assert_eq!(token.balance_of(&alice()), 1_000_000 - 12_345);
    assert_eq!(token.balance_of(&bob()), 11_730);
    assert_eq!(token.balance_of(&config.staking_sink), 246);
    assert_eq!(token.accumulator_balance(), 246);
    assert_eq!(token.total_supply(), supply - 123);
    assert_eq!(rewards.accumulated_reward(), 246);
    assert!(token.is_consistent());
}

#[test]
fn tiny_transfers_round_every_share_to_zero() {
    let (mut token, rewards, _) = deploy(1_000);
    let receipt = token.transfer(&ctx(alice()), bob(), 49).unwrap();
    assert_eq!(receipt.shares.total_fees(), 0);
    assert_eq!(token.balance_of(&bob()), 49);
    // No tax, no notification.
    assert_eq!(rewards.snapshot().notifications, 0);
}

#[test]
fn excluded_recipient_exempts_the_transfer() {
    let (mut token, _, _) = deploy(10 * ONE_TOKEN);
    token.exclude_from_fees(&ctx(owner()), carol()).unwrap();

    let receipt = token.transfer(&ctx(alice()), carol(), ONE_TOKEN).unwrap();
    assert_eq!(receipt.shares, FeeShares::exempt(ONE_TOKEN));
    assert_eq!(token.balance_of(&carol()), ONE_TOKEN);

    token.include_in_fees(&ctx(owner()), carol()).unwrap();
    let receipt = token.transfer(&ctx(alice()), carol(), ONE_TOKEN).unwrap();
    assert!(receipt.shares.total_fees() > 0);
}

#[test]
fn self_transfer_still_pays_the_levy() {
    let (mut token, _, _) = deploy(1_000);
    token.transfer(&ctx(alice()), alice(), 1_000).unwrap();
    assert_eq!(token.balance_of(&alice()), 950);
    assert!(token.is_consistent());
}

// ---------------------------------------------------------------------------
// Recipient guard
// ---------------------------------------------------------------------------

#[test]
fn system_accounts_never_receive_direct_transfers() {
    let (mut token, _, config) = deploy(1_000);
    let before = token.state().clone();

    let cases = [
        (config.ledger_account, RecipientError::LedgerAccount),
        (config.staking_sink, RecipientError::StakingSink),
        (config.issuance_sink, RecipientError::IssuanceSink),
        (Address::ZERO, RecipientError::ZeroAddress),
    ];
    for (to, expected) in cases {
        for amount in [0, 1, 1_000] {
            assert_eq!(
                token.transfer(&ctx(alice()), to, amount),
                Err(TokenError::Recipient(expected))
            );
        }
    }
    assert_eq!(token.state(), &before);
}

#[test]
fn guard_applies_to_delegated_transfers() {
    let (mut token, _, config) = deploy(1_000);
    token.approve(&ctx(alice()), bob(), 1_000).unwrap();
    assert_eq!(
        token.transfer_from(&ctx(bob()), alice(), config.staking_sink, 10),
        Err(TokenError::Recipient(RecipientError::StakingSink))
    );
    assert_eq!(token.allowance(&alice(), &bob()), 1_000);
}

// ---------------------------------------------------------------------------
// Delegated transfers
// ---------------------------------------------------------------------------

#[test]
fn approve_then_partial_spend_then_overspend() {
    let (mut token, _, _) = deploy(1_000);
    token.approve(&ctx(alice()), bob(), 100).unwrap();

    token.transfer_from(&ctx(bob()), alice(), carol(), 60).unwrap();
    assert_eq!(token.allowance(&alice(), &bob()), 40);

    let err = token
        .transfer_from(&ctx(bob()), alice(), carol(), 50)
        .unwrap_err();
    assert_eq!(
        err,
        TokenError::Allowance(AllowanceError::InsufficientAllowance {
            owner: alice(),
            spender: bob(),
            allowed: 40,
            requested: 50,
        })
    );
    assert_eq!(token.allowance(&alice(), &bob()), 40);
}

#[test]
fn delegated_transfer_is_taxed_on_the_owner() {
    let (mut token, _, _) = deploy(10_000);
    token.approve(&ctx(alice()), bob(), 10_000).unwrap();
    let receipt = token
        .transfer_from(&ctx(bob()), alice(), carol(), 1_000)
        .unwrap();
    assert_eq!(receipt.from, alice());
    assert_eq!(receipt.shares.net, 950);
    assert_eq!(token.balance_of(&carol()), 950);
    assert_eq!(token.balance_of(&alice()), 9_000);
}

#[test]
fn allowance_deltas() {
    let (mut token, _, _) = deploy(0);
    assert_eq!(token.increase_allowance(&ctx(alice()), bob(), 30).unwrap(), 30);
    assert_eq!(token.decrease_allowance(&ctx(alice()), bob(), 10).unwrap(), 20);
    assert_eq!(
        token.decrease_allowance(&ctx(alice()), bob(), 21),
        Err(TokenError::Allowance(AllowanceError::BelowZero {
            current: 20,
            decrease: 21
        }))
    );
    assert_eq!(
        token.approve(&ctx(alice()), Address::ZERO, 1),
        Err(TokenError::Allowance(AllowanceError::ZeroSpender))
    );
}

#[test]
fn insufficient_balance_fails_cleanly() {
    let (mut token, rewards, _) = deploy(100);
    let before = token.state().clone();
    assert!(matches!(
        token.transfer(&ctx(alice()), bob(), 101),
        Err(TokenError::Ledger(LedgerError::InsufficientBalance { .. }))
    ));
    assert_eq!(token.state(), &before);
    assert_eq!(rewards.snapshot().notifications, 0);
}

// ---------------------------------------------------------------------------
// Supply invariant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Transfer { from: usize, to: usize, amount: Amount },
    Approve { owner: usize, spender: usize, amount: Amount },
    TransferFrom { spender: usize, from: usize, to: usize, amount: Amount },
}

fn actors() -> [Address; 4] {
    [alice(), bob(), carol(), owner()]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let idx = 0usize..4;
    let amount = 0u128..5_000_000;
    prop_oneof![
        (idx.clone(), idx.clone(), amount.clone())
            .prop_map(|(from, to, amount)| Op::Transfer { from, to, amount }),
        (idx.clone(), idx.clone(), amount.clone())
            .prop_map(|(owner, spender, amount)| Op::Approve { owner, spender, amount }),
        (idx.clone(), idx.clone(), idx, amount).prop_map(|(spender, from, to, amount)| {
            Op::TransferFrom {
                spender,
                from,
                to,
                amount,
            }
        }),
    ]
}

proptest! {
    #[test]
    fn supply_equals_sum_of_balances(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let (mut token, _, _) = deploy(10_000_000);
        token.transfer(&ctx(owner()), bob(), 10_000_000).unwrap();
        let who = actors();

        for op in ops {
            let before = token.state().clone();
            let result = match op {
                Op::Transfer { from, to, amount } => {
                    token.transfer(&ctx(who[from]), who[to], amount).map(|_| ())
                }
                Op::Approve { owner, spender, amount } => {
                    token.approve(&ctx(who[owner]), who[spender], amount)
                }
                Op::TransferFrom { spender, from, to, amount } => token
                    .transfer_from(&ctx(who[spender]), who[from], who[to], amount)
                    .map(|_| ()),
            };
            if result.is_err() {
                prop_assert_eq!(token.state(), &before);
            }
            prop_assert!(token.is_consistent());
        }
    }
}
