//! # Node Ledger
//!
//! Owns one token deployment together with the in-process collaborators the
//! devnet node wires into it: a reward pool as the staking sink and a
//! constant-product pool as the exchange. Both collaborators are shared
//! handles, so the node can snapshot them while the token owns their boxed
//! counterparts.

use anyhow::{anyhow, Context, Result};
use levy_contracts::exchange::ConstantProductExchange;
use levy_contracts::{CallContext, Exchange, ExchangeError, LevyToken, RewardPool};
use levy_protocol::{Address, Amount, ChainId};

use crate::config::NodeConfig;
use crate::store::Snapshot;

#[derive(Debug)]
pub struct NodeLedger {
    token: LevyToken,
    pool: ConstantProductExchange,
    rewards: RewardPool,
    chain_id: ChainId,
}

impl NodeLedger {
    /// Deploys the token and seeds the pool from the initial holder.
    pub fn genesis(config: &NodeConfig) -> Result<Self> {
        let token_config = &config.token;
        let pair = token_config
            .liquidity_pool
            .context("the node needs a liquidity_pool address to run its exchange")?;
        let rewards = RewardPool::new(token_config.staking_sink);
        let pool = ConstantProductExchange::new(token_config.router, pair);
        let token = LevyToken::new(
            token_config,
            Box::new(rewards.clone()),
            Some(Box::new(pool.clone())),
        )
        .context("token genesis failed")?;

        let mut ledger = Self {
            token,
            pool,
            rewards,
            chain_id: token_config.chain_id,
        };
        if config.pool_seed_tokens > 0 && config.pool_seed_counterpart > 0 {
            ledger.seed_pool(
                token_config.initial_holder,
                config.pool_seed_tokens,
                config.pool_seed_counterpart,
            )?;
        }
        Ok(ledger)
    }

    /// Rebuilds the ledger from a snapshot written by a previous run.
    pub fn restore(config: &NodeConfig, snapshot: Snapshot) -> Result<Self> {
        let token_config = &config.token;
        let pair = token_config
            .liquidity_pool
            .context("the node needs a liquidity_pool address to run its exchange")?;
        let rewards = RewardPool::with_state(token_config.staking_sink, snapshot.rewards);
        let pool = ConstantProductExchange::with_state(token_config.router, pair, snapshot.pool);
        let token = LevyToken::from_state(
            snapshot.token,
            Box::new(rewards.clone()),
            Some(Box::new(pool.clone())),
        )
        .context("snapshot does not describe a usable ledger")?;

        tracing::info!(
            chain_id = snapshot.chain_id,
            supply = token.total_supply(),
            "ledger restored from snapshot"
        );
        Ok(Self {
            token,
            pool,
            rewards,
            chain_id: snapshot.chain_id,
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            chain_id: self.chain_id,
            token: self.token.state().clone(),
            pool: self.pool.snapshot(),
            rewards: self.rewards.snapshot(),
        }
    }

    pub fn token(&self) -> &LevyToken {
        &self.token
    }

    pub fn token_mut(&mut self) -> &mut LevyToken {
        &mut self.token
    }

    pub fn pool(&self) -> &ConstantProductExchange {
        &self.pool
    }

    pub fn rewards(&self) -> &RewardPool {
        &self.rewards
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Moves the node to another chain id, as after a fork. The token's
    /// domain separator follows lazily on the next permit.
    pub fn set_chain_id(&mut self, chain_id: ChainId) {
        tracing::warn!(from = self.chain_id, to = chain_id, "chain id changed");
        self.chain_id = chain_id;
    }

    /// Call context for `caller` at wall-clock time on the current chain.
    pub fn context(&self, caller: Address) -> CallContext {
        CallContext::now(caller, self.chain_id)
    }

    /// Buys tokens from the pool for `recipient`.
    pub fn buy(
        &mut self,
        recipient: Address,
        counterpart_in: Amount,
    ) -> Result<Amount, ExchangeError> {
        let ctx = self.context(recipient);
        self.pool
            .buy_tokens(&mut self.token, &ctx, recipient, counterpart_in)
    }

    fn seed_pool(&mut self, provider: Address, tokens: Amount, counterpart: Amount) -> Result<()> {
        let ctx = self.context(provider);
        let router = self.pool.router();
        self.token
            .approve(&ctx, router, tokens)
            .context("failed to approve the router for the pool seed")?;
        let added = self
            .pool
            .seed(&mut self.token, &ctx, provider, tokens, counterpart)
            .map_err(|e| anyhow!("failed to seed the pool: {e}"))?;
        tracing::info!(
            pair = %self.pool.pair(),
            tokens = added.token_amount,
            counterpart = added.counterpart_amount,
            "liquidity pool seeded"
        );
        Ok(())
    }
}
