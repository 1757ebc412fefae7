//! # Levy Token
//!
//! The ledger object that owns every piece of durable state and runs the
//! taxed-transfer pipeline:
//!
//! ```text
//! transfer ─► validate recipient ─► compute fees ─► stage batch ─► commit
//!                                                                    │
//!          ◄── TransferReceipt ◄── maybe automate ◄── notify sink ◄──┘
//! ```
//!
//! Staging is all-or-nothing: the deflation burn and the tax, liquidity and
//! net credits are committed together or not at all. External code (the
//! staking sink, then the exchange) only runs after the commit.

use levy_protocol::config::TOKEN_DECIMALS;
use levy_protocol::crypto::Eip712Domain;
use levy_protocol::{Address, Amount, ChainId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::allowance::{AllowanceError, AllowanceTable};
use crate::config::{ConfigError, TokenConfig};
use crate::context::CallContext;
use crate::fees::{FeeError, FeeExclusions, FeeSchedule, FeeShares};
use crate::guard::{RecipientError, RecipientGuard};
use crate::ledger::{Ledger, LedgerError};
use crate::liquidity::{AutomationOutcome, Exchange, LiquiditySettings};
use crate::permit::{
    verify_permit, DomainSeparatorCache, NonceRegistry, PermitError, PermitRequest,
};
use crate::staking::StakingSink;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Every way a token operation can fail. A failed call mutates nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Allowance(#[from] AllowanceError),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Recipient(#[from] RecipientError),

    #[error(transparent)]
    Permit(#[from] PermitError),

    #[error("transfer from the zero address")]
    ZeroSender,

    #[error("caller {caller} is not the owner")]
    NotOwner { caller: Address },

    #[error("counterpart holdings overflow")]
    CounterpartOverflow,

    #[error("invalid token configuration: {0}")]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// The durable state of one deployment. Serializes to the node's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub owner: Address,
    pub ledger: Ledger,
    pub allowances: AllowanceTable,
    pub fees: FeeSchedule,
    pub exclusions: FeeExclusions,
    pub guard: RecipientGuard,
    pub liquidity_pool: Option<Address>,
    pub liquidity: LiquiditySettings,
    pub domain: DomainSeparatorCache,
    pub nonces: NonceRegistry,
    /// Counterpart asset owned by the ledger's own account.
    pub counterpart_balance: Amount,
    /// Held while an automation attempt is in flight.
    #[serde(skip)]
    pub in_automation: bool,
}

impl TokenState {
    /// Genesis state: validated config, initial mint, default exclusions.
    pub fn genesis(config: &TokenConfig) -> Result<Self, TokenError> {
        config.validate()?;

        let mut ledger = Ledger::new();
        ledger.mint(config.initial_holder, config.initial_supply)?;

        let mut exclusions = FeeExclusions::new();
        for account in config.genesis_exclusions() {
            exclusions.exclude(account);
        }

        Ok(Self {
            name: config.name.clone(),
            symbol: config.symbol.clone(),
            decimals: TOKEN_DECIMALS,
            owner: config.owner,
            ledger,
            allowances: AllowanceTable::new(),
            fees: config.fees,
            exclusions,
            guard: RecipientGuard::new(
                config.ledger_account,
                config.staking_sink,
                config.issuance_sink,
            ),
            liquidity_pool: config.liquidity_pool,
            liquidity: LiquiditySettings {
                threshold: config.liquidity_threshold,
                enabled: true,
            },
            domain: DomainSeparatorCache::new(
                config.name.clone(),
                config.version.clone(),
                config.ledger_account,
                config.chain_id,
            ),
            nonces: NonceRegistry::new(),
            counterpart_balance: 0,
            in_automation: false,
        })
    }
}

/// What a successful transfer did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
    pub shares: FeeShares,
    pub automation: AutomationOutcome,
}

// ---------------------------------------------------------------------------
// LevyToken
// ---------------------------------------------------------------------------

/// The token: durable state plus its two external capabilities.
pub struct LevyToken {
    pub(crate) state: TokenState,
    staking: Box<dyn StakingSink>,
    pub(crate) exchange: Option<Box<dyn Exchange>>,
}

impl std::fmt::Debug for LevyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevyToken")
            .field("symbol", &self.state.symbol)
            .field("total_supply", &self.state.ledger.total_supply())
            .field("staking_sink", &self.staking.address())
            .field("exchange", &self.exchange.as_ref().map(|e| e.router()))
            .finish()
    }
}

impl LevyToken {
    /// Deploys a fresh token from `config`.
    pub fn new(
        config: &TokenConfig,
        staking: Box<dyn StakingSink>,
        exchange: Option<Box<dyn Exchange>>,
    ) -> Result<Self, TokenError> {
        let state = TokenState::genesis(config)?;
        tracing::info!(
            name = %state.name,
            symbol = %state.symbol,
            supply = state.ledger.total_supply(),
            holder = %config.initial_holder,
            "token deployed"
        );
        Self::from_state(state, staking, exchange)
    }

    /// Restores a token from a snapshot.
    pub fn from_state(
        mut state: TokenState,
        staking: Box<dyn StakingSink>,
        exchange: Option<Box<dyn Exchange>>,
    ) -> Result<Self, TokenError> {
        if staking.address() != state.guard.staking_sink {
            return Err(ConfigError::StakingSinkMismatch {
                attached: staking.address(),
                configured: state.guard.staking_sink,
            }
            .into());
        }
        if !state.ledger.is_consistent() {
            return Err(ConfigError::InconsistentLedger.into());
        }
        state.in_automation = false;
        Ok(Self {
            state,
            staking,
            exchange,
        })
    }

    /// Attaches (or replaces) the exchange used by liquidity automation.
    pub fn attach_exchange(&mut self, exchange: Box<dyn Exchange>) {
        self.exchange = Some(exchange);
    }

    // -- reads -------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn symbol(&self) -> &str {
        &self.state.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.state.decimals
    }

    pub fn owner(&self) -> Address {
        self.state.owner
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.state.ledger.balance_of(account)
    }

    pub fn total_supply(&self) -> Amount {
        self.state.ledger.total_supply()
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.state.allowances.allowance(owner, spender)
    }

    /// Nonce the next permit from `owner` must carry.
    pub fn nonces(&self, owner: &Address) -> u64 {
        self.state.nonces.current(owner)
    }

    /// The ledger's own account.
    pub fn ledger_account(&self) -> Address {
        self.state.guard.ledger_account
    }

    /// Tokens awaiting liquidity automation.
    pub fn accumulator_balance(&self) -> Amount {
        self.balance_of(&self.state.guard.ledger_account)
    }

    pub fn counterpart_balance(&self) -> Amount {
        self.state.counterpart_balance
    }

    pub fn liquidity_settings(&self) -> LiquiditySettings {
        self.state.liquidity
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        self.state.fees
    }

    pub fn is_excluded_from_fees(&self, account: &Address) -> bool {
        self.state.exclusions.is_excluded(account)
    }

    pub fn recipient_guard(&self) -> RecipientGuard {
        self.state.guard
    }

    pub fn liquidity_pool(&self) -> Option<Address> {
        self.state.liquidity_pool
    }

    /// Separator a permit on `chain_id` is verified against. Pure.
    pub fn domain_separator(&self, chain_id: ChainId) -> [u8; 32] {
        self.state.domain.separator_for(chain_id)
    }

    /// Domain parameters for off-band signers on `chain_id`.
    pub fn permit_domain(&self, chain_id: ChainId) -> Eip712Domain {
        self.state.domain.domain(chain_id)
    }

    /// Chain id the cached separator was built for.
    pub fn cached_chain_id(&self) -> ChainId {
        self.state.domain.cached_chain_id()
    }

    pub fn state(&self) -> &TokenState {
        &self.state
    }

    /// `Σ balances == total_supply`.
    pub fn is_consistent(&self) -> bool {
        self.state.ledger.is_consistent()
    }

    // -- transfers ---------------------------------------------------------

    /// Moves `amount` from the caller to `to` through the fee pipeline.
    pub fn transfer(
        &mut self,
        ctx: &CallContext,
        to: Address,
        amount: Amount,
    ) -> Result<TransferReceipt, TokenError> {
        let from = ctx.caller;
        let shares = self.settle(from, to, amount)?;
        Ok(self.after_settlement(ctx, from, to, amount, shares))
    }

    /// Moves `amount` from `from` to `to` on the caller's allowance.
    ///
    /// The allowance is checked first, consumed after the ledger commit and
    /// before any external call.
    pub fn transfer_from(
        &mut self,
        ctx: &CallContext,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<TransferReceipt, TokenError> {
        let spender = ctx.caller;
        self.state.guard.validate(&to)?;
        self.state.allowances.ensure(&from, &spender, amount)?;

        let shares = self.settle(from, to, amount)?;
        self.state.allowances.spend(from, spender, amount)?;

        Ok(self.after_settlement(ctx, from, to, amount, shares))
    }

    /// Validation, fee split and the staged ledger batch. Either every
    /// balance and supply change lands or none does.
    fn settle(
        &mut self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<FeeShares, TokenError> {
        if from.is_zero() {
            return Err(TokenError::ZeroSender);
        }
        self.state.guard.validate(&to)?;

        let exempt = self.state.exclusions.is_exempt(&from, &to);
        let shares = self.state.fees.compute(amount, exempt)?;

        let staking_sink = self.state.guard.staking_sink;
        let ledger_account = self.state.guard.ledger_account;

        let mut batch = self.state.ledger.batch();
        batch.debit(from, amount)?;
        if shares.deflation > 0 {
            batch.retire(shares.deflation)?;
        }
        if shares.tax > 0 {
            batch.credit(staking_sink, shares.tax)?;
        }
        if shares.liquidity > 0 {
            batch.credit(ledger_account, shares.liquidity)?;
        }
        batch.credit(to, shares.net)?;
        batch.commit();

        Ok(shares)
    }

    /// Interactions, in order: staking notification, then automation.
    fn after_settlement(
        &mut self,
        ctx: &CallContext,
        from: Address,
        to: Address,
        amount: Amount,
        shares: FeeShares,
    ) -> TransferReceipt {
        if shares.tax > 0 {
            self.staking.increase_accumulated_reward(shares.tax);
        }
        let automation = self.maybe_automate(ctx, from);

        tracing::debug!(
            %from,
            %to,
            amount,
            net = shares.net,
            tax = shares.tax,
            liquidity = shares.liquidity,
            burned = shares.deflation,
            "transfer settled"
        );
        TransferReceipt {
            from,
            to,
            amount,
            shares,
            automation,
        }
    }

    // -- allowances --------------------------------------------------------

    pub fn approve(
        &mut self,
        ctx: &CallContext,
        spender: Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.state.allowances.approve(ctx.caller, spender, amount)?;
        Ok(())
    }

    pub fn increase_allowance(
        &mut self,
        ctx: &CallContext,
        spender: Address,
        delta: Amount,
    ) -> Result<Amount, TokenError> {
        Ok(self.state.allowances.increase(ctx.caller, spender, delta)?)
    }

    pub fn decrease_allowance(
        &mut self,
        ctx: &CallContext,
        spender: Address,
        delta: Amount,
    ) -> Result<Amount, TokenError> {
        Ok(self.state.allowances.decrease(ctx.caller, spender, delta)?)
    }

    /// Grants `request.value` to `request.spender` on the owner's signature.
    ///
    /// Every check runs before the first write; a rejected permit leaves
    /// the nonce, the allowance and the separator cache untouched.
    pub fn permit(&mut self, ctx: &CallContext, request: &PermitRequest) -> Result<(), TokenError> {
        let now = ctx.unix_time();
        let separator = self.state.domain.separator_for(ctx.chain_id);
        let nonce = self.state.nonces.current(&request.owner);

        if let Err(e) = verify_permit(request, &separator, nonce, now) {
            tracing::warn!(owner = %request.owner, nonce, error = %e, "permit rejected");
            return Err(e.into());
        }
        if request.spender.is_zero() {
            return Err(AllowanceError::ZeroSpender.into());
        }
        self.state.nonces.ensure_consumable(&request.owner, nonce)?;

        self.state.domain.refresh(ctx.chain_id);
        self.state.nonces.consume(request.owner, nonce)?;
        self.state
            .allowances
            .approve(request.owner, request.spender, request.value)?;

        tracing::debug!(
            owner = %request.owner,
            spender = %request.spender,
            value = request.value,
            nonce,
            "permit accepted"
        );
        Ok(())
    }

    // -- counterpart -------------------------------------------------------

    /// Credits counterpart holdings. The exchange's payout path.
    pub fn receive_counterpart(&mut self, amount: Amount) -> Result<Amount, TokenError> {
        let updated = self
            .state
            .counterpart_balance
            .checked_add(amount)
            .ok_or(TokenError::CounterpartOverflow)?;
        self.state.counterpart_balance = updated;
        Ok(updated)
    }

    // -- owner -------------------------------------------------------------

    pub fn set_liquidity_threshold(
        &mut self,
        ctx: &CallContext,
        threshold: Amount,
    ) -> Result<(), TokenError> {
        self.ensure_owner(ctx)?;
        tracing::info!(
            old = self.state.liquidity.threshold,
            new = threshold,
            "liquidity threshold updated"
        );
        self.state.liquidity.threshold = threshold;
        Ok(())
    }

    pub fn set_automation_enabled(
        &mut self,
        ctx: &CallContext,
        enabled: bool,
    ) -> Result<(), TokenError> {
        self.ensure_owner(ctx)?;
        tracing::info!(enabled, "liquidity automation switched");
        self.state.liquidity.enabled = enabled;
        Ok(())
    }

    /// Returns `false` if `account` was already excluded.
    pub fn exclude_from_fees(
        &mut self,
        ctx: &CallContext,
        account: Address,
    ) -> Result<bool, TokenError> {
        self.ensure_owner(ctx)?;
        Ok(self.state.exclusions.exclude(account))
    }

    /// Returns `false` if `account` was not excluded.
    pub fn include_in_fees(
        &mut self,
        ctx: &CallContext,
        account: Address,
    ) -> Result<bool, TokenError> {
        self.ensure_owner(ctx)?;
        Ok(self.state.exclusions.include(&account))
    }

    fn ensure_owner(&self, ctx: &CallContext) -> Result<(), TokenError> {
        if ctx.caller != self.state.owner {
            return Err(TokenError::NotOwner { caller: ctx.caller });
        }
        Ok(())
    }
}
