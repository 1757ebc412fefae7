//! # REST API
//!
//! Builds the axum router that exposes the ledger over HTTP. All endpoints
//! share application state through axum's `State` extractor.
//!
//! This is a devnet surface: mutating endpoints take the calling account in
//! the request body and trust it. Permits are the one path that proves who
//! the owner is.
//!
//! ## Endpoints
//!
//! | Method | Path                          | Description                        |
//! |--------|-------------------------------|------------------------------------|
//! | GET    | `/health`                     | Liveness probe                     |
//! | GET    | `/status`                     | Token, pool and staking summary    |
//! | GET    | `/accounts/:address`          | Balance, permit nonce, exclusion   |
//! | GET    | `/allowances/:owner/:spender` | Current allowance                  |
//! | GET    | `/domain-separator`           | EIP-712 separator for this chain   |
//! | POST   | `/transfer`                   | Taxed transfer                     |
//! | POST   | `/transfer-from`              | Delegated taxed transfer           |
//! | POST   | `/approve`                    | Set an allowance                   |
//! | POST   | `/allowance/increase`         | Raise an allowance                 |
//! | POST   | `/allowance/decrease`         | Lower an allowance                 |
//! | POST   | `/permit`                     | Submit a signed EIP-2612 permit    |
//! | POST   | `/pool/buy`                   | Buy tokens from the devnet pool    |
//! | POST   | `/admin/threshold`            | Owner: liquidity threshold         |
//! | POST   | `/admin/automation`           | Owner: automation switch           |
//! | POST   | `/admin/fee-exclusions`       | Owner: exclude or include account  |
//! | POST   | `/admin/chain-id`             | Simulate a chain-id change         |
//!
//! Every successful mutation is followed by a snapshot write. The write
//! happens after the ledger lock is released, on the blocking pool; a
//! failed write is logged and counted but does not turn an applied mutation
//! into an error response.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use levy_contracts::fees::FeeSchedule;
use levy_contracts::{ExchangeError, PermitRequest, TokenError, TransferReceipt};
use levy_protocol::config::ONE_TOKEN;
use levy_protocol::{Address, Amount, ChainId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ledger::NodeLedger;
use crate::metrics::SharedMetrics;
use crate::store::{SnapshotWriter, StagedSnapshot};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub network: String,
    pub ledger: Arc<Mutex<NodeLedger>>,
    pub snapshots: SnapshotWriter,
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Stages a snapshot of `ledger`. Call with the ledger lock held.
    fn stage(&self, ledger: &NodeLedger) -> StagedSnapshot {
        self.snapshots.stage(ledger.snapshot())
    }

    async fn persist(&self, staged: StagedSnapshot) {
        if let Err(e) = self.snapshots.write(staged).await {
            self.metrics.snapshot_failures_total.inc();
            tracing::error!("failed to persist snapshot: {:#}", e);
        }
    }

    fn observe(&self, ledger: &NodeLedger) {
        let token = ledger.token();
        self.metrics
            .observe_balances(token.total_supply(), token.accumulator_balance());
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/allowances/:owner/:spender", get(allowance_handler))
        .route("/domain-separator", get(domain_separator_handler))
        .route("/transfer", post(transfer_handler))
        .route("/transfer-from", post(transfer_from_handler))
        .route("/approve", post(approve_handler))
        .route("/allowance/increase", post(increase_allowance_handler))
        .route("/allowance/decrease", post(decrease_allowance_handler))
        .route("/permit", post(permit_handler))
        .route("/pool/buy", post(buy_handler))
        .route("/admin/threshold", post(threshold_handler))
        .route("/admin/automation", post(automation_handler))
        .route("/admin/fee-exclusions", post(fee_exclusion_handler))
        .route("/admin/chain-id", post(chain_id_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error("invalid address: {0}")]
    BadAddress(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Token(TokenError::NotOwner { .. }) => StatusCode::FORBIDDEN,
            ApiError::Token(TokenError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Exchange(ExchangeError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadAddress(format!("{raw}: {e}")))
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub caller: Address,
    pub to: Address,
    pub amount: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferFromRequest {
    /// The spender.
    pub caller: Address,
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
}

/// Body of `/approve` and the two allowance delta endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct AllowanceRequest {
    pub caller: Address,
    pub spender: Address,
    pub amount: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BuyRequest {
    pub recipient: Address,
    pub counterpart_in: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThresholdRequest {
    pub caller: Address,
    pub threshold: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AutomationRequest {
    pub caller: Address,
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeeExclusionRequest {
    pub caller: Address,
    pub account: Address,
    pub excluded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChainIdRequest {
    pub chain_id: ChainId,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub chain_id: ChainId,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub owner: Address,
    pub total_supply: Amount,
    pub accumulator: Amount,
    pub counterpart_balance: Amount,
    pub liquidity_threshold: Amount,
    pub automation_enabled: bool,
    pub fees: FeeSchedule,
    pub pool: PoolSummary,
    pub staking_rewards: Amount,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PoolSummary {
    pub pair: Address,
    pub token_reserve: Amount,
    pub counterpart_reserve: Amount,
    pub lp_supply: Amount,
    /// LP shares held by the dead address.
    pub lp_burned: Amount,
    pub swaps: u64,
    /// Counterpart paid for selling one whole token right now, if the pool
    /// can quote it.
    pub quote_one_token: Option<Amount>,
}

/// Response payload for `GET /accounts/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    pub balance: Amount,
    /// Next permit nonce.
    pub nonce: u64,
    pub excluded_from_fees: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllowanceResponse {
    pub owner: Address,
    pub spender: Address,
    pub allowance: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PermitResponse {
    pub owner: Address,
    pub spender: Address,
    pub allowance: Amount,
    /// The owner's nonce after consumption.
    pub nonce: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DomainSeparatorResponse {
    pub chain_id: ChainId,
    /// 0x-prefixed hex.
    pub domain_separator: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BuyResponse {
    pub recipient: Address,
    pub tokens_out: Amount,
}

/// Response payload for the owner endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub liquidity_threshold: Amount,
    pub automation_enabled: bool,
}

// ---------------------------------------------------------------------------
// Read Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: 200 while the process is up.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ledger = state.ledger.lock();
    let token = ledger.token();
    let pool = ledger.pool();
    let pool_state = pool.snapshot();
    let settings = token.liquidity_settings();

    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        chain_id: ledger.chain_id(),
        name: token.name().to_string(),
        symbol: token.symbol().to_string(),
        decimals: token.decimals(),
        owner: token.owner(),
        total_supply: token.total_supply(),
        accumulator: token.accumulator_balance(),
        counterpart_balance: token.counterpart_balance(),
        liquidity_threshold: settings.threshold,
        automation_enabled: settings.enabled,
        fees: token.fee_schedule(),
        pool: PoolSummary {
            pair: pool.pair(),
            token_reserve: token.balance_of(&pool.pair()),
            counterpart_reserve: pool_state.counterpart_reserve,
            lp_supply: pool_state.lp_supply,
            lp_burned: pool.lp_balance(&Address::DEAD),
            swaps: pool_state.swaps,
            quote_one_token: pool.quote_counterpart_for_tokens(token, ONE_TOKEN).ok(),
        },
        staking_rewards: ledger.rewards().accumulated_reward(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /accounts/:address`. Unknown accounts report zeros.
async fn account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address = parse_address(&address)?;
    let ledger = state.ledger.lock();
    let token = ledger.token();
    Ok(Json(AccountResponse {
        address,
        balance: token.balance_of(&address),
        nonce: token.nonces(&address),
        excluded_from_fees: token.is_excluded_from_fees(&address),
    }))
}

async fn allowance_handler(
    Path((owner, spender)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    let owner = parse_address(&owner)?;
    let spender = parse_address(&spender)?;
    let allowance = state.ledger.lock().token().allowance(&owner, &spender);
    Ok(Json(AllowanceResponse {
        owner,
        spender,
        allowance,
    }))
}

/// `GET /domain-separator`: the separator a permit signed right now must
/// use, computed for the node's current chain id.
async fn domain_separator_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ledger = state.ledger.lock();
    let chain_id = ledger.chain_id();
    let separator = ledger.token().domain_separator(chain_id);
    Json(DomainSeparatorResponse {
        chain_id,
        domain_separator: format!("0x{}", hex::encode(separator)),
    })
}

// ---------------------------------------------------------------------------
// Transfer Handlers
// ---------------------------------------------------------------------------

/// Runs one transfer under the ledger lock, records metrics and persists.
async fn settle_transfer<F>(state: &AppState, run: F) -> Result<Json<TransferReceipt>, ApiError>
where
    F: FnOnce(&mut NodeLedger) -> Result<TransferReceipt, TokenError>,
{
    let (receipt, staged) = {
        let mut ledger = state.ledger.lock();
        let started = Instant::now();
        let result = run(&mut ledger);
        state
            .metrics
            .transfer_latency_seconds
            .observe(started.elapsed().as_secs_f64());

        let receipt = result.map_err(|e| {
            state.metrics.transfer_failures_total.inc();
            e
        })?;
        state.metrics.transfers_total.inc();
        if receipt.automation.attempted() {
            state.metrics.automation_attempts_total.inc();
        }
        if receipt.automation.failed() {
            state.metrics.automation_failures_total.inc();
        }
        state.observe(&ledger);
        (receipt, state.stage(&ledger))
    };
    state.persist(staged).await;
    Ok(Json(receipt))
}

async fn transfer_handler(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<TransferReceipt>, ApiError> {
    settle_transfer(&state, |ledger| {
        let ctx = ledger.context(req.caller);
        ledger.token_mut().transfer(&ctx, req.to, req.amount)
    })
    .await
}

async fn transfer_from_handler(
    State(state): State<AppState>,
    Json(req): Json<TransferFromRequest>,
) -> Result<Json<TransferReceipt>, ApiError> {
    settle_transfer(&state, |ledger| {
        let ctx = ledger.context(req.caller);
        ledger
            .token_mut()
            .transfer_from(&ctx, req.from, req.to, req.amount)
    })
    .await
}

// ---------------------------------------------------------------------------
// Allowance Handlers
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum AllowanceChange {
    Set,
    Increase,
    Decrease,
}

async fn change_allowance(
    state: &AppState,
    req: AllowanceRequest,
    change: AllowanceChange,
) -> Result<Json<AllowanceResponse>, ApiError> {
    let (allowance, staged) = {
        let mut ledger = state.ledger.lock();
        let ctx = ledger.context(req.caller);
        let token = ledger.token_mut();
        let allowance = match change {
            AllowanceChange::Set => {
                token.approve(&ctx, req.spender, req.amount)?;
                req.amount
            }
            AllowanceChange::Increase => token.increase_allowance(&ctx, req.spender, req.amount)?,
            AllowanceChange::Decrease => token.decrease_allowance(&ctx, req.spender, req.amount)?,
        };
        (allowance, state.stage(&ledger))
    };
    state.persist(staged).await;
    Ok(Json(AllowanceResponse {
        owner: req.caller,
        spender: req.spender,
        allowance,
    }))
}

async fn approve_handler(
    State(state): State<AppState>,
    Json(req): Json<AllowanceRequest>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    change_allowance(&state, req, AllowanceChange::Set).await
}

async fn increase_allowance_handler(
    State(state): State<AppState>,
    Json(req): Json<AllowanceRequest>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    change_allowance(&state, req, AllowanceChange::Increase).await
}

async fn decrease_allowance_handler(
    State(state): State<AppState>,
    Json(req): Json<AllowanceRequest>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    change_allowance(&state, req, AllowanceChange::Decrease).await
}

/// `POST /permit`. Anyone may relay; the signature names the owner.
async fn permit_handler(
    State(state): State<AppState>,
    Json(req): Json<PermitRequest>,
) -> Result<Json<PermitResponse>, ApiError> {
    let (response, staged) = {
        let mut ledger = state.ledger.lock();
        let ctx = ledger.context(req.spender);
        if let Err(e) = ledger.token_mut().permit(&ctx, &req) {
            state.metrics.permit_rejections_total.inc();
            return Err(e.into());
        }
        state.metrics.permits_total.inc();

        let token = ledger.token();
        let response = PermitResponse {
            owner: req.owner,
            spender: req.spender,
            allowance: token.allowance(&req.owner, &req.spender),
            nonce: token.nonces(&req.owner),
        };
        (response, state.stage(&ledger))
    };
    state.persist(staged).await;
    Ok(Json(response))
}

async fn buy_handler(
    State(state): State<AppState>,
    Json(req): Json<BuyRequest>,
) -> Result<Json<BuyResponse>, ApiError> {
    let (tokens_out, staged) = {
        let mut ledger = state.ledger.lock();
        let tokens_out = ledger.buy(req.recipient, req.counterpart_in)?;
        state.observe(&ledger);
        (tokens_out, state.stage(&ledger))
    };
    state.persist(staged).await;
    Ok(Json(BuyResponse {
        recipient: req.recipient,
        tokens_out,
    }))
}

// ---------------------------------------------------------------------------
// Owner Handlers
// ---------------------------------------------------------------------------

fn settings_of(ledger: &NodeLedger) -> SettingsResponse {
    let settings = ledger.token().liquidity_settings();
    SettingsResponse {
        liquidity_threshold: settings.threshold,
        automation_enabled: settings.enabled,
    }
}

async fn threshold_handler(
    State(state): State<AppState>,
    Json(req): Json<ThresholdRequest>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let (settings, staged) = {
        let mut ledger = state.ledger.lock();
        let ctx = ledger.context(req.caller);
        ledger
            .token_mut()
            .set_liquidity_threshold(&ctx, req.threshold)?;
        (settings_of(&ledger), state.stage(&ledger))
    };
    state.persist(staged).await;
    Ok(Json(settings))
}

async fn automation_handler(
    State(state): State<AppState>,
    Json(req): Json<AutomationRequest>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let (settings, staged) = {
        let mut ledger = state.ledger.lock();
        let ctx = ledger.context(req.caller);
        ledger
            .token_mut()
            .set_automation_enabled(&ctx, req.enabled)?;
        (settings_of(&ledger), state.stage(&ledger))
    };
    state.persist(staged).await;
    Ok(Json(settings))
}

async fn fee_exclusion_handler(
    State(state): State<AppState>,
    Json(req): Json<FeeExclusionRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let (account, staged) = {
        let mut ledger = state.ledger.lock();
        let ctx = ledger.context(req.caller);
        let token = ledger.token_mut();
        if req.excluded {
            token.exclude_from_fees(&ctx, req.account)?;
        } else {
            token.include_in_fees(&ctx, req.account)?;
        }

        let token = ledger.token();
        let account = AccountResponse {
            address: req.account,
            balance: token.balance_of(&req.account),
            nonce: token.nonces(&req.account),
            excluded_from_fees: token.is_excluded_from_fees(&req.account),
        };
        (account, state.stage(&ledger))
    };
    state.persist(staged).await;
    Ok(Json(account))
}

/// `POST /admin/chain-id`: devnet hook to rehearse a fork.
async fn chain_id_handler(
    State(state): State<AppState>,
    Json(req): Json<ChainIdRequest>,
) -> Json<DomainSeparatorResponse> {
    let (separator, staged) = {
        let mut ledger = state.ledger.lock();
        ledger.set_chain_id(req.chain_id);
        let separator = ledger.token().domain_separator(req.chain_id);
        (separator, state.stage(&ledger))
    };
    state.persist(staged).await;
    Json(DomainSeparatorResponse {
        chain_id: req.chain_id,
        domain_separator: format!("0x{}", hex::encode(separator)),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
