//! # Staking Redirector
//!
//! The tax share of every transfer is credited to the staking sink's ledger
//! balance, and then the sink is told how much arrived. The notification is
//! fire-and-forget: it returns nothing and cannot fail the transfer.
//!
//! The sink is called only after the ledger batch carrying its credit has
//! been committed, so by the time it runs its balance already reflects the
//! reward it is being told about.

use std::sync::Arc;

use levy_protocol::{Address, Amount};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// The external staking contract, as the ledger sees it.
pub trait StakingSink: Send {
    /// The sink's account in the ledger. Its balance receives the tax share.
    fn address(&self) -> Address;

    /// Notification that `amount` was just credited to [`address`](Self::address).
    fn increase_accumulated_reward(&mut self, amount: Amount);
}

/// Book-keeping of an in-process reward pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPoolState {
    /// Sum of every notified amount.
    pub accumulated_reward: Amount,
    /// Number of notifications received.
    pub notifications: u64,
}

/// In-process [`StakingSink`] used by the devnet node and the tests.
///
/// Cloning shares the underlying state, so the node can keep a handle for
/// snapshots while the token owns the boxed sink.
#[derive(Debug, Clone)]
pub struct RewardPool {
    address: Address,
    state: Arc<Mutex<RewardPoolState>>,
}

impl RewardPool {
    pub fn new(address: Address) -> Self {
        Self::with_state(address, RewardPoolState::default())
    }

    /// Restores a pool from a snapshot.
    pub fn with_state(address: Address, state: RewardPoolState) -> Self {
        Self {
            address,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the current book-keeping.
    pub fn snapshot(&self) -> RewardPoolState {
        self.state.lock().clone()
    }

    pub fn accumulated_reward(&self) -> Amount {
        self.state.lock().accumulated_reward
    }
}

impl StakingSink for RewardPool {
    fn address(&self) -> Address {
        self.address
    }

    fn increase_accumulated_reward(&mut self, amount: Amount) {
        let mut state = self.state.lock();
        // Saturating: the pool's own counter must never take the ledger down.
        state.accumulated_reward = state.accumulated_reward.saturating_add(amount);
        state.notifications += 1;
        tracing::trace!(
            sink = %self.address,
            amount,
            total = state.accumulated_reward,
            "staking reward accumulated"
        );
    }
}
