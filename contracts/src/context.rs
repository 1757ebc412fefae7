//! Per-call execution context: who is calling, on which chain, and when.
//!
//! The ledger never reads a clock or a chain id on its own. Every
//! state-mutating call receives them explicitly, which is what lets the
//! permit deadline be evaluated exactly once and lets tests simulate a
//! chain-id fork without touching globals.

use chrono::{DateTime, TimeZone, Utc};
use levy_protocol::{Address, ChainId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// The account invoking the operation (`msg.sender`).
    pub caller: Address,
    /// The live network identity.
    pub chain_id: ChainId,
    /// Block time of the call.
    pub timestamp: DateTime<Utc>,
}

impl CallContext {
    /// Context at wall-clock time.
    pub fn now(caller: Address, chain_id: ChainId) -> Self {
        Self {
            caller,
            chain_id,
            timestamp: Utc::now(),
        }
    }

    /// Context at a fixed unix time. Values past chrono's range clamp to its maximum.
    pub fn at(caller: Address, chain_id: ChainId, unix_secs: u64) -> Self {
        let secs = i64::try_from(unix_secs).unwrap_or(i64::MAX);
        let timestamp = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            caller,
            chain_id,
            timestamp,
        }
    }

    /// Same chain and time, different caller. Used when the ledger hands
    /// control to an external contract that acts under its own identity.
    pub fn with_caller(&self, caller: Address) -> Self {
        Self { caller, ..*self }
    }

    /// Unix seconds, clamped at zero.
    pub fn unix_time(&self) -> u64 {
        u64::try_from(self.timestamp.timestamp()).unwrap_or(0)
    }
}
