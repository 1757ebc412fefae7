//! # Snapshot Store
//!
//! The node keeps the whole ledger in memory and writes a JSON snapshot to
//! the data directory after every mutating call. Writes go to a temporary
//! sibling file first and are renamed into place, so a crash mid-write
//! leaves the previous snapshot intact.
//!
//! Handlers go through [`SnapshotWriter`]: they stage a snapshot while
//! holding the ledger lock, which fixes its revision, and write it from the
//! blocking pool after releasing the lock. A staged snapshot older than the
//! one already on disk is dropped.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use levy_contracts::exchange::PoolState;
use levy_contracts::staking::RewardPoolState;
use levy_contracts::TokenState;
use levy_protocol::ChainId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_FILE: &str = "ledger.json";

/// Everything needed to resume a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Chain id the node currently reports to the ledger.
    pub chain_id: ChainId,
    pub token: TokenState,
    pub pool: PoolState,
    pub rewards: RewardPoolState,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store backed by `ledger.json` inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SNAPSHOT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot, or `None` on a fresh data directory.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read(&self.path)
            .with_context(|| format!("failed to read snapshot {}", self.path.display()))?;
        let snapshot = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse snapshot {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let raw = serde_json::to_vec_pretty(snapshot).context("failed to encode snapshot")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)
            .with_context(|| format!("failed to write snapshot {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to move snapshot into {}", self.path.display()))?;
        tracing::trace!(path = %self.path.display(), "snapshot written");
        Ok(())
    }
}

/// A snapshot taken under the ledger lock, tagged with its revision.
#[derive(Debug)]
pub struct StagedSnapshot {
    revision: u64,
    snapshot: Snapshot,
}

/// Orders snapshot writes coming from concurrent handlers.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    store: SnapshotStore,
    staged: Arc<AtomicU64>,
    written: Arc<Mutex<u64>>,
}

impl SnapshotWriter {
    pub fn new(store: SnapshotStore) -> Self {
        Self {
            store,
            staged: Arc::new(AtomicU64::new(0)),
            written: Arc::new(Mutex::new(0)),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Tags `snapshot` with the next revision. Call with the ledger lock
    /// held so revisions follow mutation order.
    pub fn stage(&self, snapshot: Snapshot) -> StagedSnapshot {
        let revision = self.staged.fetch_add(1, Ordering::SeqCst) + 1;
        StagedSnapshot { revision, snapshot }
    }

    /// Writes `staged` on the blocking pool. Returns `false` when a later
    /// revision already reached the disk and this one was dropped.
    pub async fn write(&self, staged: StagedSnapshot) -> Result<bool> {
        let store = self.store.clone();
        let written = Arc::clone(&self.written);
        tokio::task::spawn_blocking(move || {
            let mut last = written.lock();
            if staged.revision <= *last {
                return Ok(false);
            }
            store.save(&staged.snapshot)?;
            *last = staged.revision;
            Ok(true)
        })
        .await
        .context("snapshot writer task failed")?
    }
}
