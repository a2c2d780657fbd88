//! In-memory implementation of `SettingsStore`.
//!
//! The current snapshot lives behind an `RwLock<Arc<_>>`. A commit builds the
//! next snapshot off to the side and swaps the `Arc` in one write, so readers
//! holding the lock only ever clone a complete snapshot. Commits are
//! serialized by a separate mutex so concurrent batches cannot lose updates.

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use updategate_contracts::{
    error::{GuardError, GuardResult},
    settings::{SettingsBatch, SettingsSnapshot},
};
use updategate_core::traits::SettingsStore;

// ── Snapshot cell ─────────────────────────────────────────────────────────────

/// Publish point shared by every store in this crate.
#[derive(Debug, Default)]
pub(crate) struct SnapshotCell {
    current: RwLock<Arc<SettingsSnapshot>>,
    committed_at: RwLock<Option<DateTime<Utc>>>,
    commit_lock: Mutex<()>,
}

impl SnapshotCell {
    pub(crate) fn with_snapshot(snapshot: SettingsSnapshot, committed_at: Option<DateTime<Utc>>) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            committed_at: RwLock::new(committed_at),
            commit_lock: Mutex::new(()),
        }
    }

    pub(crate) fn load(&self) -> Arc<SettingsSnapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn committed_at(&self) -> Option<DateTime<Utc>> {
        match self.committed_at.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Publish the snapshot produced by `build`, stamped with the commit time.
    ///
    /// `build` receives the currently published snapshot and returns the one
    /// to publish next. Nothing is published if it fails.
    pub(crate) fn commit_with<F>(&self, batch: &SettingsBatch, build: F) -> GuardResult<()>
    where
        F: FnOnce(&SettingsSnapshot, DateTime<Utc>) -> GuardResult<SettingsSnapshot>,
    {
        let _serialized = self.commit_lock.lock().map_err(|e| GuardError::StoreWriteFailed {
            reason: format!("commit lock poisoned: {}", e),
        })?;

        let now = Utc::now();
        let next = Arc::new(build(&self.load(), now)?);

        {
            let mut current = self.current.write().map_err(|e| GuardError::StoreWriteFailed {
                reason: format!("snapshot lock poisoned: {}", e),
            })?;
            *current = next;
        }
        if let Ok(mut at) = self.committed_at.write() {
            *at = Some(now);
        }

        debug!(writes = batch.len(), "settings snapshot published");
        Ok(())
    }
}

// ── Public store ──────────────────────────────────────────────────────────────

/// A process-local settings store. Contents do not survive a restart.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    cell: SnapshotCell,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot, e.g. one carried over from a
    /// previous process.
    pub fn with_snapshot(snapshot: SettingsSnapshot) -> Self {
        Self {
            cell: SnapshotCell::with_snapshot(snapshot, None),
        }
    }

    /// When the most recent commit was published, if any.
    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        self.cell.committed_at()
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn snapshot(&self) -> Arc<SettingsSnapshot> {
        self.cell.load()
    }

    fn commit(&self, batch: &SettingsBatch) -> GuardResult<()> {
        self.cell.commit_with(batch, |current, _| Ok(current.with_batch(batch)))
    }
}
