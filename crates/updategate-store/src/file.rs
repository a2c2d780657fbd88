//! File-backed implementation of `SettingsStore`.
//!
//! The snapshot is persisted as one JSON document. Each commit re-reads the
//! file, applies its batch on top, writes the result to a uniquely named
//! sibling temp file, syncs it, and renames it over the live file. Another
//! process reading the file sees either the previous commit or the new one,
//! and keys written through another handle since `open` are kept. The
//! in-memory copy is only published after the rename succeeds.
//!
//! Handles in one process that share a path serialize their commits.
//! Separate processes committing at the same instant are last-writer-wins.

use std::{
    collections::HashMap,
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use updategate_contracts::{
    error::{GuardError, GuardResult},
    settings::{SettingsBatch, SettingsSnapshot},
};
use updategate_core::traits::SettingsStore;

use crate::memory::SnapshotCell;

/// On-disk layout of the settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSettings {
    pub committed_at: DateTime<Utc>,
    pub settings: SettingsSnapshot,
}

/// A settings store that survives process restarts.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    cell: SnapshotCell,
    writer: Arc<Mutex<()>>,
}

impl FileSettingsStore {
    /// Open the store at `path`, loading the last committed snapshot.
    ///
    /// A missing file starts an empty store. A corrupt file is logged and
    /// also starts empty; the next commit replaces it. Other I/O errors are
    /// returned as `StoreReadFailed`.
    pub fn open(path: impl Into<PathBuf>) -> GuardResult<Self> {
        let path = path.into();

        let cell = match read_persisted(&path)? {
            Some(persisted) => {
                info!(
                    path = %path.display(),
                    keys = persisted.settings.len(),
                    committed_at = %persisted.committed_at,
                    "settings store loaded"
                );
                SnapshotCell::with_snapshot(persisted.settings, Some(persisted.committed_at))
            }
            None => SnapshotCell::default(),
        };

        Ok(Self {
            writer: writer_lock(&path),
            path,
            cell,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        self.cell.committed_at()
    }
}

impl SettingsStore for FileSettingsStore {
    fn snapshot(&self) -> Arc<SettingsSnapshot> {
        self.cell.load()
    }

    fn commit(&self, batch: &SettingsBatch) -> GuardResult<()> {
        self.cell.commit_with(batch, |current, committed_at| {
            let _writer = self.writer.lock().map_err(|e| GuardError::StoreWriteFailed {
                reason: format!("writer lock poisoned: {}", e),
            })?;

            // Another handle may have committed since this one last looked.
            let base = match read_persisted(&self.path)? {
                Some(persisted) => persisted.settings,
                None => current.clone(),
            };
            let next = base.with_batch(batch);

            let persisted = PersistedSettings {
                committed_at,
                settings: next,
            };
            write_atomically(&self.path, &persisted)?;
            Ok(persisted.settings)
        })
    }
}

/// The process-wide commit lock for `path`.
fn writer_lock(path: &Path) -> Arc<Mutex<()>> {
    static WRITERS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut writers = match WRITERS.get_or_init(Default::default).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    writers.entry(key).or_default().clone()
}

fn read_persisted(path: &Path) -> GuardResult<Option<PersistedSettings>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(GuardError::StoreReadFailed {
                reason: format!("failed to read '{}': {}", path.display(), e),
            })
        }
    };

    match serde_json::from_str(&contents) {
        Ok(persisted) => Ok(Some(persisted)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "settings file is corrupt, ignoring its contents");
            Ok(None)
        }
    }
}

fn write_atomically(path: &Path, persisted: &PersistedSettings) -> GuardResult<()> {
    let write_failed = |what: &str, e: std::io::Error| GuardError::StoreWriteFailed {
        reason: format!("{} '{}': {}", what, path.display(), e),
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| write_failed("failed to create parent of", e))?;

    let json = serde_json::to_vec_pretty(persisted).map_err(|e| GuardError::StoreWriteFailed {
        reason: format!("failed to serialize settings: {}", e),
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| write_failed("failed to create temp file for", e))?;
    tmp.write_all(&json)
        .map_err(|e| write_failed("failed to write temp file for", e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| write_failed("failed to sync temp file for", e))?;

    tmp.persist(path)
        .map_err(|e| write_failed("failed to replace", e.error))?;
    Ok(())
}
