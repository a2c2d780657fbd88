//! # updategate-store
//!
//! Settings stores for the update-bundle fetch gate.
//!
//! ## Overview
//!
//! Both stores implement [`SettingsStore`](updategate_core::traits::SettingsStore)
//! with the same guarantee: a reader calling `snapshot()` during a commit
//! gets either the whole previous snapshot or the whole new one.
//!
//! - [`InMemorySettingsStore`]: process-local, for tests and embedding.
//! - [`FileSettingsStore`]: a JSON file replaced by rename on each commit.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use updategate_store::FileSettingsStore;
//!
//! let store = FileSettingsStore::open("state/hotupdate_guard.json")?;
//! let use_backup = store.snapshot().get_bool(keys::USE_FAILOVER_ENDPOINT);
//! ```

pub mod file;
pub mod memory;

pub use file::{FileSettingsStore, PersistedSettings};
pub use memory::InMemorySettingsStore;

// ── Tests ─────────────────────────────────────────────────────────────────────
