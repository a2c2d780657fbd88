//! Trait seams of the fetch-gate engine.
//!
//! - `Strategy`:       one named pipeline stage, pure given its inputs
//! - `SettingsStore`:  the persisted map the downloader reads
//! - `RandomSource`:   uniform draws for probabilistic failover
//! - `DeviceIdSource`: raw OS-level device identifier
//! - `CountrySignal`:  one local source of geographic evidence
//!
//! The pipeline orchestrator wires strategies and the store together. Signal
//! sources are consumed by the resolvers in `updategate-signals`.

use std::sync::Arc;

use updategate_contracts::{
    cycle::CycleInputs,
    error::GuardResult,
    settings::{SettingValue, SettingsBatch, SettingsSnapshot},
};

/// One independent decision unit of the pipeline.
///
/// A strategy reads only the cycle inputs and writes only the keys it lists
/// in `owned_keys()`. The orchestrator discards its writes if it returns an
/// error, panics, or touches a key it does not own.
pub trait Strategy: Send + Sync {
    /// Stable name used in logs and cycle reports.
    fn name(&self) -> &'static str;

    /// Every key this strategy may set or remove.
    fn owned_keys(&self) -> &'static [&'static str];

    /// Compute this strategy's writes for the cycle.
    ///
    /// Must be idempotent: calling it twice with the same inputs (and the
    /// same random draws) produces the same batch.
    fn apply(&self, inputs: &CycleInputs, out: &mut SettingsBatch) -> GuardResult<()>;
}

/// The persisted settings map shared with the external downloader.
///
/// `commit` must be atomic with respect to `snapshot`: a reader sees either
/// the snapshot before the commit or the one after it, never a mix.
pub trait SettingsStore: Send + Sync {
    /// The most recently committed snapshot.
    fn snapshot(&self) -> Arc<SettingsSnapshot>;

    /// Apply `batch` on top of the current snapshot and publish the result.
    fn commit(&self, batch: &SettingsBatch) -> GuardResult<()>;

    /// Read one key from the current snapshot.
    fn get(&self, key: &str) -> Option<SettingValue> {
        self.snapshot().get(key).cloned()
    }
}

/// A source of uniform samples in `[0.0, 1.0)`.
pub trait RandomSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

/// The OS-level source behind the device identity.
pub trait DeviceIdSource: Send + Sync {
    /// Short label for logs (e.g. "machine-id").
    fn name(&self) -> &'static str;

    /// Read the raw identifier.
    fn read(&self) -> GuardResult<String>;
}

/// One local source of country evidence (SIM, network operator, locale).
pub trait CountrySignal: Send + Sync {
    /// Short label for logs (e.g. "sim").
    fn name(&self) -> &'static str;

    /// The raw value reported by this source, if any. Validation and case
    /// normalization happen in the resolver.
    fn raw_country(&self) -> GuardResult<Option<String>>;
}
