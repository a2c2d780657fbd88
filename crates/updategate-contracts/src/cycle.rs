//! Initialization-cycle inputs and results.
//!
//! `CycleInputs` is the immutable triple every strategy reads. `CycleReport`
//! is what the engine hands back to the host after a cycle commits.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    policy::PolicyDocument,
    signals::{CountryCode, DeviceIdentity},
};

/// Unique identifier for one initialization cycle. Appears in every log line
/// the cycle emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleId(pub uuid::Uuid);

impl CycleId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Everything the strategies are allowed to read during one cycle.
#[derive(Debug, Clone)]
pub struct CycleInputs {
    pub cycle_id: CycleId,
    pub policy: PolicyDocument,
    pub device_id: DeviceIdentity,
    pub country: CountryCode,
}

/// Where the cycle's policy document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyOrigin {
    /// Compiled-in defaults layered with the packaged properties file.
    Local,
    /// A remote JSON document that replaced the local one for this cycle.
    Remote,
}

/// Summary of a committed cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: CycleId,
    /// Build channel injected by the host (e.g. "release", "beta").
    pub channel: String,
    pub policy_origin: PolicyOrigin,
    pub country: CountryCode,
    pub device_known: bool,
    /// Strategies whose writes made it into the commit, in pipeline order.
    pub applied: Vec<String>,
    /// Strategies that failed; their keys kept their previous values.
    pub failed: Vec<String>,
    pub keys_written: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// What a call to run a cycle produced.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// The cycle ran and its batch was committed.
    Completed(CycleReport),
    /// Another cycle was already in flight; this call did nothing.
    AlreadyRunning,
}
