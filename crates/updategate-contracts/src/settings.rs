//! Settings snapshot, write batches, and the key names the downloader reads.
//!
//! The snapshot is the only thing the external downloader sees. Strategies
//! never touch it directly; they fill a `SettingsBatch` which the orchestrator
//! commits to the store in one step.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Key names written by the pipeline and read by the downloader.
pub mod keys {
    pub const SIGNATURE_VERIFICATION_ENABLED: &str = "signatureVerificationEnabled";
    pub const INTEGRITY_VERIFICATION_ENABLED: &str = "integrityVerificationEnabled";
    pub const INTEGRITY_STRICT_MODE: &str = "integrityStrictMode";
    pub const USE_FAILOVER_ENDPOINT: &str = "useFailoverEndpoint";
    pub const FAILOVER_ENDPOINT_URL: &str = "failoverEndpointUrl";
    pub const URL_WHITELIST: &str = "urlWhitelist";
    pub const FORCE_HTTPS: &str = "forceHttps";
    pub const CERTIFICATE_PINNING_ENABLED: &str = "certificatePinningEnabled";

    /// Host-set override for the remote policy URL. Never written by the
    /// pipeline.
    pub const REMOTE_POLICY_URL: &str = "remotePolicyUrl";
}

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

/// One pending mutation inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingWrite {
    Set(SettingValue),
    Remove,
}

/// An ordered set of pending writes, applied to the store as one unit.
///
/// Writing the same key twice keeps the later write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsBatch {
    writes: BTreeMap<String, SettingWrite>,
}

impl SettingsBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.writes
            .insert(key.to_string(), SettingWrite::Set(SettingValue::Bool(value)));
    }

    pub fn set_text(&mut self, key: &str, value: impl Into<String>) {
        self.writes.insert(
            key.to_string(),
            SettingWrite::Set(SettingValue::Text(value.into())),
        );
    }

    pub fn set_list(&mut self, key: &str, values: Vec<String>) {
        self.writes
            .insert(key.to_string(), SettingWrite::Set(SettingValue::List(values)));
    }

    pub fn remove(&mut self, key: &str) {
        self.writes.insert(key.to_string(), SettingWrite::Remove);
    }

    /// Move every write from `other` into this batch.
    pub fn absorb(&mut self, other: SettingsBatch) {
        self.writes.extend(other.writes);
    }

    pub fn get(&self, key: &str) -> Option<&SettingWrite> {
        self.writes.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.writes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingWrite)> {
        self.writes.iter().map(|(k, w)| (k.as_str(), w))
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// The externally readable result of the most recent commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsSnapshot {
    values: BTreeMap<String, SettingValue>,
}

impl SettingsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new snapshot with `batch` applied on top of this one.
    ///
    /// Keys the batch does not mention are carried over unchanged.
    pub fn with_batch(&self, batch: &SettingsBatch) -> Self {
        let mut values = self.values.clone();
        for (key, write) in batch.iter() {
            match write {
                SettingWrite::Set(value) => {
                    values.insert(key.to_string(), value.clone());
                }
                SettingWrite::Remove => {
                    values.remove(key);
                }
            }
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(SettingValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(SettingValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        match self.values.get(key) {
            Some(SettingValue::List(items)) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
