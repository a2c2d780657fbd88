//! Engine configuration schema.
//!
//! An `EngineConfig` is deserialized from TOML. Every field has a default, so
//! an empty document is a valid configuration: release channel, bundled
//! policy only, in-memory store, no remote override, no IP lookup.
//!
//! ```toml
//! channel = "beta"
//! policy_file = "config/hotupdate.properties"
//! store_path = "state/hotupdate_guard.json"
//!
//! [remote]
//! url = "https://config.example.com/hotupdate/policy.json"
//! timeout_secs = 5
//!
//! [geo]
//! ip_lookup = true
//!
//! [signals]
//! sim_country = "us"
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use updategate_contracts::error::{GuardError, GuardResult};
use updategate_remote::DEFAULT_REMOTE_TIMEOUT;
use updategate_signals::{
    identity::DEFAULT_MACHINE_ID_PATH,
    ip_lookup::{DEFAULT_IP_LOOKUP_TIMEOUT, DEFAULT_IP_LOOKUP_URL},
};

pub const DEFAULT_CHANNEL: &str = "release";

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Build channel reported in every cycle report.
    pub channel: String,

    /// Packaged `key=value` policy file layered over the compiled-in
    /// defaults. `None` means defaults only.
    pub policy_file: Option<PathBuf>,

    /// Where the settings snapshot is persisted. `None` keeps it in memory.
    pub store_path: Option<PathBuf>,

    pub remote: RemoteConfig,
    pub geo: GeoConfig,
    pub signals: SignalsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            policy_file: None,
            store_path: None,
            remote: RemoteConfig::default(),
            geo: GeoConfig::default(),
            signals: SignalsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `GuardError::ConfigError` if the TOML is malformed or a field
    /// has the wrong type.
    pub fn from_toml_str(s: &str) -> GuardResult<Self> {
        toml::from_str(s).map_err(|e| GuardError::ConfigError {
            reason: format!("failed to parse engine TOML: {}", e),
        })
    }

    /// Read the file at `path` and parse it as TOML.
    pub fn from_file(path: &Path) -> GuardResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| GuardError::ConfigError {
            reason: format!("failed to read engine config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}

/// `[remote]`: the best-effort policy override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Master switch. When false the persisted URL override is ignored too.
    pub enabled: bool,
    /// Fallback URL used when no override has been persisted.
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            timeout_secs: DEFAULT_REMOTE_TIMEOUT.as_secs(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[geo]`: the network fallback for country resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Query the IP geolocation endpoint when no local signal yields a country.
    pub ip_lookup: bool,
    pub ip_lookup_url: String,
    pub timeout_secs: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            ip_lookup: false,
            ip_lookup_url: DEFAULT_IP_LOOKUP_URL.to_string(),
            timeout_secs: DEFAULT_IP_LOOKUP_TIMEOUT.as_secs(),
        }
    }
}

impl GeoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[signals]`: host-reported inputs to the resolvers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    pub sim_country: Option<String>,
    pub network_country: Option<String>,
    /// Fixed locale tag. `None` reads `LC_ALL`, `LC_MESSAGES`, `LANG`.
    pub locale: Option<String>,
    /// Fixed device id. Takes precedence over `device_id_path`.
    pub device_id: Option<String>,
    pub device_id_path: PathBuf,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            sim_country: None,
            network_country: None,
            locale: None,
            device_id: None,
            device_id_path: PathBuf::from(DEFAULT_MACHINE_ID_PATH),
        }
    }
}
