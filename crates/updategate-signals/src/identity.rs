//! The Identity Resolver and its device-id sources.

use std::path::PathBuf;

use tracing::{debug, warn};

use updategate_contracts::{
    error::{GuardError, GuardResult},
    signals::DeviceIdentity,
};
use updategate_core::traits::DeviceIdSource;

/// Default location of the per-install machine identifier on Linux hosts.
pub const DEFAULT_MACHINE_ID_PATH: &str = "/etc/machine-id";

/// Reads the identifier from a machine-id style file (one UUID-like line).
#[derive(Debug, Clone)]
pub struct MachineIdFile {
    path: PathBuf,
}

impl MachineIdFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for MachineIdFile {
    fn default() -> Self {
        Self::new(DEFAULT_MACHINE_ID_PATH)
    }
}

impl DeviceIdSource for MachineIdFile {
    fn name(&self) -> &'static str {
        "machine-id"
    }

    fn read(&self) -> GuardResult<String> {
        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| GuardError::SignalUnavailable {
                source_name: self.name().to_string(),
                reason: format!("cannot read '{}': {}", self.path.display(), e),
            })?;
        Ok(contents.lines().next().unwrap_or_default().to_string())
    }
}

/// A device id supplied directly by the host.
#[derive(Debug, Clone)]
pub struct StaticDeviceId(pub String);

impl DeviceIdSource for StaticDeviceId {
    fn name(&self) -> &'static str {
        "static"
    }

    fn read(&self) -> GuardResult<String> {
        Ok(self.0.clone())
    }
}

/// Resolves the per-install device identity.
///
/// Every failure collapses to the unknown identity. Callers never see an
/// error from this type.
pub struct IdentityResolver {
    source: Option<Box<dyn DeviceIdSource>>,
}

impl IdentityResolver {
    pub fn new(source: Box<dyn DeviceIdSource>) -> Self {
        Self { source: Some(source) }
    }

    /// A resolver with no source at all; always yields the unknown identity.
    pub fn unavailable() -> Self {
        Self { source: None }
    }

    pub fn resolve_device_id(&self) -> DeviceIdentity {
        let Some(source) = &self.source else {
            return DeviceIdentity::unknown();
        };

        match source.read() {
            Ok(raw) => {
                let identity = DeviceIdentity::new(raw);
                if identity.is_unknown() {
                    debug!(source = source.name(), "device id source returned an empty value");
                } else {
                    debug!(source = source.name(), device_id = identity.as_str(), "device id resolved");
                }
                identity
            }
            Err(e) => {
                warn!(source = source.name(), error = %e, "failed to read device id");
                DeviceIdentity::unknown()
            }
        }
    }
}
