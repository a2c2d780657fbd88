//! The Config Source: compiled-in defaults layered with the packaged file.
//!
//! `PolicySource::load` never fails. A missing or unreadable file yields the
//! compiled-in `PolicyDocument::default()`. Individual values that cannot be
//! parsed fall back to their default, one key at a time.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use updategate_contracts::{
    error::{GuardError, GuardResult},
    policy::{normalize_countries, PolicyDocument, Probability},
};

use crate::properties;

/// Key names in the packaged policy file.
pub mod property_keys {
    pub const FAILOVER_ENABLED: &str = "failover.enabled";
    pub const FAILOVER_PROBABILITY: &str = "failover.probability";
    pub const FAILOVER_ENDPOINT: &str = "failover.endpoint";
    pub const BLOCKED_COUNTRIES: &str = "geo.blocked.countries";
    pub const DEVICE_WHITELIST: &str = "device.whitelist";
    pub const DOMAIN_WHITELIST: &str = "domain.whitelist";
    pub const SIGNATURE_VERIFICATION: &str = "signature.verification.enabled";
    pub const INTEGRITY_VERIFICATION: &str = "md5.verification.enabled";
    pub const FORCE_HTTPS: &str = "force.https";
}

/// Loads the local `PolicyDocument` for a cycle.
#[derive(Debug, Clone, Default)]
pub struct PolicySource {
    override_file: Option<PathBuf>,
}

impl PolicySource {
    /// A source with no packaged file: always yields the compiled-in defaults.
    pub fn bundled() -> Self {
        Self::default()
    }

    /// A source that layers `path` over the compiled-in defaults.
    pub fn with_override_file(path: impl Into<PathBuf>) -> Self {
        Self {
            override_file: Some(path.into()),
        }
    }

    pub fn override_file(&self) -> Option<&Path> {
        self.override_file.as_deref()
    }

    /// Produce the cycle's local policy. Never fails.
    pub fn load(&self) -> PolicyDocument {
        match self.try_load() {
            Ok(policy) => policy,
            Err(e) => {
                warn!(error = %e, "failed to load packaged policy, using defaults");
                PolicyDocument::default()
            }
        }
    }

    /// Like `load`, but reports a file that exists in configuration and
    /// cannot be read.
    pub fn try_load(&self) -> GuardResult<PolicyDocument> {
        let Some(path) = &self.override_file else {
            debug!("no packaged policy file configured, using defaults");
            return Ok(PolicyDocument::default());
        };

        let contents = std::fs::read_to_string(path).map_err(|e| GuardError::ConfigError {
            reason: format!("failed to read policy file '{}': {}", path.display(), e),
        })?;

        let policy = policy_from_properties(&contents);
        info!(path = %path.display(), "packaged policy loaded");
        Ok(policy)
    }
}

/// Build a policy from properties text layered over the defaults.
pub fn policy_from_properties(text: &str) -> PolicyDocument {
    apply_properties(PolicyDocument::default(), &properties::parse(text))
}

/// Overlay every recognised key in `props` onto `base`.
///
/// Unknown keys are ignored. Unparsable booleans keep the base value.
pub fn apply_properties(base: PolicyDocument, props: &BTreeMap<String, String>) -> PolicyDocument {
    use property_keys as k;

    let mut policy = base;

    if let Some(v) = props.get(k::FAILOVER_ENABLED) {
        policy.failover_enabled = parse_bool(k::FAILOVER_ENABLED, v, policy.failover_enabled);
    }
    if let Some(v) = props.get(k::FAILOVER_PROBABILITY) {
        policy.failover_probability = Probability::parse_or_default(v);
    }
    if let Some(v) = props.get(k::FAILOVER_ENDPOINT) {
        if !v.is_empty() {
            policy.failover_endpoint = v.clone();
        }
    }
    if let Some(v) = props.get(k::BLOCKED_COUNTRIES) {
        policy.blocked_countries =
            normalize_countries(properties::split_list(v).iter().map(String::as_str));
    }
    if let Some(v) = props.get(k::DEVICE_WHITELIST) {
        policy.device_whitelist = properties::split_list(v).into_iter().collect();
    }
    if let Some(v) = props.get(k::DOMAIN_WHITELIST) {
        policy.domain_whitelist = properties::split_list(v);
    }
    if let Some(v) = props.get(k::SIGNATURE_VERIFICATION) {
        policy.signature_verification_enabled =
            parse_bool(k::SIGNATURE_VERIFICATION, v, policy.signature_verification_enabled);
    }
    if let Some(v) = props.get(k::INTEGRITY_VERIFICATION) {
        policy.integrity_verification_enabled =
            parse_bool(k::INTEGRITY_VERIFICATION, v, policy.integrity_verification_enabled);
    }
    if let Some(v) = props.get(k::FORCE_HTTPS) {
        policy.force_https = parse_bool(k::FORCE_HTTPS, v, policy.force_https);
    }

    policy
}

fn parse_bool(key: &str, raw: &str, fallback: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => true,
        "false" => false,
        other => {
            warn!(key, value = other, fallback, "unrecognised boolean, keeping default");
            fallback
        }
    }
}
