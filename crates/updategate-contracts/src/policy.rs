//! The policy document: every tunable gating parameter for one cycle.
//!
//! A `PolicyDocument` is built once per initialization cycle, either from the
//! packaged properties file layered over the compiled-in defaults, or from a
//! remote JSON document that replaces it wholesale. Strategies only ever read
//! it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::signals::CountryCode;

/// Backup distribution endpoint used when nothing else is configured.
pub const DEFAULT_FAILOVER_ENDPOINT: &str = "https://backup-cdn.example.com/hotupdate";

/// Probability used when the configured value is missing or unparsable.
pub const DEFAULT_FAILOVER_PROBABILITY: f64 = 0.5;

/// Countries where failover is suppressed by default.
pub const DEFAULT_BLOCKED_COUNTRIES: &[&str] = &["JP", "TW"];

/// Hosts the downloader may fetch from by default.
pub const DEFAULT_DOMAIN_WHITELIST: &[&str] = &["s3.amazonaws.com", "cloudfront.net"];

/// A failover probability, always within `[0.0, 1.0]`.
///
/// Out-of-range values are clamped; `NaN` collapses to
/// [`DEFAULT_FAILOVER_PROBABILITY`]. Deserialization goes through the same
/// clamp, so no document can carry an out-of-range value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Probability(f64);

impl Probability {
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self(DEFAULT_FAILOVER_PROBABILITY);
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Parse a textual probability, falling back to the default on garbage.
    pub fn parse_or_default(raw: &str) -> Self {
        raw.trim()
            .parse::<f64>()
            .map(Self::new)
            .unwrap_or_default()
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Probability {
    fn default() -> Self {
        Self(DEFAULT_FAILOVER_PROBABILITY)
    }
}

impl From<f64> for Probability {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Probability> for f64 {
    fn from(p: Probability) -> Self {
        p.0
    }
}

/// The full set of gating parameters for one initialization cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Master switch for the failover strategy.
    pub failover_enabled: bool,
    /// Chance that a non-whitelisted, non-blocked device is sent to the backup.
    pub failover_probability: Probability,
    /// The backup distribution endpoint.
    pub failover_endpoint: String,
    /// Uppercase ISO 3166-1 alpha-2 codes where failover is suppressed.
    pub blocked_countries: BTreeSet<String>,
    /// Device identifiers that always receive the failover endpoint.
    pub device_whitelist: BTreeSet<String>,
    /// Allowed download hosts, in the order the config author listed them.
    /// Empty means no restriction.
    pub domain_whitelist: Vec<String>,
    pub signature_verification_enabled: bool,
    pub integrity_verification_enabled: bool,
    pub force_https: bool,
}

impl PolicyDocument {
    /// Return true if `code` names a blocked country. Case-insensitive.
    ///
    /// The empty code is never blocked: an undeterminable location is an
    /// allow decision.
    pub fn is_country_blocked(&self, code: &str) -> bool {
        if code.is_empty() {
            return false;
        }
        self.blocked_countries
            .iter()
            .any(|blocked| blocked.eq_ignore_ascii_case(code))
    }

    /// Return true if the resolved `country` is determined and blocked.
    pub fn blocks(&self, country: &CountryCode) -> bool {
        !country.is_undetermined() && self.is_country_blocked(country.as_str())
    }

    /// Return true if `device_id` is a non-empty whitelist entry.
    pub fn is_device_whitelisted(&self, device_id: &str) -> bool {
        !device_id.is_empty() && self.device_whitelist.contains(device_id)
    }
}

impl Default for PolicyDocument {
    /// The compiled-in policy used whenever no other source is usable.
    fn default() -> Self {
        Self {
            failover_enabled: true,
            failover_probability: Probability::default(),
            failover_endpoint: DEFAULT_FAILOVER_ENDPOINT.to_string(),
            blocked_countries: normalize_countries(DEFAULT_BLOCKED_COUNTRIES.iter().copied()),
            device_whitelist: BTreeSet::new(),
            domain_whitelist: DEFAULT_DOMAIN_WHITELIST.iter().map(|s| s.to_string()).collect(),
            signature_verification_enabled: true,
            integrity_verification_enabled: true,
            force_https: true,
        }
    }
}

/// Trim and uppercase a list of country codes, dropping empty entries.
pub fn normalize_countries<'a>(codes: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    codes
        .into_iter()
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}
