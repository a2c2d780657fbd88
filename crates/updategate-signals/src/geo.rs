//! The Geo Resolver: a prioritized chain of local country signals.
//!
//! Priority is fixed: SIM, then network operator, then locale. The first
//! source that yields two ASCII letters wins. An exhausted chain yields the
//! undetermined code, which callers treat as "allow".
//!
//! Nothing is cached. Every call re-reads every source it reaches.

use tracing::{debug, info};

use updategate_contracts::{
    error::GuardResult,
    policy::PolicyDocument,
    signals::CountryCode,
};
use updategate_core::traits::CountrySignal;

use crate::ip_lookup::IpGeoLookup;

/// Return true if `code` is determined and blocked by `policy`.
pub fn is_blocked(code: &CountryCode, policy: &PolicyDocument) -> bool {
    policy.blocks(code)
}

// ── Signal sources ────────────────────────────────────────────────────────────

/// A country value reported by the host (SIM or network operator readings
/// come from the platform's telephony layer, not from this crate).
#[derive(Debug, Clone)]
pub struct ReportedCountry {
    name: &'static str,
    value: Option<String>,
}

impl ReportedCountry {
    pub fn sim(value: Option<String>) -> Self {
        Self { name: "sim", value }
    }

    pub fn network(value: Option<String>) -> Self {
        Self { name: "network", value }
    }
}

impl CountrySignal for ReportedCountry {
    fn name(&self) -> &'static str {
        self.name
    }

    fn raw_country(&self) -> GuardResult<Option<String>> {
        Ok(self.value.clone())
    }
}

/// Environment variables consulted for the locale, highest priority first.
const LOCALE_VARS: &[&str] = &["LC_ALL", "LC_MESSAGES", "LANG"];

/// The region part of the process locale (`en_US.UTF-8` → `US`).
#[derive(Debug, Clone)]
pub enum LocaleRegion {
    /// Read `LC_ALL`, `LC_MESSAGES`, `LANG` on every call.
    Environment,
    /// A fixed locale tag supplied by the host.
    Tag(String),
}

impl CountrySignal for LocaleRegion {
    fn name(&self) -> &'static str {
        "locale"
    }

    fn raw_country(&self) -> GuardResult<Option<String>> {
        let tag = match self {
            LocaleRegion::Tag(tag) => Some(tag.clone()),
            LocaleRegion::Environment => LOCALE_VARS
                .iter()
                .filter_map(|var| std::env::var(var).ok())
                .find(|value| !value.trim().is_empty()),
        };
        Ok(tag.as_deref().and_then(region_of_locale))
    }
}

/// Extract the region from a POSIX or BCP 47 locale tag.
///
/// `en_US.UTF-8@euro`, `en-US` and `zh_Hant_TW` all yield their region;
/// `C`, `POSIX` and bare languages yield `None`.
pub fn region_of_locale(tag: &str) -> Option<String> {
    let base = tag.split(['.', '@']).next().unwrap_or_default();
    base.split(['_', '-'])
        .skip(1)
        .find(|part| part.len() == 2 && part.bytes().all(|b| b.is_ascii_alphabetic()))
        .map(str::to_string)
}

// ── Resolver ──────────────────────────────────────────────────────────────────

/// Resolves the device's current country from local signals, with an
/// optional explicit network fallback.
pub struct GeoResolver {
    chain: Vec<Box<dyn CountrySignal>>,
    ip_lookup: Option<IpGeoLookup>,
}

impl GeoResolver {
    /// Build the standard chain: SIM, network operator, locale.
    pub fn new(
        sim: Box<dyn CountrySignal>,
        network: Box<dyn CountrySignal>,
        locale: Box<dyn CountrySignal>,
    ) -> Self {
        Self {
            chain: vec![sim, network, locale],
            ip_lookup: None,
        }
    }

    /// A resolver with no local sources; yields undetermined unless an IP
    /// lookup is attached and invoked.
    pub fn empty() -> Self {
        Self {
            chain: Vec::new(),
            ip_lookup: None,
        }
    }

    /// Attach the network fallback used by `resolve_country_with_network`.
    pub fn with_ip_lookup(mut self, lookup: IpGeoLookup) -> Self {
        self.ip_lookup = Some(lookup);
        self
    }

    /// Walk the local chain and return the first valid code.
    pub fn resolve_country(&self) -> CountryCode {
        for signal in &self.chain {
            let raw = match signal.raw_country() {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    debug!(source = signal.name(), "no country from source");
                    continue;
                }
                Err(e) => {
                    debug!(source = signal.name(), error = %e, "country source unavailable");
                    continue;
                }
            };

            match CountryCode::parse(&raw) {
                Some(code) => {
                    info!(source = signal.name(), country = %code, "country detected");
                    return code;
                }
                None => debug!(source = signal.name(), raw = %raw, "rejected malformed country"),
            }
        }

        debug!("no local country signal, leaving country undetermined");
        CountryCode::undetermined()
    }

    /// Walk the local chain, then fall back to the IP lookup if one is
    /// attached. Performs a network round trip when the local chain fails.
    pub async fn resolve_country_with_network(&self) -> CountryCode {
        let local = self.resolve_country();
        if !local.is_undetermined() {
            return local;
        }

        match &self.ip_lookup {
            Some(lookup) => lookup.lookup().await,
            None => local,
        }
    }
}
