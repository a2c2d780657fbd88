//! The five fixed pipeline strategies.
//!
//! Each strategy owns a disjoint set of settings keys and reads nothing but
//! the cycle inputs, so their side effects do not depend on run order.

use tracing::{debug, info};

use updategate_contracts::{
    cycle::CycleInputs,
    error::GuardResult,
    settings::{keys, SettingsBatch},
};

use crate::traits::{RandomSource, Strategy};

// ── Signature verification ───────────────────────────────────────────────────

/// Mirrors the policy's signature-verification switch.
#[derive(Debug, Default)]
pub struct SignatureVerificationStrategy;

impl Strategy for SignatureVerificationStrategy {
    fn name(&self) -> &'static str {
        "signature-verification"
    }

    fn owned_keys(&self) -> &'static [&'static str] {
        &[keys::SIGNATURE_VERIFICATION_ENABLED]
    }

    fn apply(&self, inputs: &CycleInputs, out: &mut SettingsBatch) -> GuardResult<()> {
        out.set_bool(
            keys::SIGNATURE_VERIFICATION_ENABLED,
            inputs.policy.signature_verification_enabled,
        );
        Ok(())
    }
}

// ── Integrity check ──────────────────────────────────────────────────────────

/// Mirrors the integrity (digest) check switch. Strict mode is always on.
#[derive(Debug, Default)]
pub struct IntegrityCheckStrategy;

impl Strategy for IntegrityCheckStrategy {
    fn name(&self) -> &'static str {
        "integrity-check"
    }

    fn owned_keys(&self) -> &'static [&'static str] {
        &[keys::INTEGRITY_VERIFICATION_ENABLED, keys::INTEGRITY_STRICT_MODE]
    }

    fn apply(&self, inputs: &CycleInputs, out: &mut SettingsBatch) -> GuardResult<()> {
        out.set_bool(
            keys::INTEGRITY_VERIFICATION_ENABLED,
            inputs.policy.integrity_verification_enabled,
        );
        out.set_bool(keys::INTEGRITY_STRICT_MODE, true);
        Ok(())
    }
}

// ── Failover protection ──────────────────────────────────────────────────────

/// Why the failover strategy reached its decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailoverDecision {
    /// `failover_enabled` is false.
    Disabled,
    /// The device is whitelisted; geo-blocking and probability are bypassed.
    Whitelisted,
    /// The resolved country is blocked; no probabilistic selection happens.
    GeoBlocked,
    /// One uniform draw was compared against the configured probability.
    Sampled { draw: f64, selected: bool },
}

impl FailoverDecision {
    pub fn uses_failover(self) -> bool {
        match self {
            FailoverDecision::Whitelisted => true,
            FailoverDecision::Sampled { selected, .. } => selected,
            FailoverDecision::Disabled | FailoverDecision::GeoBlocked => false,
        }
    }
}

/// Decides whether the downloader should use the backup endpoint.
///
/// Evaluation short-circuits in this order:
///
/// 1. failover disabled → off
/// 2. non-empty device id on the whitelist → on
/// 3. resolved country blocked → off
/// 4. one draw `r` in `[0, 1)`; `r < probability` → on, else off
///
/// The draw is a static per-cycle coin flip that spreads load across the
/// primary and backup endpoints. It does not look at download history.
pub struct FailoverProtectionStrategy {
    random: Box<dyn RandomSource>,
}

impl FailoverProtectionStrategy {
    pub fn new(random: Box<dyn RandomSource>) -> Self {
        Self { random }
    }

    /// Evaluate the decision without writing anything.
    ///
    /// Draws from the random source only when the first three checks pass.
    pub fn decide(&self, inputs: &CycleInputs) -> FailoverDecision {
        let policy = &inputs.policy;

        if !policy.failover_enabled {
            return FailoverDecision::Disabled;
        }

        if policy.is_device_whitelisted(inputs.device_id.as_str()) {
            return FailoverDecision::Whitelisted;
        }

        if policy.blocks(&inputs.country) {
            return FailoverDecision::GeoBlocked;
        }

        let draw = self.random.next_unit();
        FailoverDecision::Sampled {
            draw,
            selected: draw < policy.failover_probability.value(),
        }
    }
}

impl Strategy for FailoverProtectionStrategy {
    fn name(&self) -> &'static str {
        "failover-protection"
    }

    fn owned_keys(&self) -> &'static [&'static str] {
        &[keys::USE_FAILOVER_ENDPOINT, keys::FAILOVER_ENDPOINT_URL]
    }

    fn apply(&self, inputs: &CycleInputs, out: &mut SettingsBatch) -> GuardResult<()> {
        let decision = self.decide(inputs);

        match decision {
            FailoverDecision::GeoBlocked => info!(
                cycle_id = %inputs.cycle_id,
                country = %inputs.country,
                "country is blocked, failover disabled"
            ),
            FailoverDecision::Whitelisted => info!(
                cycle_id = %inputs.cycle_id,
                "device is whitelisted, failover forced on"
            ),
            _ => debug!(
                cycle_id = %inputs.cycle_id,
                decision = ?decision,
                "failover decision"
            ),
        }

        if decision.uses_failover() {
            out.set_bool(keys::USE_FAILOVER_ENDPOINT, true);
            out.set_text(keys::FAILOVER_ENDPOINT_URL, inputs.policy.failover_endpoint.clone());
        } else {
            out.set_bool(keys::USE_FAILOVER_ENDPOINT, false);
            out.remove(keys::FAILOVER_ENDPOINT_URL);
        }
        Ok(())
    }
}

// ── Domain verification ──────────────────────────────────────────────────────

/// Publishes the ordered download-host whitelist. Empty means allow-all.
#[derive(Debug, Default)]
pub struct DomainVerificationStrategy;

impl Strategy for DomainVerificationStrategy {
    fn name(&self) -> &'static str {
        "domain-verification"
    }

    fn owned_keys(&self) -> &'static [&'static str] {
        &[keys::URL_WHITELIST]
    }

    fn apply(&self, inputs: &CycleInputs, out: &mut SettingsBatch) -> GuardResult<()> {
        out.set_list(keys::URL_WHITELIST, inputs.policy.domain_whitelist.clone());
        Ok(())
    }
}

// ── Transport security ───────────────────────────────────────────────────────

/// Publishes the HTTPS requirement. Certificate pinning is not implemented
/// yet and is always reported as off.
#[derive(Debug, Default)]
pub struct TransportSecurityStrategy;

impl Strategy for TransportSecurityStrategy {
    fn name(&self) -> &'static str {
        "transport-security"
    }

    fn owned_keys(&self) -> &'static [&'static str] {
        &[keys::FORCE_HTTPS, keys::CERTIFICATE_PINNING_ENABLED]
    }

    fn apply(&self, inputs: &CycleInputs, out: &mut SettingsBatch) -> GuardResult<()> {
        out.set_bool(keys::FORCE_HTTPS, inputs.policy.force_https);
        out.set_bool(keys::CERTIFICATE_PINNING_ENABLED, false);
        Ok(())
    }
}
