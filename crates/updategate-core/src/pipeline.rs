//! The pipeline orchestrator: runs every strategy once and commits the result.
//!
//!   Inputs → [Strategy 1 … Strategy N] → one SettingsBatch → SettingsStore::commit
//!
//! Strategies are isolated from each other. A strategy that errors, panics,
//! or writes outside its owned keys contributes nothing to the batch; the
//! remaining strategies still run and their writes are still committed. The
//! failed strategy's keys keep whatever value the store already held.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info, warn};

use updategate_contracts::{
    cycle::CycleInputs,
    error::{GuardError, GuardResult},
    settings::SettingsBatch,
};

use crate::{
    strategies::{
        DomainVerificationStrategy, FailoverProtectionStrategy, IntegrityCheckStrategy,
        SignatureVerificationStrategy, TransportSecurityStrategy,
    },
    traits::{RandomSource, SettingsStore, Strategy},
};

/// The writes produced by one pass over the strategies, before commit.
#[derive(Debug, Default)]
pub struct PipelineRun {
    /// Every accepted write, merged in pipeline order.
    pub batch: SettingsBatch,
    /// Names of strategies whose writes were accepted.
    pub applied: Vec<String>,
    /// Names of strategies whose writes were discarded.
    pub failed: Vec<String>,
}

/// An ordered list of strategies evaluated against one set of inputs.
pub struct Pipeline {
    strategies: Vec<Box<dyn Strategy>>,
}

impl Pipeline {
    /// Build a pipeline from an explicit strategy list.
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// The fixed production order: signature, integrity, failover, domain,
    /// transport.
    pub fn standard(random: Box<dyn RandomSource>) -> Self {
        Self::new(vec![
            Box::new(SignatureVerificationStrategy),
            Box::new(IntegrityCheckStrategy),
            Box::new(FailoverProtectionStrategy::new(random)),
            Box::new(DomainVerificationStrategy),
            Box::new(TransportSecurityStrategy),
        ])
    }

    /// Strategy names in evaluation order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run every strategy and collect the accepted writes. Never fails.
    pub fn evaluate(&self, inputs: &CycleInputs) -> PipelineRun {
        let mut run = PipelineRun::default();

        for strategy in &self.strategies {
            let name = strategy.name();
            match run_isolated(strategy.as_ref(), inputs) {
                Ok(writes) => {
                    debug!(
                        cycle_id = %inputs.cycle_id,
                        strategy = name,
                        writes = writes.len(),
                        "strategy applied"
                    );
                    run.batch.absorb(writes);
                    run.applied.push(name.to_string());
                }
                Err(e) => {
                    warn!(
                        cycle_id = %inputs.cycle_id,
                        strategy = name,
                        error = %e,
                        "strategy failed, its keys are left unchanged this cycle"
                    );
                    run.failed.push(name.to_string());
                }
            }
        }

        run
    }

    /// Evaluate the pipeline and commit the batch to `store` in one step.
    ///
    /// Returns `Err` only when the store rejects the commit, in which case
    /// nothing from this cycle is visible to readers.
    pub fn run(&self, inputs: &CycleInputs, store: &dyn SettingsStore) -> GuardResult<PipelineRun> {
        let run = self.evaluate(inputs);

        store.commit(&run.batch)?;

        info!(
            cycle_id = %inputs.cycle_id,
            keys = run.batch.len(),
            applied = run.applied.len(),
            failed = run.failed.len(),
            "pipeline batch committed"
        );

        Ok(run)
    }
}

/// Run one strategy into a private batch, turning panics and ownership
/// violations into errors.
fn run_isolated(strategy: &dyn Strategy, inputs: &CycleInputs) -> GuardResult<SettingsBatch> {
    let name = strategy.name();
    let mut writes = SettingsBatch::new();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| strategy.apply(inputs, &mut writes)));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            return Err(GuardError::StrategyFailed {
                strategy: name.to_string(),
                reason: e.to_string(),
            })
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panicked".to_string());
            return Err(GuardError::StrategyFailed {
                strategy: name.to_string(),
                reason,
            });
        }
    }

    let owned = strategy.owned_keys();
    if let Some(stray) = writes.keys().find(|key| !owned.contains(key)) {
        return Err(GuardError::KeyNotOwned {
            strategy: name.to_string(),
            key: stray.to_string(),
        });
    }

    Ok(writes)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use updategate_contracts::{
        cycle::CycleId,
        policy::PolicyDocument,
        settings::{keys, SettingsSnapshot},
        signals::{CountryCode, DeviceIdentity},
    };

    use super::*;
    use crate::random::SequenceRandom;

    // ── Mock components ───────────────────────────────────────────────────────

    struct MockStore {
        current: Mutex<Arc<SettingsSnapshot>>,
        commits: Mutex<usize>,
        fail: bool,
    }

    impl MockStore {
        fn new() -> Self {
            Self { current: Mutex::new(Arc::default()), commits: Mutex::new(0), fail: false }
        }

        fn failing() -> Self {
            Self { fail: true, ..Self::new() }
        }
    }

    impl SettingsStore for MockStore {
        fn snapshot(&self) -> Arc<SettingsSnapshot> {
            self.current.lock().unwrap().clone()
        }

        fn commit(&self, batch: &SettingsBatch) -> GuardResult<()> {
            if self.fail {
                return Err(GuardError::StoreWriteFailed { reason: "disk full".to_string() });
            }
            let mut current = self.current.lock().unwrap();
            *current = Arc::new(current.with_batch(batch));
            *self.commits.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// A strategy that always returns an error.
    struct ErroringStrategy;

    impl Strategy for ErroringStrategy {
        fn name(&self) -> &'static str {
            "erroring"
        }

        fn owned_keys(&self) -> &'static [&'static str] {
            &["erroringKey"]
        }

        fn apply(&self, _inputs: &CycleInputs, out: &mut SettingsBatch) -> GuardResult<()> {
            out.set_bool("erroringKey", true);
            Err(GuardError::StrategyFailed {
                strategy: "erroring".to_string(),
                reason: "upstream unavailable".to_string(),
            })
        }
    }

    /// A strategy that panics mid-write.
    struct PanickingStrategy;

    impl Strategy for PanickingStrategy {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn owned_keys(&self) -> &'static [&'static str] {
            &["panickingKey"]
        }

        fn apply(&self, _inputs: &CycleInputs, out: &mut SettingsBatch) -> GuardResult<()> {
            out.set_bool("panickingKey", true);
            panic!("strategy exploded");
        }
    }

    /// A strategy that writes a key owned by someone else.
    struct TrespassingStrategy;

    impl Strategy for TrespassingStrategy {
        fn name(&self) -> &'static str {
            "trespassing"
        }

        fn owned_keys(&self) -> &'static [&'static str] {
            &["trespassingKey"]
        }

        fn apply(&self, _inputs: &CycleInputs, out: &mut SettingsBatch) -> GuardResult<()> {
            out.set_bool("trespassingKey", true);
            out.set_bool(keys::USE_FAILOVER_ENDPOINT, true);
            Ok(())
        }
    }

    fn inputs(policy: PolicyDocument, device: &str, country: &str) -> CycleInputs {
        CycleInputs {
            cycle_id: CycleId::new(),
            policy,
            device_id: DeviceIdentity::new(device),
            country: CountryCode::parse(country).unwrap_or_default(),
        }
    }

    // ── Test cases ────────────────────────────────────────────────────────────

    #[test]
    fn test_standard_pipeline_order() {
        let pipeline = Pipeline::standard(Box::new(SequenceRandom::constant(0.0)));
        assert_eq!(
            pipeline.strategy_names(),
            vec![
                "signature-verification",
                "integrity-check",
                "failover-protection",
                "domain-verification",
                "transport-security",
            ]
        );
    }

    #[test]
    fn test_standard_strategies_own_disjoint_keys() {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(SignatureVerificationStrategy),
            Box::new(IntegrityCheckStrategy),
            Box::new(FailoverProtectionStrategy::new(Box::new(SequenceRandom::constant(0.0)))),
            Box::new(DomainVerificationStrategy),
            Box::new(TransportSecurityStrategy),
        ];

        let mut seen = std::collections::HashSet::new();
        for strategy in &strategies {
            for key in strategy.owned_keys() {
                assert!(seen.insert(*key), "key '{key}' owned by more than one strategy");
            }
        }
    }

    #[test]
    fn test_default_policy_writes_every_key() {
        let pipeline = Pipeline::standard(Box::new(SequenceRandom::constant(0.1)));
        let store = MockStore::new();

        let run = pipeline.run(&inputs(PolicyDocument::default(), "", "US"), &store).unwrap();
        let snapshot = store.snapshot();

        assert!(run.failed.is_empty());
        assert_eq!(run.applied.len(), 5);
        assert_eq!(snapshot.get_bool(keys::SIGNATURE_VERIFICATION_ENABLED), Some(true));
        assert_eq!(snapshot.get_bool(keys::INTEGRITY_VERIFICATION_ENABLED), Some(true));
        assert_eq!(snapshot.get_bool(keys::INTEGRITY_STRICT_MODE), Some(true));
        assert_eq!(snapshot.get_bool(keys::USE_FAILOVER_ENDPOINT), Some(true));
        assert_eq!(
            snapshot.get_str(keys::FAILOVER_ENDPOINT_URL),
            Some("https://backup-cdn.example.com/hotupdate")
        );
        assert_eq!(
            snapshot.get_list(keys::URL_WHITELIST).unwrap(),
            ["s3.amazonaws.com", "cloudfront.net"]
        );
        assert_eq!(snapshot.get_bool(keys::FORCE_HTTPS), Some(true));
        assert_eq!(snapshot.get_bool(keys::CERTIFICATE_PINNING_ENABLED), Some(false));
    }

    #[test]
    fn test_policy_flags_flow_through() {
        let policy = PolicyDocument {
            signature_verification_enabled: false,
            integrity_verification_enabled: false,
            force_https: false,
            domain_whitelist: vec![],
            ..PolicyDocument::default()
        };
        let pipeline = Pipeline::standard(Box::new(SequenceRandom::constant(0.9)));
        let run = pipeline.evaluate(&inputs(policy, "", ""));
        let snapshot = SettingsSnapshot::new().with_batch(&run.batch);

        assert_eq!(snapshot.get_bool(keys::SIGNATURE_VERIFICATION_ENABLED), Some(false));
        assert_eq!(snapshot.get_bool(keys::INTEGRITY_VERIFICATION_ENABLED), Some(false));
        // Strict mode does not follow the policy.
        assert_eq!(snapshot.get_bool(keys::INTEGRITY_STRICT_MODE), Some(true));
        assert_eq!(snapshot.get_bool(keys::FORCE_HTTPS), Some(false));
        assert_eq!(snapshot.get_list(keys::URL_WHITELIST).unwrap().len(), 0);
    }

    /// A failing strategy keeps its keys out of the batch and does not stop
    /// the strategies after it.
    #[test]
    fn test_erroring_strategy_is_isolated() {
        let pipeline = Pipeline::new(vec![
            Box::new(SignatureVerificationStrategy),
            Box::new(ErroringStrategy),
            Box::new(TransportSecurityStrategy),
        ]);

        let run = pipeline.evaluate(&inputs(PolicyDocument::default(), "", ""));

        assert_eq!(run.failed, vec!["erroring"]);
        assert_eq!(run.applied, vec!["signature-verification", "transport-security"]);
        assert!(run.batch.get("erroringKey").is_none());
        assert!(run.batch.get(keys::FORCE_HTTPS).is_some());
    }

    #[test]
    fn test_panicking_strategy_is_isolated() {
        let pipeline = Pipeline::new(vec![
            Box::new(PanickingStrategy),
            Box::new(DomainVerificationStrategy),
        ]);

        let run = pipeline.evaluate(&inputs(PolicyDocument::default(), "", ""));

        assert_eq!(run.failed, vec!["panicking"]);
        assert!(run.batch.get("panickingKey").is_none());
        assert!(run.batch.get(keys::URL_WHITELIST).is_some());
    }

    #[test]
    fn test_write_outside_owned_keys_is_rejected() {
        let pipeline = Pipeline::new(vec![Box::new(TrespassingStrategy)]);

        let run = pipeline.evaluate(&inputs(PolicyDocument::default(), "", ""));

        assert_eq!(run.failed, vec!["trespassing"]);
        assert!(run.batch.is_empty());
    }

    /// A failed strategy leaves the previous cycle's values in the store.
    #[test]
    fn test_failed_strategy_keeps_stale_values() {
        let store = MockStore::new();
        let mut previous = SettingsBatch::new();
        previous.set_bool("erroringKey", false);
        store.commit(&previous).unwrap();

        let pipeline = Pipeline::new(vec![Box::new(ErroringStrategy)]);
        pipeline.run(&inputs(PolicyDocument::default(), "", ""), &store).unwrap();

        assert_eq!(store.snapshot().get_bool("erroringKey"), Some(false));
    }

    #[test]
    fn test_store_failure_surfaces_as_error() {
        let pipeline = Pipeline::standard(Box::new(SequenceRandom::constant(0.0)));
        let store = MockStore::failing();

        let result = pipeline.run(&inputs(PolicyDocument::default(), "", ""), &store);

        assert!(matches!(result, Err(GuardError::StoreWriteFailed { .. })));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_one_commit_per_run() {
        let pipeline = Pipeline::standard(Box::new(SequenceRandom::constant(0.0)));
        let store = MockStore::new();

        pipeline.run(&inputs(PolicyDocument::default(), "", ""), &store).unwrap();
        pipeline.run(&inputs(PolicyDocument::default(), "", ""), &store).unwrap();

        assert_eq!(*store.commits.lock().unwrap(), 2);
    }
}
