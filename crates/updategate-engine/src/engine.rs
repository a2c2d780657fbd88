//! The guard engine: one explicitly constructed instance per host.
//!
//! Each initialization cycle runs:
//!
//!   Local policy → [Remote override] → Identity → Country → Pipeline → Commit
//!
//! Only the commit is visible to readers. Everything before it either yields
//! a value or falls back to a default, so the only error a cycle can return
//! is a store that refuses the commit.

use std::sync::Arc;

use chrono::Utc;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};

use updategate_contracts::{
    cycle::{CycleId, CycleInputs, CycleOutcome, CycleReport, PolicyOrigin},
    error::{GuardError, GuardResult},
    policy::PolicyDocument,
    settings::{keys, SettingsBatch, SettingsSnapshot},
    signals::CountryCode,
};
use updategate_core::{random::ThreadRandom, traits::SettingsStore, Pipeline};
use updategate_policy::PolicySource;
use updategate_remote::RemotePolicyFetcher;
use updategate_signals::{
    GeoResolver, IdentityResolver, IpGeoLookup, LocaleRegion, MachineIdFile, ReportedCountry,
    StaticDeviceId,
};
use updategate_store::{FileSettingsStore, InMemorySettingsStore};

use crate::config::EngineConfig;

/// The collaborators a `GuardEngine` drives. Build them from an
/// `EngineConfig`, or assemble them by hand to inject test doubles.
pub struct EngineComponents {
    pub policy_source: PolicySource,
    /// `None` disables the remote override entirely.
    pub remote: Option<RemotePolicyFetcher>,
    pub identity: IdentityResolver,
    pub geo: GeoResolver,
    pub pipeline: Pipeline,
    pub store: Arc<dyn SettingsStore>,
}

impl EngineComponents {
    /// Wire the production collaborators described by `config`.
    ///
    /// Fails only if the settings file exists and cannot be read, or an HTTP
    /// client cannot be built.
    pub fn from_config(config: &EngineConfig) -> GuardResult<Self> {
        let policy_source = match &config.policy_file {
            Some(path) => PolicySource::with_override_file(path),
            None => PolicySource::bundled(),
        };

        let remote = if config.remote.enabled {
            Some(RemotePolicyFetcher::new()?)
        } else {
            None
        };

        let identity = match &config.signals.device_id {
            Some(id) => IdentityResolver::new(Box::new(StaticDeviceId(id.clone()))),
            None => IdentityResolver::new(Box::new(MachineIdFile::new(&config.signals.device_id_path))),
        };

        let locale = match &config.signals.locale {
            Some(tag) => LocaleRegion::Tag(tag.clone()),
            None => LocaleRegion::Environment,
        };
        let mut geo = GeoResolver::new(
            Box::new(ReportedCountry::sim(config.signals.sim_country.clone())),
            Box::new(ReportedCountry::network(config.signals.network_country.clone())),
            Box::new(locale),
        );
        if config.geo.ip_lookup {
            geo = geo.with_ip_lookup(IpGeoLookup::new(&config.geo.ip_lookup_url, config.geo.timeout())?);
        }

        let store: Arc<dyn SettingsStore> = match &config.store_path {
            Some(path) => Arc::new(FileSettingsStore::open(path)?),
            None => Arc::new(InMemorySettingsStore::new()),
        };

        Ok(Self {
            policy_source,
            remote,
            identity,
            geo,
            pipeline: Pipeline::standard(Box::new(ThreadRandom)),
            store,
        })
    }
}

/// Runs initialization cycles against one settings store.
///
/// ```rust,ignore
/// let engine = Arc::new(GuardEngine::from_config(EngineConfig::from_file(path)?)?);
/// engine.spawn_initialization();
/// ```
pub struct GuardEngine {
    config: EngineConfig,
    components: EngineComponents,
    cycle_guard: Mutex<()>,
}

impl GuardEngine {
    pub fn new(config: EngineConfig, components: EngineComponents) -> Self {
        Self {
            config,
            components,
            cycle_guard: Mutex::new(()),
        }
    }

    pub fn from_config(config: EngineConfig) -> GuardResult<Self> {
        let components = EngineComponents::from_config(&config)?;
        Ok(Self::new(config, components))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.components.store
    }

    /// The most recently committed settings.
    pub fn snapshot(&self) -> Arc<SettingsSnapshot> {
        self.components.store.snapshot()
    }

    /// Persist a remote policy URL that later cycles prefer over the
    /// configured one. An empty string clears the override.
    pub fn set_remote_policy_url(&self, url: &str) -> GuardResult<()> {
        let url = url.trim();
        let mut batch = SettingsBatch::new();

        if url.is_empty() {
            batch.remove(keys::REMOTE_POLICY_URL);
        } else {
            validate_remote_url(url)?;
            batch.set_text(keys::REMOTE_POLICY_URL, url);
        }

        self.components.store.commit(&batch)?;
        info!(url, "remote policy url override updated");
        Ok(())
    }

    /// The URL the next cycle would fetch, if any.
    pub fn remote_policy_url(&self) -> Option<String> {
        if !self.config.remote.enabled {
            return None;
        }
        self.snapshot()
            .get_str(keys::REMOTE_POLICY_URL)
            .map(str::to_string)
            .or_else(|| self.config.remote.url.clone())
            .filter(|url| !url.trim().is_empty())
    }

    /// Resolve the country the way a cycle would.
    pub async fn resolve_country(&self) -> CountryCode {
        if self.config.geo.ip_lookup {
            self.components.geo.resolve_country_with_network().await
        } else {
            self.components.geo.resolve_country()
        }
    }

    /// Run one initialization cycle.
    ///
    /// Returns `CycleOutcome::AlreadyRunning` without doing anything if
    /// another cycle on this engine is in flight. Returns `Err` only when the
    /// store rejects the commit; in that case readers still see the previous
    /// snapshot.
    pub async fn run_initialization_cycle(&self) -> GuardResult<CycleOutcome> {
        let Ok(_running) = self.cycle_guard.try_lock() else {
            info!("initialization cycle already in flight, skipping");
            return Ok(CycleOutcome::AlreadyRunning);
        };

        let cycle_id = CycleId::new();
        let started_at = Utc::now();
        debug!(cycle_id = %cycle_id, channel = %self.config.channel, "initialization cycle starting");

        // ── Step 1: Local policy ─────────────────────────────────────────────
        let local = self.components.policy_source.load();

        // ── Step 2: Remote override (best effort) ────────────────────────────
        let (policy, policy_origin) = match self.fetch_remote_override(&cycle_id).await {
            Some(remote) => (remote, PolicyOrigin::Remote),
            None => (local, PolicyOrigin::Local),
        };

        // ── Step 3: Signals ──────────────────────────────────────────────────
        let device_id = self.components.identity.resolve_device_id();
        let country = self.resolve_country().await;

        // ── Step 4: Pipeline and commit ──────────────────────────────────────
        let inputs = CycleInputs {
            cycle_id,
            policy,
            device_id,
            country,
        };
        let run = self.components.pipeline.run(&inputs, self.components.store.as_ref())?;

        let report = CycleReport {
            cycle_id,
            channel: self.config.channel.clone(),
            policy_origin,
            country: inputs.country,
            device_known: !inputs.device_id.is_unknown(),
            applied: run.applied,
            failed: run.failed,
            keys_written: run.batch.len(),
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            cycle_id = %cycle_id,
            origin = ?report.policy_origin,
            country = %report.country,
            failed = report.failed.len(),
            "initialization cycle complete"
        );

        Ok(CycleOutcome::Completed(report))
    }

    /// Run a cycle on a background task. Must be called inside a tokio
    /// runtime.
    pub fn spawn_initialization(self: &Arc<Self>) -> JoinHandle<GuardResult<CycleOutcome>> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = engine.run_initialization_cycle().await;
            if let Err(e) = &outcome {
                warn!(error = %e, "background initialization cycle failed");
            }
            outcome
        })
    }

    async fn fetch_remote_override(&self, cycle_id: &CycleId) -> Option<PolicyDocument> {
        let fetcher = self.components.remote.as_ref()?;
        let Some(url) = self.remote_policy_url() else {
            debug!(cycle_id = %cycle_id, "no remote policy url configured");
            return None;
        };
        fetcher.fetch_override(&url, self.config.remote.timeout()).await
    }
}

fn validate_remote_url(raw: &str) -> GuardResult<()> {
    let parsed = url::Url::parse(raw).map_err(|e| GuardError::ConfigError {
        reason: format!("invalid remote policy url '{}': {}", raw, e),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(GuardError::ConfigError {
            reason: format!("remote policy url must be http or https, got '{}'", other),
        }),
    }
}
