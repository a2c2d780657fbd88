//! # updategate-engine
//!
//! Wires the fetch gate together and runs initialization cycles.
//!
//! - [`EngineConfig`]: TOML configuration (channel, policy file, store,
//!   remote override, geo fallback, host signals)
//! - [`GuardEngine`]: owns the collaborators and runs one cycle at a time
//!
//! The host constructs the engine during startup and calls
//! [`GuardEngine::spawn_initialization`] (or awaits
//! [`GuardEngine::run_initialization_cycle`]) when it chooses. There is no
//! global instance.

pub mod config;
pub mod engine;

pub use config::{EngineConfig, GeoConfig, RemoteConfig, SignalsConfig};
pub use engine::{EngineComponents, GuardEngine};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc, time::Duration};

    use tempfile::TempDir;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use updategate_contracts::{
        cycle::{CycleOutcome, CycleReport, PolicyOrigin},
        error::{GuardError, GuardResult},
        settings::{keys, SettingsBatch, SettingsSnapshot},
    };
    use updategate_core::{random::SequenceRandom, traits::SettingsStore, Pipeline};
    use updategate_policy::PolicySource;
    use updategate_remote::{RemotePolicyFetcher, DEFAULT_REMOTE_TIMEOUT};
    use updategate_signals::{
        ip_lookup::DEFAULT_IP_LOOKUP_TIMEOUT, GeoResolver, IdentityResolver, LocaleRegion,
        ReportedCountry, StaticDeviceId,
    };
    use updategate_store::{FileSettingsStore, InMemorySettingsStore};

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    const BACKUP: &str = "https://backup.example.com";

    /// Failover always on, JP blocked, whitelist supplied per test.
    fn write_policy(dir: &TempDir, enabled: bool, whitelist: &str) -> std::path::PathBuf {
        let path = dir.path().join("hotupdate.properties");
        let text = format!(
            "failover.enabled={enabled}\n\
             failover.probability=1.0\n\
             failover.endpoint={BACKUP}\n\
             geo.blocked.countries=JP\n\
             device.whitelist={whitelist}\n"
        );
        std::fs::write(&path, text).unwrap();
        path
    }

    fn components(
        policy_file: &Path,
        device: &str,
        country: &str,
        draw: f64,
        store: Arc<dyn SettingsStore>,
    ) -> EngineComponents {
        EngineComponents {
            policy_source: PolicySource::with_override_file(policy_file),
            remote: Some(RemotePolicyFetcher::new().unwrap()),
            identity: IdentityResolver::new(Box::new(StaticDeviceId(device.to_string()))),
            geo: GeoResolver::new(
                Box::new(ReportedCountry::sim(Some(country.to_string()))),
                Box::new(ReportedCountry::network(None)),
                Box::new(LocaleRegion::Tag("C".to_string())),
            ),
            pipeline: Pipeline::standard(Box::new(SequenceRandom::constant(draw))),
            store,
        }
    }

    fn config_with_remote(url: Option<String>) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.remote.url = url;
        config.remote.timeout_secs = 2;
        config
    }

    fn completed(outcome: CycleOutcome) -> CycleReport {
        match outcome {
            CycleOutcome::Completed(report) => report,
            other => panic!("expected Completed, got {:?}", other),
        }
    }

    struct RejectingStore;

    impl SettingsStore for RejectingStore {
        fn snapshot(&self) -> Arc<SettingsSnapshot> {
            Arc::new(SettingsSnapshot::new())
        }

        fn commit(&self, _batch: &SettingsBatch) -> GuardResult<()> {
            Err(GuardError::StoreWriteFailed {
                reason: "disk full".to_string(),
            })
        }
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.channel, "release");
        assert!(config.remote.enabled);
        assert_eq!(config.remote.timeout(), Duration::from_secs(5));
        assert!(!config.geo.ip_lookup);
        assert_eq!(config.geo.ip_lookup_url, "https://ipapi.co/country/");
        assert_eq!(config.geo.timeout(), Duration::from_secs(3));
        assert!(config.store_path.is_none());
    }

    #[test]
    fn test_default_timeouts_match_component_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.remote.timeout(), DEFAULT_REMOTE_TIMEOUT);
        assert_eq!(config.geo.timeout(), DEFAULT_IP_LOOKUP_TIMEOUT);
    }

    #[test]
    fn test_full_config_parses() {
        let config = EngineConfig::from_toml_str(
            r#"
            channel = "beta"
            policy_file = "config/hotupdate.properties"
            store_path = "state/guard.json"

            [remote]
            url = "https://config.example.com/policy.json"
            timeout_secs = 2

            [geo]
            ip_lookup = true

            [signals]
            sim_country = "us"
            device_id = "qa-device"
            "#,
        )
        .unwrap();

        assert_eq!(config.channel, "beta");
        assert_eq!(config.remote.url.as_deref(), Some("https://config.example.com/policy.json"));
        assert_eq!(config.remote.timeout(), Duration::from_secs(2));
        assert!(config.geo.ip_lookup);
        assert_eq!(config.geo.timeout_secs, 3);
        assert_eq!(config.signals.sim_country.as_deref(), Some("us"));
        assert_eq!(config.signals.device_id.as_deref(), Some("qa-device"));
    }

    #[test]
    fn test_sample_config_files_parse() {
        let config = EngineConfig::from_toml_str(include_str!("../../../config/updategate.toml")).unwrap();
        assert_eq!(config.channel, "release");
        assert!(config.remote.url.is_none());
        assert_eq!(config.signals, SignalsConfig::default());

        let packaged = updategate_policy::policy_from_properties(include_str!("../../../config/hotupdate.properties"));
        assert_eq!(packaged, updategate_contracts::policy::PolicyDocument::default());
    }

    #[test]
    fn test_malformed_config_is_config_error() {
        match EngineConfig::from_toml_str("[remote]\ntimeout_secs = \"soon\"") {
            Err(GuardError::ConfigError { reason }) => assert!(reason.contains("engine TOML")),
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_config_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        match EngineConfig::from_file(&dir.path().join("absent.toml")) {
            Err(GuardError::ConfigError { reason }) => assert!(reason.contains("absent.toml")),
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    // ── End-to-end cycles ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_cycle_blocked_country_without_whitelist() {
        let dir = tempfile::tempdir().unwrap();
        let policy = write_policy(&dir, true, "");
        let store = Arc::new(InMemorySettingsStore::new());
        let engine = GuardEngine::new(
            EngineConfig::default(),
            components(&policy, "dev1", "JP", 0.0, store.clone()),
        );

        let report = completed(engine.run_initialization_cycle().await.unwrap());

        assert_eq!(report.policy_origin, PolicyOrigin::Local);
        assert_eq!(report.country.as_str(), "JP");
        assert!(report.device_known);
        assert_eq!(report.applied.len(), 5);
        assert!(report.failed.is_empty());
        assert_eq!(report.channel, "release");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get_bool(keys::USE_FAILOVER_ENDPOINT), Some(false));
        assert!(!snapshot.contains_key(keys::FAILOVER_ENDPOINT_URL));
        assert_eq!(snapshot.get_bool(keys::INTEGRITY_STRICT_MODE), Some(true));
        assert_eq!(snapshot.get_bool(keys::CERTIFICATE_PINNING_ENABLED), Some(false));
    }

    #[tokio::test]
    async fn test_cycle_whitelisted_device_in_blocked_country() {
        let dir = tempfile::tempdir().unwrap();
        let policy = write_policy(&dir, true, "dev1");
        let store = Arc::new(InMemorySettingsStore::new());
        let engine = GuardEngine::new(
            EngineConfig::default(),
            components(&policy, "dev1", "JP", 0.99, store.clone()),
        );

        completed(engine.run_initialization_cycle().await.unwrap());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get_bool(keys::USE_FAILOVER_ENDPOINT), Some(true));
        assert_eq!(snapshot.get_str(keys::FAILOVER_ENDPOINT_URL), Some(BACKUP));
    }

    #[tokio::test]
    async fn test_rerun_after_completion_is_safe() {
        let dir = tempfile::tempdir().unwrap();
        let policy = write_policy(&dir, true, "dev1");
        let store = Arc::new(InMemorySettingsStore::new());
        let engine = GuardEngine::new(
            EngineConfig::default(),
            components(&policy, "dev1", "US", 0.5, store.clone()),
        );

        let first = completed(engine.run_initialization_cycle().await.unwrap());
        let after_first = store.snapshot();
        let second = completed(engine.run_initialization_cycle().await.unwrap());

        assert_ne!(first.cycle_id, second.cycle_id);
        assert_eq!(*store.snapshot(), *after_first);
    }

    #[tokio::test]
    async fn test_commit_failure_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let policy = write_policy(&dir, true, "");
        let engine = GuardEngine::new(
            EngineConfig::default(),
            components(&policy, "dev1", "US", 0.0, Arc::new(RejectingStore)),
        );

        match engine.run_initialization_cycle().await {
            Err(GuardError::StoreWriteFailed { reason }) => assert_eq!(reason, "disk full"),
            other => panic!("expected StoreWriteFailed, got {:?}", other),
        }
    }

    // ── Remote override ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_remote_failure_keeps_local_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let policy = write_policy(&dir, true, "dev1");
        let store = Arc::new(InMemorySettingsStore::new());
        let engine = GuardEngine::new(
            config_with_remote(Some(format!("{}/policy.json", server.uri()))),
            components(&policy, "dev1", "JP", 0.99, store.clone()),
        );

        let report = completed(engine.run_initialization_cycle().await.unwrap());

        assert_eq!(report.policy_origin, PolicyOrigin::Local);
        assert_eq!(store.snapshot().get_str(keys::FAILOVER_ENDPOINT_URL), Some(BACKUP));
    }

    #[tokio::test]
    async fn test_remote_success_replaces_local_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/policy.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{ "enabled": true, "endpoint": "https://mirror.example.org", "blocked_countries": [] }"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let policy = write_policy(&dir, false, "");
        let store = Arc::new(InMemorySettingsStore::new());
        // Remote probability defaults to 0.5, so a draw of 0.1 selects failover.
        let engine = GuardEngine::new(
            config_with_remote(Some(format!("{}/policy.json", server.uri()))),
            components(&policy, "dev1", "JP", 0.1, store.clone()),
        );

        let report = completed(engine.run_initialization_cycle().await.unwrap());

        assert_eq!(report.policy_origin, PolicyOrigin::Remote);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.get_bool(keys::USE_FAILOVER_ENDPOINT), Some(true));
        assert_eq!(snapshot.get_str(keys::FAILOVER_ENDPOINT_URL), Some("https://mirror.example.org"));
    }

    #[tokio::test]
    async fn test_persisted_remote_url_takes_precedence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/override.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{ "enabled": false }"#))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let policy = write_policy(&dir, true, "dev1");
        let store = Arc::new(InMemorySettingsStore::new());
        let engine = GuardEngine::new(
            config_with_remote(Some(format!("{}/configured.json", server.uri()))),
            components(&policy, "dev1", "US", 0.0, store.clone()),
        );

        let override_url = format!("{}/override.json", server.uri());
        engine.set_remote_policy_url(&override_url).unwrap();
        assert_eq!(engine.remote_policy_url(), Some(override_url.clone()));

        let report = completed(engine.run_initialization_cycle().await.unwrap());

        assert_eq!(report.policy_origin, PolicyOrigin::Remote);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.get_bool(keys::USE_FAILOVER_ENDPOINT), Some(false));
        // The cycle's commit leaves the override in place.
        assert_eq!(snapshot.get_str(keys::REMOTE_POLICY_URL), Some(override_url.as_str()));
    }

    #[tokio::test]
    async fn test_set_remote_policy_url_validation_and_clear() {
        let engine = GuardEngine::new(
            config_with_remote(Some("https://config.example.com/policy.json".to_string())),
            components(Path::new("/nonexistent"), "dev1", "US", 0.0, Arc::new(InMemorySettingsStore::new())),
        );

        match engine.set_remote_policy_url("ftp://config.example.com/policy.json") {
            Err(GuardError::ConfigError { reason }) => assert!(reason.contains("ftp")),
            other => panic!("expected ConfigError, got {:?}", other),
        }
        assert!(engine.set_remote_policy_url("not a url").is_err());

        engine.set_remote_policy_url("https://alt.example.com/policy.json").unwrap();
        assert_eq!(engine.remote_policy_url().as_deref(), Some("https://alt.example.com/policy.json"));

        engine.set_remote_policy_url("").unwrap();
        assert!(!engine.snapshot().contains_key(keys::REMOTE_POLICY_URL));
        assert_eq!(engine.remote_policy_url().as_deref(), Some("https://config.example.com/policy.json"));
    }

    #[tokio::test]
    async fn test_remote_disabled_skips_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{ "enabled": false }"#))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let policy = write_policy(&dir, true, "dev1");
        let mut config = config_with_remote(Some(format!("{}/policy.json", server.uri())));
        config.remote.enabled = false;
        let engine = GuardEngine::new(
            config,
            components(&policy, "dev1", "US", 0.0, Arc::new(InMemorySettingsStore::new())),
        );

        let report = completed(engine.run_initialization_cycle().await.unwrap());
        assert_eq!(report.policy_origin, PolicyOrigin::Local);
        assert!(engine.remote_policy_url().is_none());
    }

    // ── Concurrency ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_reentry_while_in_flight_is_noop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{ "enabled": false }"#)
                    .set_delay(Duration::from_millis(500)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let policy = write_policy(&dir, true, "");
        let engine = Arc::new(GuardEngine::new(
            config_with_remote(Some(format!("{}/policy.json", server.uri()))),
            components(&policy, "dev1", "US", 0.0, Arc::new(InMemorySettingsStore::new())),
        ));

        let background = engine.spawn_initialization();
        tokio::time::sleep(Duration::from_millis(100)).await;

        match engine.run_initialization_cycle().await.unwrap() {
            CycleOutcome::AlreadyRunning => {}
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }

        let report = completed(background.await.unwrap().unwrap());
        assert_eq!(report.policy_origin, PolicyOrigin::Remote);
    }

    // ── Built from configuration ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_from_config_persists_to_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("state").join("guard.json");

        let mut config = EngineConfig::default();
        config.channel = "beta".to_string();
        config.store_path = Some(store_path.clone());
        config.signals.sim_country = Some("jp".to_string());
        config.signals.device_id = Some("dev1".to_string());

        let engine = GuardEngine::from_config(config).unwrap();
        let report = completed(engine.run_initialization_cycle().await.unwrap());
        assert_eq!(report.channel, "beta");
        assert_eq!(report.country.as_str(), "JP");

        let reopened = FileSettingsStore::open(&store_path).unwrap();
        let snapshot = reopened.snapshot();
        // Compiled-in defaults block JP.
        assert_eq!(snapshot.get_bool(keys::USE_FAILOVER_ENDPOINT), Some(false));
        assert_eq!(snapshot.get_bool(keys::FORCE_HTTPS), Some(true));
        assert_eq!(
            snapshot.get_list(keys::URL_WHITELIST),
            Some(&["s3.amazonaws.com".to_string(), "cloudfront.net".to_string()][..])
        );
    }
}
