//! updategate: run and inspect the update-bundle fetch gate.
//!
//! Usage:
//!   updategate run --config guard.toml
//!   updategate show --store state/guard.json
//!   updategate country --config guard.toml --ip
//!   updategate set-remote-url --store state/guard.json https://config.example.com/policy.json

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use updategate_contracts::{
    cycle::CycleOutcome,
    error::{GuardError, GuardResult},
    settings::SettingsSnapshot,
};
use updategate_core::{traits::SettingsStore, DownloadGate};
use updategate_engine::{EngineConfig, GuardEngine};
use updategate_store::FileSettingsStore;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Decide which endpoint and which checks the next update-bundle fetch uses.
#[derive(Parser)]
#[command(
    name = "updategate",
    about = "Update-bundle fetch gate",
    long_about = "Runs the fetch-gate initialization cycle and inspects the settings\n\
                  snapshot that the bundle downloader reads."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one initialization cycle and print the report and snapshot.
    Run {
        /// Engine configuration (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the persisted settings snapshot.
    Show {
        #[arg(long)]
        store: PathBuf,
        /// Also print the endpoint the downloader would pick for this primary URL.
        #[arg(long)]
        primary: Option<String>,
    },
    /// Print the resolved country.
    Country {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Fall back to IP geolocation when no local signal is available.
        #[arg(long)]
        ip: bool,
    },
    /// Persist a remote policy URL override. An empty URL clears it.
    SetRemoteUrl {
        #[arg(long)]
        store: PathBuf,
        url: String,
    },
}

/// Failures surfaced by the command line.
#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// The spawned initialization task panicked or was cancelled.
    #[error("initialization task aborted: {0}")]
    TaskAborted(#[from] JoinError),
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Command::Run { config } => run(config).await,
        Command::Show { store, primary } => show(store, primary).map_err(CliError::from),
        Command::Country { config, ip } => country(config, ip).await.map_err(CliError::from),
        Command::SetRemoteUrl { store, url } => set_remote_url(store, &url).map_err(CliError::from),
    };

    if let Err(e) = result {
        eprintln!("updategate error: {}", e);
        std::process::exit(1);
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn load_config(path: Option<PathBuf>) -> GuardResult<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(&path),
        None => {
            debug!("no config file given, using defaults");
            Ok(EngineConfig::default())
        }
    }
}

async fn run(config: Option<PathBuf>) -> Result<(), CliError> {
    let engine = Arc::new(GuardEngine::from_config(load_config(config)?)?);

    let outcome = settle(engine.spawn_initialization().await)?;

    match outcome {
        CycleOutcome::Completed(report) => {
            println!("{}", to_json(&report)?);
            print_snapshot(&engine.snapshot())?;
        }
        CycleOutcome::AlreadyRunning => {
            println!("An initialization cycle is already running.");
        }
    }
    Ok(())
}

fn settle(joined: Result<GuardResult<CycleOutcome>, JoinError>) -> Result<CycleOutcome, CliError> {
    Ok(joined??)
}

fn show(store: PathBuf, primary: Option<String>) -> GuardResult<()> {
    let store = FileSettingsStore::open(store)?;
    let snapshot = store.snapshot();

    if let Some(at) = store.committed_at() {
        println!("committed at {}", at.to_rfc3339());
    }
    print_snapshot(&snapshot)?;

    if let Some(primary) = primary {
        match DownloadGate::new(&snapshot).resolve(&primary) {
            Some(endpoint) => println!("download endpoint: {}", endpoint),
            None => println!("download endpoint: none (rejected by whitelist or HTTPS policy)"),
        }
    }
    Ok(())
}

async fn country(config: Option<PathBuf>, ip: bool) -> GuardResult<()> {
    let mut config = load_config(config)?;
    config.geo.ip_lookup |= ip;

    let engine = GuardEngine::from_config(config)?;
    let code = engine.resolve_country().await;
    println!("{}", code);
    Ok(())
}

fn set_remote_url(store: PathBuf, url: &str) -> GuardResult<()> {
    let config = EngineConfig {
        store_path: Some(store),
        ..EngineConfig::default()
    };
    let engine = GuardEngine::from_config(config)?;
    engine.set_remote_policy_url(url)?;

    match engine.remote_policy_url() {
        Some(url) => println!("remote policy url: {}", url),
        None => println!("remote policy url cleared"),
    }
    Ok(())
}

// ── Output ────────────────────────────────────────────────────────────────────

fn print_snapshot(snapshot: &SettingsSnapshot) -> GuardResult<()> {
    println!("{}", to_json(snapshot)?);
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> GuardResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| GuardError::ConfigError {
        reason: format!("failed to render JSON: {}", e),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
