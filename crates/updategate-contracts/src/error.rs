//! Error types for the fetch-gate engine.
//!
//! Most of these never reach the host: signal and remote failures are folded
//! into defaults by the engine. They exist so each stage can report what went
//! wrong through `?` before that folding happens.

use thiserror::Error;

/// The unified error type for the fetch-gate crates.
#[derive(Debug, Error)]
pub enum GuardError {
    /// A configuration document is missing, unreadable, or malformed.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A device or geographic signal source could not produce a value.
    #[error("signal '{source_name}' unavailable: {reason}")]
    SignalUnavailable { source_name: String, reason: String },

    /// The remote policy document could not be fetched or parsed.
    #[error("remote policy fetch failed: {reason}")]
    RemoteFetchFailed { reason: String },

    /// A pipeline strategy returned an error or panicked.
    #[error("strategy '{strategy}' failed: {reason}")]
    StrategyFailed { strategy: String, reason: String },

    /// A strategy attempted to write a key it does not own.
    #[error("strategy '{strategy}' wrote key '{key}' it does not own")]
    KeyNotOwned { strategy: String, key: String },

    /// The settings store could not persist a commit.
    #[error("settings store write failed: {reason}")]
    StoreWriteFailed { reason: String },

    /// The settings store could not load its persisted snapshot.
    #[error("settings store read failed: {reason}")]
    StoreReadFailed { reason: String },
}

/// Convenience alias used throughout the workspace.
pub type GuardResult<T> = Result<T, GuardError>;
