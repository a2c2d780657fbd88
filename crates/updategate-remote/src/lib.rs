//! # updategate-remote
//!
//! Best-effort remote policy override for the update-bundle fetch gate.
//!
//! [`RemotePolicyFetcher::fetch_override`] performs a single bounded `GET`
//! and either returns a complete replacement [`PolicyDocument`] or `None`.
//! It never retries and never raises.
//!
//! [`PolicyDocument`]: updategate_contracts::policy::PolicyDocument

pub mod document;
pub mod fetcher;

pub use document::RemotePolicyDocument;
pub use fetcher::{RemotePolicyFetcher, DEFAULT_REMOTE_TIMEOUT};

// ── Tests ─────────────────────────────────────────────────────────────────────
