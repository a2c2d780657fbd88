//! # updategate-policy
//!
//! The local Config Source for the update-bundle fetch gate.
//!
//! ## Overview
//!
//! [`PolicySource`] produces the cycle's [`PolicyDocument`] from the
//! compiled-in defaults, optionally layered with a packaged `key=value`
//! file. Loading never fails: unreadable files and unparsable values fall
//! back to defaults.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use updategate_policy::PolicySource;
//!
//! let policy = PolicySource::with_override_file("assets/guard.properties").load();
//! ```
//!
//! [`PolicyDocument`]: updategate_contracts::policy::PolicyDocument

pub mod properties;
pub mod source;

pub use source::{apply_properties, policy_from_properties, PolicySource};

// ── Tests ─────────────────────────────────────────────────────────────────────
