//! # updategate-core
//!
//! The policy-evaluation pipeline for the update-bundle fetch gate.
//!
//! This crate provides:
//! - The trait seams (`Strategy`, `SettingsStore`, `RandomSource`,
//!   `DeviceIdSource`, `CountrySignal`)
//! - The five fixed strategies and the `Pipeline` that runs them in order and
//!   commits one atomic batch
//! - `DownloadGate`, the reader-side interpretation of the committed keys
//!
//! ## Usage
//!
//! ```rust,ignore
//! use updategate_core::{Pipeline, random::ThreadRandom};
//!
//! let pipeline = Pipeline::standard(Box::new(ThreadRandom));
//! pipeline.run(&inputs, store.as_ref())?;
//! ```

pub mod download;
pub mod pipeline;
pub mod random;
pub mod strategies;
pub mod traits;

pub use download::DownloadGate;
pub use pipeline::{Pipeline, PipelineRun};

// ── Tests ─────────────────────────────────────────────────────────────────────
