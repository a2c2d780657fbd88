//! # updategate-contracts
//!
//! Shared types, settings keys, and errors for the update-bundle fetch gate.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod cycle;
pub mod error;
pub mod policy;
pub mod settings;
pub mod signals;
