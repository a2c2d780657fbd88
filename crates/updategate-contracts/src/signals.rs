//! Device identity and geographic signal values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque per-install device identifier.
///
/// The empty identity is the "unknown" sentinel. It is a valid value, not an
/// error, and never matches a whitelist entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Wrap a raw identifier. Surrounding whitespace is stripped.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A resolved country: an uppercase two-letter code, or empty when no source
/// produced a usable value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountryCode(String);

impl CountryCode {
    /// Normalize a raw signal into a country code.
    ///
    /// Accepts exactly two ASCII letters in either case after trimming.
    /// Anything else (three-letter codes, digits, empty strings) is `None`,
    /// meaning "no signal from this source".
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.len() == 2 && trimmed.bytes().all(|b| b.is_ascii_alphabetic()) {
            Some(Self(trimmed.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn undetermined() -> Self {
        Self::default()
    }

    pub fn is_undetermined(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<undetermined>")
        } else {
            f.write_str(&self.0)
        }
    }
}
