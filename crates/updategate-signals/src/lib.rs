//! # updategate-signals
//!
//! Device identity and country resolution for the update-bundle fetch gate.
//!
//! - [`IdentityResolver`] turns an OS-level identifier into a
//!   [`DeviceIdentity`](updategate_contracts::signals::DeviceIdentity), or the
//!   unknown sentinel.
//! - [`GeoResolver`] walks SIM → network → locale and, only when asked,
//!   falls back to [`IpGeoLookup`].
//!
//! Neither resolver ever returns an error. Missing evidence is a value.

pub mod geo;
pub mod identity;
pub mod ip_lookup;

pub use geo::{is_blocked, GeoResolver, LocaleRegion, ReportedCountry};
pub use identity::{IdentityResolver, MachineIdFile, StaticDeviceId};
pub use ip_lookup::IpGeoLookup;

// ── Tests ─────────────────────────────────────────────────────────────────────
