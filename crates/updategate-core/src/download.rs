//! Reader-side helper for the downloader.
//!
//! The downloader itself lives outside this workspace. `DownloadGate` applies
//! its contract to a committed snapshot so every consumer interprets the keys
//! the same way:
//!
//! - the failover URL is used only when `useFailoverEndpoint` is set and the
//!   URL itself passes the host and scheme checks;
//! - any URL whose host does not contain a whitelist entry is rejected, unless
//!   the whitelist is empty or absent;
//! - with `forceHttps` set (or absent), only `https` URLs pass.

use tracing::warn;
use url::Url;

use updategate_contracts::settings::{keys, SettingsSnapshot};

/// Read-only view of a snapshot with the downloader's selection rules.
#[derive(Debug, Clone, Copy)]
pub struct DownloadGate<'a> {
    snapshot: &'a SettingsSnapshot,
}

impl<'a> DownloadGate<'a> {
    pub fn new(snapshot: &'a SettingsSnapshot) -> Self {
        Self { snapshot }
    }

    /// Pick the endpoint to download from: the failover URL when selected and
    /// acceptable, otherwise `primary`.
    pub fn select_endpoint(&self, primary: &str) -> String {
        let use_failover = self
            .snapshot
            .get_bool(keys::USE_FAILOVER_ENDPOINT)
            .unwrap_or(false);

        if use_failover {
            match self.snapshot.get_str(keys::FAILOVER_ENDPOINT_URL) {
                Some(endpoint) if self.is_url_allowed(endpoint) => return endpoint.to_string(),
                Some(endpoint) => warn!(endpoint, "failover endpoint rejected, using primary"),
                None => warn!("failover selected without an endpoint, using primary"),
            }
        }

        primary.to_string()
    }

    /// Select an endpoint and check it. `None` means the download must not
    /// proceed.
    pub fn resolve(&self, primary: &str) -> Option<String> {
        let chosen = self.select_endpoint(primary);
        self.is_url_allowed(&chosen).then_some(chosen)
    }

    /// Return true if `raw` passes the scheme and host whitelist checks.
    pub fn is_url_allowed(&self, raw: &str) -> bool {
        let Ok(url) = Url::parse(raw) else {
            return false;
        };

        let force_https = self.snapshot.get_bool(keys::FORCE_HTTPS).unwrap_or(true);
        if force_https && url.scheme() != "https" {
            return false;
        }

        let whitelist = self.snapshot.get_list(keys::URL_WHITELIST).unwrap_or(&[]);
        if whitelist.is_empty() {
            return true;
        }

        let Some(host) = url.host_str() else {
            return false;
        };
        whitelist
            .iter()
            .map(|entry| entry.trim().to_ascii_lowercase())
            .filter(|entry| !entry.is_empty())
            .any(|entry| host.contains(&entry))
    }
}
