//! Network fallback for country resolution.
//!
//! One round trip to a plain-text geolocation endpoint. Only run
//! when the caller asks for it explicitly, and only off the foreground path.

use std::time::Duration;

use tracing::{info, warn};

use updategate_contracts::{
    error::{GuardError, GuardResult},
    signals::CountryCode,
};

pub const DEFAULT_IP_LOOKUP_URL: &str = "https://ipapi.co/country/";
pub const DEFAULT_IP_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Client for an endpoint that answers `GET` with a bare two-letter code.
#[derive(Debug, Clone)]
pub struct IpGeoLookup {
    client: reqwest::Client,
    url: String,
}

impl IpGeoLookup {
    /// Build a lookup client with the given endpoint and overall timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> GuardResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| GuardError::ConfigError {
                reason: format!("failed to build geolocation HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resolve the country, treating every failure as "no signal".
    pub async fn lookup(&self) -> CountryCode {
        match self.try_lookup().await {
            Ok(code) => {
                info!(country = %code, "country detected from IP");
                code
            }
            Err(e) => {
                warn!(error = %e, "IP-based geo detection failed");
                CountryCode::undetermined()
            }
        }
    }

    /// Resolve the country, reporting why no code was produced.
    pub async fn try_lookup(&self) -> GuardResult<CountryCode> {
        let unavailable = |reason: String| GuardError::SignalUnavailable {
            source_name: "ip".to_string(),
            reason,
        };

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| unavailable(format!("failed to read body: {}", e)))?;

        let first_line = body.lines().next().unwrap_or_default();
        CountryCode::parse(first_line)
            .ok_or_else(|| unavailable(format!("malformed country body: {:?}", first_line)))
    }
}
