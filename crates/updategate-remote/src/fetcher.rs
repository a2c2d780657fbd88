//! The Remote Policy Fetcher.
//!
//! One `GET`, bounded by a timeout, no retries. Any failure means "no
//! override" and the local policy stands for this cycle.

use std::time::Duration;

use tracing::{info, warn};

use updategate_contracts::{
    error::{GuardError, GuardResult},
    policy::PolicyDocument,
};

use crate::document::RemotePolicyDocument;

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Fetches a JSON policy override from a configured URL.
#[derive(Debug, Clone)]
pub struct RemotePolicyFetcher {
    client: reqwest::Client,
}

impl RemotePolicyFetcher {
    pub fn new() -> GuardResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GuardError::ConfigError {
                reason: format!("failed to build remote policy HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    /// Fetch and parse the override, or `None` on any failure.
    pub async fn fetch_override(&self, url: &str, timeout: Duration) -> Option<PolicyDocument> {
        match self.try_fetch(url, timeout).await {
            Ok(policy) => {
                info!(url, "remote policy override applied");
                Some(policy)
            }
            Err(e) => {
                warn!(url, error = %e, "no remote policy override, keeping local policy");
                None
            }
        }
    }

    /// Fetch and parse the override, reporting why it was unusable.
    pub async fn try_fetch(&self, url: &str, timeout: Duration) -> GuardResult<PolicyDocument> {
        let failed = |reason: String| GuardError::RemoteFetchFailed { reason };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| failed(format!("request to '{}' failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("'{}' answered HTTP {}", url, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| failed(format!("failed to read body from '{}': {}", url, e)))?;

        let document: RemotePolicyDocument = serde_json::from_str(&body)
            .map_err(|e| failed(format!("malformed policy JSON: {}", e)))?;

        Ok(document.into_policy())
    }
}
