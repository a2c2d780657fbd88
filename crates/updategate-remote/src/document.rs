//! Wire shape of the remote policy document.
//!
//! The published format is small:
//!
//! ```json
//! { "enabled": true, "endpoint": "https://backup.example.com", "blocked_countries": ["JP"] }
//! ```
//!
//! Every other `PolicyDocument` field may also be supplied by name. Unknown
//! fields are ignored; absent fields take the compiled-in default. The result
//! replaces the local policy for the cycle; it is never merged with it.

use serde::Deserialize;
use serde_json::Value;

use updategate_contracts::policy::{normalize_countries, PolicyDocument, Probability};

/// The permissive JSON form of a policy override.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemotePolicyDocument {
    #[serde(alias = "failover_enabled")]
    pub enabled: Option<bool>,

    #[serde(alias = "failover_endpoint")]
    pub endpoint: Option<String>,

    pub blocked_countries: Option<Vec<String>>,

    /// Kept loose so a quoted or malformed number degrades to the default
    /// instead of rejecting the whole document.
    #[serde(alias = "probability")]
    pub failover_probability: Option<Value>,

    pub device_whitelist: Option<Vec<String>>,
    pub domain_whitelist: Option<Vec<String>>,
    pub signature_verification_enabled: Option<bool>,

    #[serde(alias = "md5_verification_enabled")]
    pub integrity_verification_enabled: Option<bool>,

    pub force_https: Option<bool>,
}

impl RemotePolicyDocument {
    /// Build the cycle's policy: compiled-in defaults with every present
    /// field replaced.
    pub fn into_policy(self) -> PolicyDocument {
        let mut policy = PolicyDocument::default();

        if let Some(enabled) = self.enabled {
            policy.failover_enabled = enabled;
        }
        if let Some(endpoint) = self.endpoint.filter(|e| !e.trim().is_empty()) {
            policy.failover_endpoint = endpoint.trim().to_string();
        }
        if let Some(countries) = self.blocked_countries {
            policy.blocked_countries = normalize_countries(countries.iter().map(String::as_str));
        }
        if let Some(raw) = self.failover_probability {
            policy.failover_probability = probability_from_json(&raw);
        }
        if let Some(devices) = self.device_whitelist {
            policy.device_whitelist = devices
                .into_iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }
        if let Some(domains) = self.domain_whitelist {
            policy.domain_whitelist = domains
                .into_iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }
        if let Some(v) = self.signature_verification_enabled {
            policy.signature_verification_enabled = v;
        }
        if let Some(v) = self.integrity_verification_enabled {
            policy.integrity_verification_enabled = v;
        }
        if let Some(v) = self.force_https {
            policy.force_https = v;
        }

        policy
    }
}

fn probability_from_json(raw: &Value) -> Probability {
    match raw {
        Value::Number(n) => n.as_f64().map(Probability::new).unwrap_or_default(),
        Value::String(s) => Probability::parse_or_default(s),
        _ => Probability::default(),
    }
}
