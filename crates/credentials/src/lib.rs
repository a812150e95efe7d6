//! Credential resolution for tenant integrations.
//!
//! Sandboxes are untrusted: a signed sandbox token proves which
//! `(tenant, team)` a request acts for, the target host/path picks the
//! integration, and this crate resolves the credentials and builds the
//! headers the proxy injects upstream. Credentials come from either
//! environment variables (local / self-hosted) or the Config Service
//! (SaaS), cached for five minutes.

pub mod domain_map;
pub mod headers;
pub mod token;
pub mod trial;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use ifox_config_client::ConfigServiceClient;
use ifox_domain::config::CredentialSource;
use ifox_domain::team::IntegrationConfig;
use ifox_domain::Result;

/// Resolves integration credentials for a `(tenant, team, integration)`
/// triple, with a TTL cache in front of the Config Service.
pub struct CredentialResolver {
    source: CredentialSource,
    env_credentials: HashMap<String, IntegrationConfig>,
    config_client: Option<Arc<ConfigServiceClient>>,
    internal_token: String,
    cache: Mutex<HashMap<(String, String, String), (Instant, Option<IntegrationConfig>)>>,
    ttl: Duration,
}

impl CredentialResolver {
    /// Environment-sourced resolver (local / self-hosted).
    pub fn from_environment(ttl: Duration) -> Self {
        Self {
            source: CredentialSource::Environment,
            env_credentials: load_env_credentials(),
            config_client: None,
            internal_token: String::new(),
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Config-Service-sourced resolver (SaaS).
    pub fn from_config_service(
        client: Arc<ConfigServiceClient>,
        internal_token: String,
        ttl: Duration,
    ) -> Self {
        Self {
            source: CredentialSource::ConfigService,
            env_credentials: HashMap::new(),
            config_client: Some(client),
            internal_token,
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Resolve credentials for an integration. `None` means the
    /// integration is simply not configured for this team.
    pub async fn get(
        &self,
        tenant_id: &str,
        team_id: &str,
        integration_id: &str,
    ) -> Result<Option<IntegrationConfig>> {
        if self.source == CredentialSource::Environment {
            return Ok(self.env_credentials.get(integration_id).cloned());
        }

        let key = (
            tenant_id.to_string(),
            team_id.to_string(),
            integration_id.to_string(),
        );
        if let Some((expires, cached)) = self.cache.lock().get(&key) {
            if *expires > Instant::now() {
                return Ok(cached.clone());
            }
        }

        let client = self
            .config_client
            .as_ref()
            .ok_or_else(|| ifox_domain::Error::Config("config service client missing".into()))?;
        let raw = client
            .get_integration_config(&self.internal_token, tenant_id, team_id, integration_id)
            .await?;
        let creds = match raw {
            Some(value) => Some(serde_json::from_value::<IntegrationConfig>(value)?),
            None => None,
        };

        self.cache
            .lock()
            .insert(key, (Instant::now() + self.ttl, creds.clone()));
        Ok(creds)
    }

    /// Whether an integration has usable credentials.
    pub fn is_configured(integration_id: &str, creds: Option<&IntegrationConfig>) -> bool {
        let Some(creds) = creds else { return false };
        match integration_id {
            // Confluence needs the instance URL alongside the key.
            "confluence" => {
                creds.extra_str("domain").is_some_and(|d| !d.is_empty())
                    && creds.api_key.as_deref().is_some_and(|k| !k.is_empty())
            }
            _ => creds.api_key.as_deref().is_some_and(|k| !k.is_empty()),
        }
    }

    /// Non-sensitive metadata for the integration listing endpoint.
    /// Never returns secrets.
    pub fn metadata(integration_id: &str, creds: &IntegrationConfig) -> serde_json::Value {
        match integration_id {
            "confluence" => serde_json::json!({ "url": creds.extra_str("domain") }),
            "coralogix" => serde_json::json!({
                "domain": creds.extra_str("domain"),
                "region": creds.extra_str("region"),
            }),
            _ => serde_json::json!({}),
        }
    }

    /// Drop all cached entries (test harness hook).
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

/// Load integration credentials from environment variables.
fn load_env_credentials() -> HashMap<String, IntegrationConfig> {
    fn entry(api_key: Option<String>, extra: &[(&str, Option<String>)]) -> IntegrationConfig {
        IntegrationConfig {
            api_key,
            extra: extra
                .iter()
                .filter_map(|(k, v)| {
                    v.as_ref()
                        .map(|v| (k.to_string(), serde_json::Value::String(v.clone())))
                })
                .collect(),
            ..IntegrationConfig::default()
        }
    }

    let mut map = HashMap::new();
    map.insert(
        "anthropic".to_string(),
        entry(std::env::var("ANTHROPIC_API_KEY").ok(), &[]),
    );
    map.insert(
        "coralogix".to_string(),
        entry(
            std::env::var("CORALOGIX_API_KEY").ok(),
            &[
                ("domain", std::env::var("CORALOGIX_DOMAIN").ok()),
                ("region", std::env::var("CORALOGIX_REGION").ok()),
            ],
        ),
    );
    map.insert(
        "confluence".to_string(),
        entry(
            std::env::var("CONFLUENCE_API_TOKEN").ok(),
            &[
                ("domain", std::env::var("CONFLUENCE_URL").ok()),
                ("email", std::env::var("CONFLUENCE_EMAIL").ok()),
            ],
        ),
    );
    map
}

/// Mask a secret for logs, showing only a short prefix.
pub fn mask_secret(value: Option<&str>) -> String {
    match value {
        None | Some("") => "(not set)".into(),
        Some(v) if v.len() <= 6 => "*".repeat(v.len()),
        Some(v) => format!("{}...********", &v[..6]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(api_key: Option<&str>, extra: &[(&str, &str)]) -> IntegrationConfig {
        IntegrationConfig {
            api_key: api_key.map(String::from),
            extra: extra
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                .collect(),
            ..IntegrationConfig::default()
        }
    }

    #[test]
    fn configured_requires_api_key() {
        assert!(!CredentialResolver::is_configured("coralogix", None));
        assert!(!CredentialResolver::is_configured(
            "coralogix",
            Some(&creds(None, &[]))
        ));
        assert!(CredentialResolver::is_configured(
            "coralogix",
            Some(&creds(Some("k"), &[]))
        ));
    }

    #[test]
    fn confluence_needs_domain_too() {
        assert!(!CredentialResolver::is_configured(
            "confluence",
            Some(&creds(Some("k"), &[]))
        ));
        assert!(CredentialResolver::is_configured(
            "confluence",
            Some(&creds(Some("k"), &[("domain", "https://x.atlassian.net")]))
        ));
    }

    #[test]
    fn metadata_never_contains_secrets() {
        let c = creds(Some("super-secret"), &[("domain", "eu2.coralogix.com")]);
        let meta = CredentialResolver::metadata("coralogix", &c);
        assert!(!meta.to_string().contains("super-secret"));
        assert_eq!(meta["domain"], "eu2.coralogix.com");
    }

    #[test]
    fn mask_secret_shows_prefix_only() {
        assert_eq!(mask_secret(None), "(not set)");
        assert_eq!(mask_secret(Some("abc")), "***");
        assert_eq!(mask_secret(Some("sk-ant-123456")), "sk-ant...********");
    }
}
