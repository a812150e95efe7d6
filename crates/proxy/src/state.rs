use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use ifox_config_client::ConfigServiceClient;
use ifox_credentials::CredentialResolver;
use ifox_domain::config::{Config, CredentialSource, TokenMode};
use ifox_domain::{Error, Result};

/// Shared proxy state: config, credential resolver, HTTP clients.
pub struct ProxyState {
    pub config: Arc<Config>,
    pub resolver: Arc<CredentialResolver>,
    /// Client for streaming upstream calls (no overall timeout).
    pub stream_http: Client,
    /// Client for synchronous LLM calls (5 minute deadline).
    pub sync_http: Client,
    pub token_mode: TokenMode,
    /// HS256 secret for sandbox tokens; `None` when the env var is
    /// unset (only workable in permissive mode).
    pub token_secret: Option<Vec<u8>>,
}

pub type SharedState = Arc<ProxyState>;

impl ProxyState {
    pub fn new(config: Arc<Config>) -> Result<SharedState> {
        let ttl = Duration::from_secs(config.proxy.credential_cache_ttl_seconds);
        let resolver = match config.proxy.credential_source {
            CredentialSource::Environment => CredentialResolver::from_environment(ttl),
            CredentialSource::ConfigService => {
                let client =
                    Arc::new(ConfigServiceClient::new(&config.orchestrator.config_service_url)?);
                let internal_token = std::env::var(&config.orchestrator.internal_token_env)
                    .unwrap_or_default();
                CredentialResolver::from_config_service(client, internal_token, ttl)
            }
        };

        let token_secret = std::env::var(&config.proxy.token_secret_env)
            .ok()
            .filter(|s| !s.is_empty())
            .map(String::into_bytes);
        if token_secret.is_none() && config.proxy.token_mode == TokenMode::Strict {
            return Err(Error::Config(format!(
                "strict token mode requires {} to be set",
                config.proxy.token_secret_env
            )));
        }

        let stream_http = Client::builder()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        let sync_http = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Arc::new(Self {
            token_mode: config.proxy.token_mode,
            config,
            resolver: Arc::new(resolver),
            stream_http,
            sync_http,
            token_secret,
        }))
    }
}
