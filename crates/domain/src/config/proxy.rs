use serde::{Deserialize, Serialize};

use super::ServerConfig;

/// Where the proxy resolves integration credentials from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Environment variables (local / self-hosted).
    Environment,
    /// Config Service (SaaS, per tenant/team).
    ConfigService,
}

/// Sandbox-token validation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenMode {
    /// Missing or invalid tokens are rejected with 401.
    Strict,
    /// Fall back to header claims when the token is absent (local dev).
    Permissive,
}

/// LLM translating-proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "d_proxy_server")]
    pub server: ServerConfig,

    /// Upstream for Claude pass-through.
    #[serde(default = "d_anthropic_upstream")]
    pub anthropic_upstream_url: String,

    /// Deployment-level model override (priority 2 in model dispatch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_model: Option<String>,

    /// Last-resort model when nothing else selects one.
    #[serde(default = "d_default_model")]
    pub default_model: String,

    #[serde(default = "d_credential_source")]
    pub credential_source: CredentialSource,

    #[serde(default = "d_token_mode")]
    pub token_mode: TokenMode,

    /// Environment variable holding the HS256 secret for sandbox tokens.
    #[serde(default = "d_token_secret_env")]
    pub token_secret_env: String,

    /// Credential cache TTL (seconds).
    #[serde(default = "d_credential_ttl")]
    pub credential_cache_ttl_seconds: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            server: d_proxy_server(),
            anthropic_upstream_url: d_anthropic_upstream(),
            deployment_model: None,
            default_model: d_default_model(),
            credential_source: d_credential_source(),
            token_mode: d_token_mode(),
            token_secret_env: d_token_secret_env(),
            credential_cache_ttl_seconds: d_credential_ttl(),
        }
    }
}

fn d_proxy_server() -> ServerConfig {
    ServerConfig::with_port(8002)
}
fn d_anthropic_upstream() -> String {
    "https://api.anthropic.com".into()
}
fn d_default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn d_credential_source() -> CredentialSource {
    CredentialSource::Environment
}
fn d_token_mode() -> TokenMode {
    TokenMode::Strict
}
fn d_token_secret_env() -> String {
    "IFOX_SANDBOX_TOKEN_SECRET".into()
}
fn d_credential_ttl() -> u64 {
    300
}
