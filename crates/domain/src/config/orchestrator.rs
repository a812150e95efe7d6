use serde::{Deserialize, Serialize};

use super::ServerConfig;

/// Orchestrator service settings: admin API, provisioning, gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Config Service base URL (auth, node config, tokens).
    #[serde(default = "d_config_service_url")]
    pub config_service_url: String,
    /// AI-pipeline API base URL (bootstrap, manual triggers).
    #[serde(default = "d_pipeline_api_url")]
    pub pipeline_api_url: String,
    /// Agent API base URL (server-to-server agent runs).
    #[serde(default = "d_agent_api_url")]
    pub agent_api_url: String,
    /// Optional telemetry collector for license entitlements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_collector_url: Option<String>,

    /// Environment variable holding the internal service token used to
    /// write audit records. Audit writes are disabled when unset.
    #[serde(default = "d_internal_token_env")]
    pub internal_token_env: String,

    /// TTL for the admin-auth cache (seconds).
    #[serde(default = "d_admin_auth_cache_ttl")]
    pub admin_auth_cache_ttl_seconds: u64,

    /// Permission required to provision a team. `admin:*` always passes.
    #[serde(default = "d_provision_permission")]
    pub provision_permission: String,

    /// Age after which the sweeper may transition running agent runs to
    /// timeout (seconds).
    /// TODO: split into per-agent-class values once long-running
    /// pipeline agents land.
    #[serde(default = "d_run_max_age")]
    pub run_max_age_seconds: u64,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::with_port(8080),
            config_service_url: d_config_service_url(),
            pipeline_api_url: d_pipeline_api_url(),
            agent_api_url: d_agent_api_url(),
            telemetry_collector_url: None,
            internal_token_env: d_internal_token_env(),
            admin_auth_cache_ttl_seconds: d_admin_auth_cache_ttl(),
            provision_permission: d_provision_permission(),
            run_max_age_seconds: d_run_max_age(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// SSE command-gateway settings (control-plane side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Heartbeat interval on agent connections (seconds).
    #[serde(default = "d_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// How long the broker waits for an executor response before the
    /// caller sees a timeout (seconds).
    #[serde(default = "d_command_timeout")]
    pub command_timeout_seconds: u64,
    /// Environment variable holding the bearer token cluster agents
    /// must present on connect.
    #[serde(default = "d_agent_token_env")]
    pub agent_token_env: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: d_heartbeat_interval(),
            command_timeout_seconds: d_command_timeout(),
            agent_token_env: d_agent_token_env(),
        }
    }
}

fn d_config_service_url() -> String {
    "http://config-service:8000".into()
}
fn d_pipeline_api_url() -> String {
    "http://ai-pipeline:8000".into()
}
fn d_agent_api_url() -> String {
    "http://agent:8000".into()
}
fn d_internal_token_env() -> String {
    "IFOX_INTERNAL_ADMIN_TOKEN".into()
}
fn d_admin_auth_cache_ttl() -> u64 {
    15
}
fn d_provision_permission() -> String {
    "admin:provision".into()
}
fn d_run_max_age() -> u64 {
    3600
}
fn d_heartbeat_interval() -> u64 {
    15
}
fn d_command_timeout() -> u64 {
    30
}
fn d_agent_token_env() -> String {
    "IFOX_GATEWAY_AGENT_TOKEN".into()
}
