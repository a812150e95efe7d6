use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// In-cluster SSE agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterAgentConfig {
    /// Gateway base URL (the orchestrator's `/gateway` surface).
    #[serde(default = "d_gateway_url")]
    pub gateway_url: String,

    /// Environment variable holding the agent bearer token.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,

    /// Name this agent registers under.
    #[serde(default = "d_cluster_name")]
    pub cluster_name: String,

    /// File touched on connect and removed on shutdown; probed by the
    /// pod's liveness/readiness checks.
    #[serde(default = "d_health_file")]
    pub health_file: PathBuf,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for ClusterAgentConfig {
    fn default() -> Self {
        Self {
            gateway_url: d_gateway_url(),
            api_key_env: d_api_key_env(),
            cluster_name: d_cluster_name(),
            health_file: d_health_file(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry (seconds).
    #[serde(default = "d_initial_delay")]
    pub initial_delay_seconds: u64,
    /// Multiplier applied after each failure.
    #[serde(default = "d_multiplier")]
    pub multiplier: f64,
    /// Cap on the delay (seconds).
    #[serde(default = "d_max_delay")]
    pub max_delay_seconds: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_seconds: d_initial_delay(),
            multiplier: d_multiplier(),
            max_delay_seconds: d_max_delay(),
        }
    }
}

fn d_gateway_url() -> String {
    "http://orchestrator:8080/gateway".into()
}
fn d_api_key_env() -> String {
    "IFOX_AGENT_API_KEY".into()
}
fn d_cluster_name() -> String {
    "default".into()
}
fn d_health_file() -> PathBuf {
    PathBuf::from("/tmp/healthy")
}
fn d_initial_delay() -> u64 {
    1
}
fn d_multiplier() -> f64 {
    2.0
}
fn d_max_delay() -> u64 {
    60
}
