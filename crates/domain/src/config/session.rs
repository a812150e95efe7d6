use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ServerConfig;

/// Agent-session runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "d_agent_server")]
    pub server: ServerConfig,

    /// LLM proxy base URL (the Anthropic-shaped surface).
    #[serde(default = "d_llm_proxy_url")]
    pub llm_proxy_url: String,

    /// Orchestrator base URL (cluster command gateway).
    #[serde(default = "d_orchestrator_url")]
    pub orchestrator_url: String,

    /// Knowledge-base service base URL.
    #[serde(default = "d_knowledge_base_url")]
    pub knowledge_base_url: String,

    /// Cluster the Kubernetes tools target.
    #[serde(default = "d_cluster")]
    pub cluster: String,

    /// Root workspace; harvested image/file paths must resolve inside it.
    #[serde(default = "d_workspace_root")]
    pub workspace_root: PathBuf,

    /// Deadline for a single `execute` (seconds).
    #[serde(default = "d_execute_timeout")]
    pub execute_timeout_seconds: u64,

    /// How long the permission callback waits for an answer to
    /// AskUserQuestion (seconds).
    #[serde(default = "d_question_timeout")]
    pub question_timeout_seconds: u64,

    /// Cap on queued tool-output previews (bytes).
    #[serde(default = "d_max_tool_output")]
    pub max_tool_output_bytes: usize,

    /// Hard stop on tool-call loop iterations within one execute.
    #[serde(default = "d_max_tool_loops")]
    pub max_tool_loops: usize,

    /// Progress-update debounce (seconds).
    #[serde(default = "d_debounce")]
    pub progress_debounce_seconds: f64,

    /// Chat-surface block limit for progress updates.
    #[serde(default = "d_block_limit")]
    pub progress_block_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server: d_agent_server(),
            llm_proxy_url: d_llm_proxy_url(),
            orchestrator_url: d_orchestrator_url(),
            knowledge_base_url: d_knowledge_base_url(),
            cluster: d_cluster(),
            workspace_root: d_workspace_root(),
            execute_timeout_seconds: d_execute_timeout(),
            question_timeout_seconds: d_question_timeout(),
            max_tool_output_bytes: d_max_tool_output(),
            max_tool_loops: d_max_tool_loops(),
            progress_debounce_seconds: d_debounce(),
            progress_block_limit: d_block_limit(),
        }
    }
}

fn d_agent_server() -> ServerConfig {
    ServerConfig::with_port(8000)
}
fn d_llm_proxy_url() -> String {
    "http://proxy:8002".into()
}
fn d_orchestrator_url() -> String {
    "http://orchestrator:8080".into()
}
fn d_knowledge_base_url() -> String {
    "http://ragcache:8010".into()
}
fn d_cluster() -> String {
    "default".into()
}
fn d_workspace_root() -> PathBuf {
    PathBuf::from("/workspace")
}
fn d_execute_timeout() -> u64 {
    600
}
fn d_question_timeout() -> u64 {
    60
}
fn d_max_tool_output() -> usize {
    50_000
}
fn d_max_tool_loops() -> usize {
    25
}
fn d_debounce() -> f64 {
    2.0
}
fn d_block_limit() -> usize {
    50
}
