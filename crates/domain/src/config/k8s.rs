use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kubernetes access and workload templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct K8sConfig {
    /// API server URL. Empty means in-cluster
    /// (`https://kubernetes.default.svc` with the mounted token/CA).
    #[serde(default)]
    pub api_url: String,

    /// Namespace all managed workloads live in.
    #[serde(default = "d_namespace")]
    pub namespace: String,

    /// Service-account token path (in-cluster).
    #[serde(default = "d_token_path")]
    pub token_path: PathBuf,

    /// Image for AI-pipeline and dependency-discovery jobs.
    #[serde(default = "d_pipeline_image")]
    pub pipeline_image: String,

    /// Image for dedicated agent deployments.
    #[serde(default = "d_agent_image")]
    pub agent_image: String,

    /// Port dedicated agent services expose.
    #[serde(default = "d_agent_port")]
    pub agent_port: u16,
}

impl Default for K8sConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            namespace: d_namespace(),
            token_path: d_token_path(),
            pipeline_image: d_pipeline_image(),
            agent_image: d_agent_image(),
            agent_port: d_agent_port(),
        }
    }
}

fn d_namespace() -> String {
    "infrafox".into()
}
fn d_token_path() -> PathBuf {
    PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token")
}
fn d_pipeline_image() -> String {
    "infrafox/ai-pipeline:latest".into()
}
fn d_agent_image() -> String {
    "infrafox/agent:latest".into()
}
fn d_agent_port() -> u16 {
    8000
}
