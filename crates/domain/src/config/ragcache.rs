use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ServerConfig;

/// RAG tree-cache service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagCacheConfig {
    #[serde(default = "d_rag_server")]
    pub server: ServerConfig,

    /// Local directory holding tree artifacts.
    #[serde(default = "d_trees_dir")]
    pub trees_dir: PathBuf,

    /// Tree used when a query names none.
    #[serde(default = "d_default_tree")]
    pub default_tree: String,

    /// Maximum number of trees resident in memory.
    #[serde(default = "d_max_trees")]
    pub max_trees: usize,

    /// Maximum total resident size, in GiB.
    #[serde(default = "d_max_cache_gb")]
    pub max_cache_gb: f64,

    #[serde(default)]
    pub s3: S3Config,
}

impl RagCacheConfig {
    pub fn max_cache_bytes(&self) -> u64 {
        (self.max_cache_gb * (1u64 << 30) as f64) as u64
    }
}

impl Default for RagCacheConfig {
    fn default() -> Self {
        Self {
            server: d_rag_server(),
            trees_dir: d_trees_dir(),
            default_tree: d_default_tree(),
            max_trees: d_max_trees(),
            max_cache_gb: d_max_cache_gb(),
            s3: S3Config::default(),
        }
    }
}

/// Authoritative tree store (S3-compatible HTTP endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default = "d_s3_enabled")]
    pub enabled: bool,
    #[serde(default = "d_s3_endpoint")]
    pub endpoint: String,
    #[serde(default = "d_s3_bucket")]
    pub bucket: String,
    #[serde(default = "d_s3_prefix")]
    pub prefix: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            enabled: d_s3_enabled(),
            endpoint: d_s3_endpoint(),
            bucket: d_s3_bucket(),
            prefix: d_s3_prefix(),
        }
    }
}

fn d_rag_server() -> ServerConfig {
    ServerConfig::with_port(8010)
}
fn d_trees_dir() -> PathBuf {
    PathBuf::from("./trees")
}
fn d_default_tree() -> String {
    "k8s".into()
}
fn d_max_trees() -> usize {
    5
}
fn d_max_cache_gb() -> f64 {
    16.0
}
fn d_s3_enabled() -> bool {
    true
}
fn d_s3_endpoint() -> String {
    "https://s3.us-west-2.amazonaws.com".into()
}
fn d_s3_bucket() -> String {
    "infrafox-kb-trees".into()
}
fn d_s3_prefix() -> String {
    "trees".into()
}
