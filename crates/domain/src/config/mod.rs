mod cluster;
mod k8s;
mod orchestrator;
mod proxy;
mod ragcache;
mod server;
mod session;

pub use cluster::*;
pub use k8s::*;
pub use orchestrator::*;
pub use proxy::*;
pub use ragcache::*;
pub use server::*;
pub use session::*;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Platform configuration, deserialized from a single TOML file.
///
/// Every binary reads the same file and uses its own section(s);
/// secrets come from environment variables named in the config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for JSONL state files (runs, tool calls, provisioning).
    #[serde(default = "d_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub ragcache: RagCacheConfig,
    #[serde(default)]
    pub cluster_agent: ClusterAgentConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub k8s: K8sConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: d_state_dir(),
            metrics: MetricsConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            proxy: ProxyConfig::default(),
            ragcache: RagCacheConfig::default(),
            cluster_agent: ClusterAgentConfig::default(),
            session: SessionConfig::default(),
            k8s: K8sConfig::default(),
        }
    }
}

fn d_state_dir() -> PathBuf {
    PathBuf::from("./data/state")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// When false, `GET /metrics` answers 404.
    #[serde(default)]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

fn url_check(errors: &mut Vec<ConfigError>, field: &str, value: &str, required: bool) {
    if value.is_empty() {
        if required {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: field.into(),
                message: "must not be empty".into(),
            });
        }
        return;
    }
    if !value.starts_with("http://") && !value.starts_with("https://") {
        errors.push(ConfigError {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: format!("must start with http:// or https:// (got \"{value}\")"),
        });
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for (field, server) in [
            ("orchestrator.server", &self.orchestrator.server),
            ("proxy.server", &self.proxy.server),
            ("ragcache.server", &self.ragcache.server),
        ] {
            if server.port == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("{field}.port"),
                    message: "port must be greater than 0".into(),
                });
            }
            if server.host.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("{field}.host"),
                    message: "host must not be empty".into(),
                });
            }
        }

        url_check(
            &mut errors,
            "orchestrator.config_service_url",
            &self.orchestrator.config_service_url,
            true,
        );
        url_check(
            &mut errors,
            "orchestrator.pipeline_api_url",
            &self.orchestrator.pipeline_api_url,
            true,
        );
        url_check(
            &mut errors,
            "orchestrator.agent_api_url",
            &self.orchestrator.agent_api_url,
            true,
        );
        if let Some(url) = &self.orchestrator.telemetry_collector_url {
            url_check(&mut errors, "orchestrator.telemetry_collector_url", url, false);
        }
        url_check(
            &mut errors,
            "proxy.anthropic_upstream_url",
            &self.proxy.anthropic_upstream_url,
            true,
        );
        url_check(
            &mut errors,
            "cluster_agent.gateway_url",
            &self.cluster_agent.gateway_url,
            true,
        );
        if self.ragcache.s3.enabled {
            url_check(&mut errors, "ragcache.s3.endpoint", &self.ragcache.s3.endpoint, true);
        }

        if self.ragcache.max_trees == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "ragcache.max_trees".into(),
                message: "must cache at least one tree".into(),
            });
        }

        if self.cluster_agent.reconnect.multiplier < 1.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "cluster_agent.reconnect.multiplier".into(),
                message: "multiplier must be >= 1.0".into(),
            });
        }

        if self.session.execute_timeout_seconds < 60 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "session.execute_timeout_seconds".into(),
                message: "very short execute deadline; investigations regularly run minutes".into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn default_config_has_no_errors() {
        let issues = Config::default().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn zero_port_is_error() {
        let mut cfg = Config::default();
        cfg.orchestrator.server.port = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "orchestrator.server.port").expect("port issue");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn bad_scheme_is_error() {
        let mut cfg = Config::default();
        cfg.orchestrator.config_service_url = "ftp://config".into();
        let issues = cfg.validate();
        let issue =
            find_issue(&issues, "orchestrator.config_service_url").expect("url issue");
        assert!(issue.message.contains("http://"));
    }

    #[test]
    fn reconnect_multiplier_below_one_is_error() {
        let mut cfg = Config::default();
        cfg.cluster_agent.reconnect.multiplier = 0.5;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "cluster_agent.reconnect.multiplier").is_some());
    }

    #[test]
    fn parses_minimal_toml() {
        let cfg: Config = toml::from_str(
            r#"
            state_dir = "/var/lib/infrafox"

            [orchestrator.server]
            host = "0.0.0.0"
            port = 8080

            [ragcache]
            max_trees = 3
            max_cache_gb = 6.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.orchestrator.server.port, 8080);
        assert_eq!(cfg.ragcache.max_trees, 3);
        assert_eq!(cfg.ragcache.max_cache_gb, 6.0);
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "ragcache.max_trees".into(),
            message: "must cache at least one tree".into(),
        };
        assert_eq!(
            format!("{err}"),
            "[ERROR] ragcache.max_trees: must cache at least one tree"
        );
    }
}
