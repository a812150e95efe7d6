//! Effective team configuration, as served by the Config Service.
//!
//! The hierarchy and merge rules live in the Config Service; consumers
//! only see the flattened result modeled here. Unknown integration
//! fields are carried through untouched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::routing::{IdentifierKind, TeamRoute, ROUTING_PRIORITY};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamConfig {
    #[serde(default)]
    pub routing: RoutingSection,
    #[serde(default)]
    pub integrations: HashMap<String, IntegrationConfig>,
    #[serde(default)]
    pub ai_pipeline: PipelineSection,
    #[serde(default)]
    pub dependency_discovery: PipelineSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub llm: LlmSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingSection {
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub incidentio_team_ids: Vec<String>,
    #[serde(default)]
    pub pagerduty_service_ids: Vec<String>,
    #[serde(default)]
    pub slack_channel_ids: Vec<String>,
    #[serde(default)]
    pub github_repos: Vec<String>,
    #[serde(default)]
    pub coralogix_team_names: Vec<String>,
    #[serde(default)]
    pub incidentio_alert_source_ids: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
}

impl RoutingSection {
    fn values(&self, kind: IdentifierKind) -> &[String] {
        match kind {
            IdentifierKind::IncidentioTeamId => &self.incidentio_team_ids,
            IdentifierKind::PagerdutyServiceId => &self.pagerduty_service_ids,
            IdentifierKind::SlackChannelId => &self.slack_channel_ids,
            IdentifierKind::GithubRepo => &self.github_repos,
            IdentifierKind::CoralogixTeamName => &self.coralogix_team_names,
            IdentifierKind::IncidentioAlertSourceId => &self.incidentio_alert_source_ids,
            IdentifierKind::Service => &self.services,
        }
    }
}

/// Credentials and metadata for one integration.
///
/// `api_key` is the primary secret for most integrations; the rest of
/// the shape varies per provider and is kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_trial: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_attribution: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl IntegrationConfig {
    /// Fetch a string field from the provider-specific extras.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedicated_service_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl TeamConfig {
    /// Build a routing-index entry for this team.
    pub fn route(&self, org: &str, team: &str) -> TeamRoute {
        let mut route = TeamRoute::new(org, team);
        for kind in ROUTING_PRIORITY {
            let values = self.routing.values(kind);
            if !values.is_empty() {
                route = route.with_values(kind, values.iter().map(String::as_str));
            }
        }
        route
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_effective_config_with_extras() {
        let raw = serde_json::json!({
            "routing": {"slack_channel_ids": ["C1"], "services": ["Payments"]},
            "integrations": {
                "coralogix": {"api_key": "k", "domain": "eu2.coralogix.com"},
                "anthropic": {"api_key": "sk", "is_trial": true}
            },
            "ai_pipeline": {"enabled": true, "schedule": "0 2 * * *"},
            "llm": {"model": "openai/gpt-4o"}
        });
        let cfg: TeamConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(cfg.routing.slack_channel_ids, vec!["C1"]);
        assert_eq!(
            cfg.integrations["coralogix"].extra_str("domain"),
            Some("eu2.coralogix.com")
        );
        assert_eq!(cfg.integrations["anthropic"].is_trial, Some(true));
        assert_eq!(cfg.llm.model.as_deref(), Some("openai/gpt-4o"));
    }

    #[test]
    fn route_normalizes_text_kinds() {
        let cfg: TeamConfig = serde_json::from_value(serde_json::json!({
            "routing": {"services": ["Payments"], "slack_channel_ids": ["C1"]}
        }))
        .unwrap();
        let route = cfg.route("acme", "core");
        let idx = crate::routing::RoutingIndex::new(vec![route]);
        let mut ids = std::collections::HashMap::new();
        ids.insert("service".to_string(), "payments".to_string());
        assert!(idx.lookup(Some("acme"), &ids).found);
    }
}
