//! Routing index — maps external identifiers to `(org, team)`.
//!
//! Lookup walks identifier kinds in a fixed priority order and returns
//! the first team whose routing index contains the normalized value.
//! Text kinds are compared case-insensitively after trimming; id kinds
//! are compared verbatim. No fuzzy matching.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Identifier kinds, in lookup priority order (highest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    IncidentioTeamId,
    PagerdutyServiceId,
    SlackChannelId,
    GithubRepo,
    CoralogixTeamName,
    IncidentioAlertSourceId,
    Service,
}

/// Fixed lookup priority.
pub const ROUTING_PRIORITY: [IdentifierKind; 7] = [
    IdentifierKind::IncidentioTeamId,
    IdentifierKind::PagerdutyServiceId,
    IdentifierKind::SlackChannelId,
    IdentifierKind::GithubRepo,
    IdentifierKind::CoralogixTeamName,
    IdentifierKind::IncidentioAlertSourceId,
    IdentifierKind::Service,
];

impl IdentifierKind {
    /// Singular wire name used in lookup requests and `matched_by`.
    pub fn as_str(self) -> &'static str {
        match self {
            IdentifierKind::IncidentioTeamId => "incidentio_team_id",
            IdentifierKind::PagerdutyServiceId => "pagerduty_service_id",
            IdentifierKind::SlackChannelId => "slack_channel_id",
            IdentifierKind::GithubRepo => "github_repo",
            IdentifierKind::CoralogixTeamName => "coralogix_team_name",
            IdentifierKind::IncidentioAlertSourceId => "incidentio_alert_source_id",
            IdentifierKind::Service => "service",
        }
    }

    /// Plural key under `routing.*` in team configs.
    pub fn config_key(self) -> &'static str {
        match self {
            IdentifierKind::IncidentioTeamId => "incidentio_team_ids",
            IdentifierKind::PagerdutyServiceId => "pagerduty_service_ids",
            IdentifierKind::SlackChannelId => "slack_channel_ids",
            IdentifierKind::GithubRepo => "github_repos",
            IdentifierKind::CoralogixTeamName => "coralogix_team_names",
            IdentifierKind::IncidentioAlertSourceId => "incidentio_alert_source_ids",
            IdentifierKind::Service => "services",
        }
    }

    /// Text kinds normalize to trimmed lowercase; id kinds match verbatim.
    pub fn is_text(self) -> bool {
        matches!(
            self,
            IdentifierKind::GithubRepo
                | IdentifierKind::CoralogixTeamName
                | IdentifierKind::Service
        )
    }

    /// Normalize a value for this kind.
    pub fn normalize(self, value: &str) -> String {
        if self.is_text() {
            value.trim().to_lowercase()
        } else {
            value.to_string()
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        ROUTING_PRIORITY.iter().copied().find(|k| k.as_str() == s)
    }
}

/// One team's routing entries, values pre-normalized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamRoute {
    pub org: String,
    pub team: String,
    #[serde(default)]
    pub indices: HashMap<IdentifierKind, HashSet<String>>,
}

impl TeamRoute {
    pub fn new(org: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            team: team.into(),
            indices: HashMap::new(),
        }
    }

    pub fn with_values<I, S>(mut self, kind: IdentifierKind, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = self
            .indices
            .entry(kind)
            .or_default();
        for v in values {
            set.insert(kind.normalize(v.as_ref()));
        }
        self
    }

    fn contains(&self, kind: IdentifierKind, normalized: &str) -> bool {
        self.indices
            .get(&kind)
            .is_some_and(|set| set.contains(normalized))
    }
}

/// Result of a routing lookup.
#[derive(Debug, Clone, Serialize)]
pub struct RouteLookup {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_value: Option<String>,
    /// Identifier kinds attempted, in priority order.
    pub tried: Vec<String>,
}

/// Priority-ordered lookup table over team routes.
///
/// Routes keep their insertion order, so ties within a kind resolve to
/// the first team registered — stable across queries.
#[derive(Debug, Clone, Default)]
pub struct RoutingIndex {
    routes: Vec<TeamRoute>,
}

impl RoutingIndex {
    pub fn new(routes: Vec<TeamRoute>) -> Self {
        Self { routes }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolve identifiers to a team.
    ///
    /// Kinds are attempted strictly in `ROUTING_PRIORITY` order; the
    /// first kind present in `identifiers` that matches any route wins.
    /// `tried` records every kind attempted up to and including the one
    /// that matched.
    pub fn lookup(
        &self,
        org: Option<&str>,
        identifiers: &HashMap<String, String>,
    ) -> RouteLookup {
        let mut tried = Vec::new();

        for kind in ROUTING_PRIORITY {
            let Some(raw) = identifiers.get(kind.as_str()) else {
                continue;
            };
            tried.push(kind.as_str().to_string());
            let normalized = kind.normalize(raw);

            for route in &self.routes {
                if let Some(org) = org {
                    if route.org != org {
                        continue;
                    }
                }
                if route.contains(kind, &normalized) {
                    return RouteLookup {
                        found: true,
                        org: Some(route.org.clone()),
                        team: Some(route.team.clone()),
                        matched_by: Some(kind.as_str().to_string()),
                        matched_value: Some(normalized),
                        tried,
                    };
                }
            }
        }

        RouteLookup {
            found: false,
            org: None,
            team: None,
            matched_by: None,
            matched_value: None,
            tried,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> RoutingIndex {
        RoutingIndex::new(vec![
            TeamRoute::new("acme", "a")
                .with_values(IdentifierKind::IncidentioTeamId, ["T1"]),
            TeamRoute::new("acme", "b")
                .with_values(IdentifierKind::SlackChannelId, ["C1"]),
        ])
    }

    fn ids(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn higher_priority_kind_wins() {
        let result = index().lookup(
            None,
            &ids(&[("incidentio_team_id", "T1"), ("slack_channel_id", "C1")]),
        );
        assert!(result.found);
        assert_eq!(result.team.as_deref(), Some("a"));
        assert_eq!(result.matched_by.as_deref(), Some("incidentio_team_id"));
        // The first kind matched, so only it was tried.
        assert_eq!(result.tried, vec!["incidentio_team_id"]);
    }

    #[test]
    fn lower_priority_match_records_all_tried_kinds() {
        let result = index().lookup(
            None,
            &ids(&[("incidentio_team_id", "T9"), ("slack_channel_id", "C1")]),
        );
        assert!(result.found);
        assert_eq!(result.team.as_deref(), Some("b"));
        assert_eq!(
            result.tried,
            vec!["incidentio_team_id", "slack_channel_id"]
        );
    }

    #[test]
    fn text_kinds_normalize_case_and_whitespace() {
        let idx = RoutingIndex::new(vec![
            TeamRoute::new("acme", "web")
                .with_values(IdentifierKind::GithubRepo, ["Acme/Web-App"]),
        ]);
        let result = idx.lookup(None, &ids(&[("github_repo", "  acme/web-app ")]));
        assert!(result.found);
        assert_eq!(result.matched_value.as_deref(), Some("acme/web-app"));
    }

    #[test]
    fn id_kinds_are_exact_match() {
        let result = index().lookup(None, &ids(&[("slack_channel_id", "c1")]));
        assert!(!result.found, "channel ids must not be lowercased");
    }

    #[test]
    fn org_scope_filters_routes() {
        let result = index().lookup(Some("other"), &ids(&[("slack_channel_id", "C1")]));
        assert!(!result.found);
        assert_eq!(result.tried, vec!["slack_channel_id"]);
    }

    #[test]
    fn ties_resolve_to_first_registered_team() {
        let idx = RoutingIndex::new(vec![
            TeamRoute::new("acme", "first")
                .with_values(IdentifierKind::Service, ["payments"]),
            TeamRoute::new("acme", "second")
                .with_values(IdentifierKind::Service, ["payments"]),
        ]);
        for _ in 0..3 {
            let result = idx.lookup(None, &ids(&[("service", "payments")]));
            assert_eq!(result.team.as_deref(), Some("first"));
        }
    }

    #[test]
    fn no_identifiers_yields_empty_tried() {
        let result = index().lookup(None, &HashMap::new());
        assert!(!result.found);
        assert!(result.tried.is_empty());
    }
}
