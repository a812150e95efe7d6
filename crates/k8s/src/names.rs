//! Resource naming and labels for managed workloads.
//!
//! Everything the orchestrator creates is named
//! `ifox-{org}-{team}-{kind}` and labeled with `org`, `team`, and
//! `component` so deprovisioning can find it again.

/// Kubernetes object names must be DNS-1123: lowercase alphanumerics
/// and dashes, max 63 chars.
pub(crate) fn sanitize(part: &str) -> String {
    let mut out: String = part
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    while out.contains("--") {
        out = out.replace("--", "-");
    }
    out.trim_matches('-').to_string()
}

/// Build the managed resource name for `(org, team, kind)`.
pub fn resource_name(org: &str, team: &str, kind: &str) -> String {
    let name = format!("ifox-{}-{}-{}", sanitize(org), sanitize(team), kind);
    if name.len() <= 63 {
        return name;
    }
    // Keep the prefix and kind; squeeze org/team to fit.
    let budget = 63 - "ifox---".len() - kind.len();
    let org_part: String = sanitize(org).chars().take(budget / 2).collect();
    let team_part: String = sanitize(team).chars().take(budget - org_part.len()).collect();
    format!(
        "ifox-{}-{}-{kind}",
        org_part.trim_matches('-'),
        team_part.trim_matches('-')
    )
}

/// Standard labels for managed objects.
pub fn labels(org: &str, team: &str, component: &str) -> serde_json::Value {
    serde_json::json!({
        "app.kubernetes.io/managed-by": "infrafox",
        "org": sanitize(org),
        "team": sanitize(team),
        "component": component,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_names_compose() {
        assert_eq!(
            resource_name("acme", "core", "pipeline"),
            "ifox-acme-core-pipeline"
        );
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(
            resource_name("Acme Corp", "core_team", "agent"),
            "ifox-acme-corp-core-team-agent"
        );
    }

    #[test]
    fn long_names_fit_the_k8s_limit() {
        let name = resource_name(&"a".repeat(60), &"b".repeat(60), "depdiscovery");
        assert!(name.len() <= 63, "{name} is {} chars", name.len());
        assert!(name.starts_with("ifox-"));
        assert!(name.ends_with("-depdiscovery"));
    }

    #[test]
    fn labels_carry_org_team_component() {
        let l = labels("Acme", "core", "pipeline");
        assert_eq!(l["org"], "acme");
        assert_eq!(l["team"], "core");
        assert_eq!(l["component"], "pipeline");
    }
}
