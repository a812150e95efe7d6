//! CronJob reconciliation for AI-pipeline and dependency-discovery jobs.

use serde_json::{json, Value};

use ifox_domain::{Error, Result};

use crate::names::{labels, resource_name};
use crate::KubeClient;

/// Which scheduled job a CronJob runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronKind {
    Pipeline,
    DependencyDiscovery,
}

impl CronKind {
    pub fn suffix(self) -> &'static str {
        match self {
            CronKind::Pipeline => "pipeline",
            CronKind::DependencyDiscovery => "depdiscovery",
        }
    }

    pub fn component(self) -> &'static str {
        match self {
            CronKind::Pipeline => "ai-pipeline",
            CronKind::DependencyDiscovery => "dependency-discovery",
        }
    }

    pub fn default_schedule(self) -> &'static str {
        match self {
            CronKind::Pipeline => "0 2 * * *",
            CronKind::DependencyDiscovery => "0 */2 * * *",
        }
    }
}

/// Build the CronJob manifest for a team.
pub fn cronjob_manifest(
    kind: CronKind,
    org: &str,
    team: &str,
    schedule: &str,
    namespace: &str,
    image: &str,
) -> Value {
    let name = resource_name(org, team, kind.suffix());
    json!({
        "apiVersion": "batch/v1",
        "kind": "CronJob",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": labels(org, team, kind.component()),
        },
        "spec": {
            "schedule": schedule,
            "concurrencyPolicy": "Forbid",
            "successfulJobsHistoryLimit": 3,
            "failedJobsHistoryLimit": 3,
            "jobTemplate": {
                "spec": {
                    "template": {
                        "metadata": {"labels": labels(org, team, kind.component())},
                        "spec": {
                            "restartPolicy": "Never",
                            "containers": [{
                                "name": kind.component(),
                                "image": image,
                                "env": [
                                    {"name": "IFOX_ORG_ID", "value": org},
                                    {"name": "IFOX_TEAM_NODE_ID", "value": team},
                                    {"name": "IFOX_JOB_KIND", "value": kind.component()},
                                ],
                            }],
                        },
                    },
                },
            },
        },
    })
}

/// Create or update a team CronJob. Existing jobs are replaced so
/// schedule changes take effect.
pub async fn create_or_update_cronjob(
    client: &KubeClient,
    kind: CronKind,
    org: &str,
    team: &str,
    schedule: &str,
    image: &str,
) -> Result<Value> {
    let namespace = client.namespace.clone();
    let name = resource_name(org, team, kind.suffix());
    let manifest = cronjob_manifest(kind, org, team, schedule, &namespace, image);
    let base = format!("/apis/batch/v1/namespaces/{namespace}/cronjobs");

    let action = match client.post(&base, &manifest).await {
        Ok(_) => "created",
        Err(Error::Conflict(_)) => {
            client
                .put(&format!("{base}/{name}"), &manifest)
                .await?;
            "updated"
        }
        Err(e) => return Err(e),
    };

    tracing::info!(org, team, kind = kind.component(), schedule, action, "cronjob reconciled");
    Ok(json!({
        "name": name,
        "namespace": namespace,
        "schedule": schedule,
        "action": action,
    }))
}

/// Delete a team CronJob. A missing job is reported, not an error.
pub async fn delete_cronjob(
    client: &KubeClient,
    kind: CronKind,
    org: &str,
    team: &str,
) -> Result<Value> {
    let namespace = client.namespace.clone();
    let name = resource_name(org, team, kind.suffix());
    let path = format!("/apis/batch/v1/namespaces/{namespace}/cronjobs/{name}");
    match client.delete(&path).await {
        Ok(_) => Ok(json!({"deleted": true, "name": name})),
        Err(Error::NotFound(_)) => Ok(json!({"deleted": false, "reason": "not_found"})),
        Err(e) => Err(e),
    }
}

/// Read a team CronJob's status. `None` when it does not exist.
pub async fn get_cronjob(
    client: &KubeClient,
    kind: CronKind,
    org: &str,
    team: &str,
) -> Result<Option<Value>> {
    let namespace = client.namespace.clone();
    let name = resource_name(org, team, kind.suffix());
    let path = format!("/apis/batch/v1/namespaces/{namespace}/cronjobs/{name}");
    match client.get(&path).await {
        Ok(obj) => Ok(Some(summarize_cronjob(&obj))),
        Err(Error::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Compact status shape for admin endpoints.
pub fn summarize_cronjob(obj: &Value) -> Value {
    json!({
        "name": obj.pointer("/metadata/name"),
        "namespace": obj.pointer("/metadata/namespace"),
        "schedule": obj.pointer("/spec/schedule"),
        "suspended": obj.pointer("/spec/suspend").and_then(Value::as_bool).unwrap_or(false),
        "last_schedule_time": obj.pointer("/status/lastScheduleTime"),
        "active_jobs": obj
            .pointer("/status/active")
            .and_then(Value::as_array)
            .map(|a| a.len())
            .unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_names_and_labels_follow_convention() {
        let m = cronjob_manifest(
            CronKind::Pipeline,
            "acme",
            "core",
            "0 2 * * *",
            "infrafox",
            "infrafox/ai-pipeline:latest",
        );
        assert_eq!(m["metadata"]["name"], "ifox-acme-core-pipeline");
        assert_eq!(m["metadata"]["labels"]["component"], "ai-pipeline");
        assert_eq!(m["spec"]["schedule"], "0 2 * * *");
        assert_eq!(m["spec"]["concurrencyPolicy"], "Forbid");
    }

    #[test]
    fn dependency_discovery_has_its_own_suffix() {
        let m = cronjob_manifest(
            CronKind::DependencyDiscovery,
            "acme",
            "core",
            "0 */2 * * *",
            "infrafox",
            "img",
        );
        assert_eq!(m["metadata"]["name"], "ifox-acme-core-depdiscovery");
    }

    #[test]
    fn summarize_extracts_status_fields() {
        let obj = serde_json::json!({
            "metadata": {"name": "ifox-acme-core-pipeline", "namespace": "infrafox"},
            "spec": {"schedule": "0 2 * * *", "suspend": false},
            "status": {"lastScheduleTime": "2026-07-30T02:00:00Z", "active": [{}, {}]},
        });
        let s = summarize_cronjob(&obj);
        assert_eq!(s["schedule"], "0 2 * * *");
        assert_eq!(s["active_jobs"], 2);
        assert_eq!(s["suspended"], false);
    }
}
