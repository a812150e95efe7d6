//! Dedicated agent Deployment + Service management.

use serde_json::{json, Value};

use ifox_domain::{Error, Result};

use crate::names::{labels, resource_name};
use crate::KubeClient;

/// Manifest pair for a team's dedicated agent.
pub fn deployment_manifest(
    org: &str,
    team: &str,
    namespace: &str,
    image: &str,
    port: u16,
) -> (Value, Value) {
    let name = resource_name(org, team, "agent");
    let selector = json!({
        "org": crate::names::sanitize(org),
        "team": crate::names::sanitize(team),
        "component": "agent",
    });
    let deployment = json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": labels(org, team, "agent"),
        },
        "spec": {
            "replicas": 1,
            "selector": {"matchLabels": selector},
            "template": {
                "metadata": {"labels": labels(org, team, "agent")},
                "spec": {
                    "containers": [{
                        "name": "agent",
                        "image": image,
                        "ports": [{"containerPort": port}],
                        "env": [
                            {"name": "IFOX_ORG_ID", "value": org},
                            {"name": "IFOX_TEAM_NODE_ID", "value": team},
                        ],
                    }],
                },
            },
        },
    });
    let service = json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": labels(org, team, "agent"),
        },
        "spec": {
            "selector": selector,
            "ports": [{"port": port, "targetPort": port}],
        },
    });
    (deployment, service)
}

/// In-cluster URL of a dedicated agent service.
pub fn service_url(name: &str, namespace: &str, port: u16) -> String {
    format!("http://{name}.{namespace}.svc.cluster.local:{port}")
}

/// Create (or keep) the dedicated Deployment + Service for a team.
/// Returns `{name, namespace, service_url}`.
pub async fn create_dedicated_agent(
    client: &KubeClient,
    org: &str,
    team: &str,
    image: &str,
    port: u16,
) -> Result<Value> {
    let namespace = client.namespace.clone();
    let name = resource_name(org, team, "agent");
    let (deployment, service) = deployment_manifest(org, team, &namespace, image, port);

    let deploy_path = format!("/apis/apps/v1/namespaces/{namespace}/deployments");
    match client.post(&deploy_path, &deployment).await {
        Ok(_) | Err(Error::Conflict(_)) => {}
        Err(e) => return Err(e),
    }
    let svc_path = format!("/api/v1/namespaces/{namespace}/services");
    match client.post(&svc_path, &service).await {
        Ok(_) | Err(Error::Conflict(_)) => {}
        Err(e) => return Err(e),
    }

    let url = service_url(&name, &namespace, port);
    tracing::info!(org, team, name = %name, "dedicated agent deployment ready");
    Ok(json!({"name": name, "namespace": namespace, "service_url": url}))
}

/// Delete the dedicated Deployment + Service. Missing objects are
/// reported as `not_found`, never as errors.
pub async fn delete_dedicated_agent(client: &KubeClient, org: &str, team: &str) -> Result<Value> {
    let namespace = client.namespace.clone();
    let name = resource_name(org, team, "agent");

    let mut result = serde_json::Map::new();
    match client
        .delete(&format!(
            "/apis/apps/v1/namespaces/{namespace}/deployments/{name}"
        ))
        .await
    {
        Ok(_) => {
            result.insert("deployment_deleted".into(), Value::Bool(true));
        }
        Err(Error::NotFound(_)) => {
            result.insert("deployment_deleted".into(), Value::Bool(false));
            result.insert("deployment_reason".into(), Value::String("not_found".into()));
        }
        Err(e) => return Err(e),
    }
    match client
        .delete(&format!("/api/v1/namespaces/{namespace}/services/{name}"))
        .await
    {
        Ok(_) => {
            result.insert("service_deleted".into(), Value::Bool(true));
        }
        Err(Error::NotFound(_)) => {
            result.insert("service_deleted".into(), Value::Bool(false));
            result.insert("service_reason".into(), Value::String("not_found".into()));
        }
        Err(e) => return Err(e),
    }
    Ok(Value::Object(result))
}

/// Status of a team's dedicated deployment, `None` when it does not exist.
pub async fn get_dedicated_agent(
    client: &KubeClient,
    org: &str,
    team: &str,
    port: u16,
) -> Result<Option<Value>> {
    let namespace = client.namespace.clone();
    let name = resource_name(org, team, "agent");
    let path = format!("/apis/apps/v1/namespaces/{namespace}/deployments/{name}");
    match client.get(&path).await {
        Ok(obj) => Ok(Some(summarize_deployment(&obj, port))),
        Err(Error::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Compact deployment-status shape for admin endpoints.
pub fn summarize_deployment(obj: &Value, port: u16) -> Value {
    let name = obj
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let namespace = obj
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .unwrap_or_default();
    json!({
        "name": name,
        "namespace": namespace,
        "replicas": obj.pointer("/spec/replicas"),
        "ready_replicas": obj.pointer("/status/readyReplicas").and_then(Value::as_u64).unwrap_or(0),
        "available_replicas": obj.pointer("/status/availableReplicas").and_then(Value::as_u64).unwrap_or(0),
        "service_url": service_url(name, namespace, port),
        "conditions": obj.pointer("/status/conditions").cloned().unwrap_or(Value::Array(vec![])),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifests_share_name_and_selector() {
        let (deployment, service) = deployment_manifest("acme", "core", "infrafox", "img", 8000);
        assert_eq!(deployment["metadata"]["name"], "ifox-acme-core-agent");
        assert_eq!(service["metadata"]["name"], "ifox-acme-core-agent");
        assert_eq!(
            deployment["spec"]["selector"]["matchLabels"],
            service["spec"]["selector"]
        );
    }

    #[test]
    fn service_url_shape() {
        assert_eq!(
            service_url("ifox-acme-core-agent", "infrafox", 8000),
            "http://ifox-acme-core-agent.infrafox.svc.cluster.local:8000"
        );
    }

    #[test]
    fn summarize_defaults_missing_status_to_zero() {
        let obj = serde_json::json!({
            "metadata": {"name": "ifox-acme-core-agent", "namespace": "infrafox"},
            "spec": {"replicas": 1},
        });
        let s = summarize_deployment(&obj, 8000);
        assert_eq!(s["ready_replicas"], 0);
        assert_eq!(s["replicas"], 1);
    }
}
