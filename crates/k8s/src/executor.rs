//! Command executor for the in-cluster agent.
//!
//! The gateway delivers a command name plus params; the executor maps
//! it onto one of a closed set of Kubernetes reads and serializes the
//! result into the compact shape the control plane expects. Every API
//! call inherits the client's 15 second deadline.

use serde_json::{json, Value};

use ifox_domain::{Error, Result};

use crate::KubeClient;

/// The closed set of commands the executor understands.
pub const COMMANDS: [&str; 6] = [
    "list_pods",
    "get_pod_logs",
    "describe_pod",
    "get_pod_events",
    "describe_deployment",
    "list_namespaces",
];

pub struct CommandExecutor {
    client: KubeClient,
}

impl CommandExecutor {
    pub fn new(client: KubeClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &KubeClient {
        &self.client
    }

    /// Execute one command. Unknown names are rejected without touching
    /// the API server.
    pub async fn execute(&self, command: &str, params: &Value) -> Result<Value> {
        let namespace = params
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or("default");

        match command {
            "list_pods" => {
                let mut path = format!("/api/v1/namespaces/{namespace}/pods");
                if let Some(selector) = params.get("label_selector").and_then(Value::as_str) {
                    path = format!("{path}?labelSelector={selector}");
                }
                let list = self.client.get(&path).await?;
                Ok(summarize_pod_list(namespace, &list))
            }
            "get_pod_logs" => {
                let pod = required_str(params, "pod_name")?;
                let tail = params
                    .get("tail_lines")
                    .and_then(Value::as_u64)
                    .unwrap_or(100);
                let mut path =
                    format!("/api/v1/namespaces/{namespace}/pods/{pod}/log?tailLines={tail}");
                if let Some(container) = params.get("container").and_then(Value::as_str) {
                    path = format!("{path}&container={container}");
                }
                if params.get("previous").and_then(Value::as_bool) == Some(true) {
                    path = format!("{path}&previous=true");
                }
                let logs = self.client.get_text(&path).await?;
                Ok(json!({
                    "pod_name": pod,
                    "namespace": namespace,
                    "container": params.get("container"),
                    "logs": logs,
                    "line_count": if logs.is_empty() { 0 } else { logs.lines().count() },
                }))
            }
            "describe_pod" => {
                let pod = required_str(params, "pod_name")?;
                let obj = self
                    .client
                    .get(&format!("/api/v1/namespaces/{namespace}/pods/{pod}"))
                    .await?;
                Ok(summarize_pod(&obj))
            }
            "get_pod_events" => {
                let pod = required_str(params, "pod_name")?;
                let list = self
                    .client
                    .get(&format!(
                        "/api/v1/namespaces/{namespace}/events?fieldSelector=involvedObject.name%3D{pod}"
                    ))
                    .await?;
                Ok(summarize_events(pod, namespace, &list))
            }
            "describe_deployment" => {
                let deployment = required_str(params, "deployment_name")?;
                let obj = self
                    .client
                    .get(&format!(
                        "/apis/apps/v1/namespaces/{namespace}/deployments/{deployment}"
                    ))
                    .await?;
                Ok(summarize_deployment_detail(&obj))
            }
            "list_namespaces" => {
                let list = self.client.get("/api/v1/namespaces").await?;
                Ok(summarize_namespaces(&list))
            }
            _ => Err(Error::NotFound("unknown command".into())),
        }
    }
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Config(format!("missing parameter: {key}")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result shaping (pure)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn items(list: &Value) -> &[Value] {
    list.get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn container_statuses(pod: &Value) -> &[Value] {
    pod.pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn ready_string(pod: &Value) -> String {
    let total = pod
        .pointer("/spec/containers")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    let ready = container_statuses(pod)
        .iter()
        .filter(|cs| cs.get("ready").and_then(Value::as_bool) == Some(true))
        .count();
    format!("{ready}/{total}")
}

fn restart_count(pod: &Value) -> u64 {
    container_statuses(pod)
        .iter()
        .filter_map(|cs| cs.get("restartCount").and_then(Value::as_u64))
        .sum()
}

fn conditions(obj: &Value) -> Value {
    let conds = obj
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|c| {
                    json!({
                        "type": c.get("type"),
                        "status": c.get("status"),
                        "reason": c.get("reason"),
                        "message": c.get("message"),
                    })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Value::Array(conds)
}

pub(crate) fn summarize_pod_list(namespace: &str, list: &Value) -> Value {
    let pods: Vec<Value> = items(list)
        .iter()
        .map(|pod| {
            json!({
                "name": pod.pointer("/metadata/name"),
                "namespace": pod.pointer("/metadata/namespace"),
                "status": pod.pointer("/status/phase"),
                "ready": ready_string(pod),
                "restarts": restart_count(pod),
                "node": pod.pointer("/spec/nodeName"),
                "created_at": pod.pointer("/metadata/creationTimestamp"),
            })
        })
        .collect();
    json!({
        "namespace": namespace,
        "pod_count": pods.len(),
        "pods": pods,
    })
}

pub(crate) fn summarize_pod(pod: &Value) -> Value {
    let containers: Vec<Value> = pod
        .pointer("/spec/containers")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|c| {
                    let name = c.get("name").and_then(Value::as_str).unwrap_or_default();
                    let status = container_statuses(pod)
                        .iter()
                        .find(|cs| cs.get("name").and_then(Value::as_str) == Some(name));
                    json!({
                        "name": name,
                        "image": c.get("image"),
                        "ready": status
                            .and_then(|cs| cs.get("ready"))
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                        "restart_count": status
                            .and_then(|cs| cs.get("restartCount"))
                            .and_then(Value::as_u64)
                            .unwrap_or(0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "name": pod.pointer("/metadata/name"),
        "namespace": pod.pointer("/metadata/namespace"),
        "status": pod.pointer("/status/phase"),
        "node": pod.pointer("/spec/nodeName"),
        "ip": pod.pointer("/status/podIP"),
        "host_ip": pod.pointer("/status/hostIP"),
        "created_at": pod.pointer("/metadata/creationTimestamp"),
        "labels": pod.pointer("/metadata/labels").cloned().unwrap_or(json!({})),
        "annotations": pod.pointer("/metadata/annotations").cloned().unwrap_or(json!({})),
        "containers": containers,
        "conditions": conditions(pod),
    })
}

pub(crate) fn summarize_events(pod: &str, namespace: &str, list: &Value) -> Value {
    let mut events: Vec<&Value> = items(list).iter().collect();
    // Newest first.
    events.sort_by(|a, b| {
        let ts = |e: &&Value| {
            e.get("lastTimestamp")
                .or_else(|| e.get("firstTimestamp"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_owned()
        };
        ts(b).cmp(&ts(a))
    });
    let shaped: Vec<Value> = events
        .iter()
        .map(|e| {
            json!({
                "type": e.get("type"),
                "reason": e.get("reason"),
                "message": e.get("message"),
                "count": e.get("count"),
                "first_timestamp": e.get("firstTimestamp"),
                "last_timestamp": e.get("lastTimestamp"),
            })
        })
        .collect();
    json!({
        "pod_name": pod,
        "namespace": namespace,
        "event_count": shaped.len(),
        "events": shaped,
    })
}

pub(crate) fn summarize_deployment_detail(obj: &Value) -> Value {
    json!({
        "name": obj.pointer("/metadata/name"),
        "namespace": obj.pointer("/metadata/namespace"),
        "replicas": {
            "desired": obj.pointer("/spec/replicas"),
            "ready": obj.pointer("/status/readyReplicas").and_then(Value::as_u64).unwrap_or(0),
            "available": obj.pointer("/status/availableReplicas").and_then(Value::as_u64).unwrap_or(0),
            "updated": obj.pointer("/status/updatedReplicas").and_then(Value::as_u64).unwrap_or(0),
        },
        "strategy": obj.pointer("/spec/strategy/type"),
        "labels": obj.pointer("/metadata/labels").cloned().unwrap_or(json!({})),
        "selector": obj.pointer("/spec/selector/matchLabels").cloned().unwrap_or(json!({})),
        "created_at": obj.pointer("/metadata/creationTimestamp"),
        "conditions": conditions(obj),
    })
}

pub(crate) fn summarize_namespaces(list: &Value) -> Value {
    let namespaces: Vec<Value> = items(list)
        .iter()
        .map(|ns| {
            json!({
                "name": ns.pointer("/metadata/name"),
                "status": ns.pointer("/status/phase"),
                "created_at": ns.pointer("/metadata/creationTimestamp"),
            })
        })
        .collect();
    json!({
        "namespace_count": namespaces.len(),
        "namespaces": namespaces,
    })
}
