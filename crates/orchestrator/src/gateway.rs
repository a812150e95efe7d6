//! SSE command gateway — the control channel to in-cluster agents.
//!
//! Each connected agent holds a long-lived SSE response. Commands are
//! fanned in through the [`CommandBroker`], which correlates them with
//! the agent's `POST /gateway/agent/response/{request_id}` callbacks
//! via one-shot channels and enforces the per-command timeout. A
//! cluster is live exactly while its SSE task holds the channel
//! receiver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use ifox_domain::{Error, Result};

use crate::state::AppState;

/// A command queued for delivery to an agent.
#[derive(Debug, Clone)]
pub struct GatewayCommand {
    pub request_id: String,
    pub command: String,
    pub params: Value,
}

/// Result delivered by the agent.
#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub ok: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

pub struct CommandBroker {
    clusters: Mutex<HashMap<String, mpsc::Sender<GatewayCommand>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<CommandResponse>>>,
    timeout: Duration,
}

impl CommandBroker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            clusters: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Register a cluster connection; the previous connection for the
    /// same cluster id is superseded.
    pub fn register(&self, cluster_id: &str) -> mpsc::Receiver<GatewayCommand> {
        let (tx, rx) = mpsc::channel(32);
        self.clusters.lock().insert(cluster_id.to_string(), tx);
        tracing::info!(cluster_id, "cluster connected");
        rx
    }

    pub fn unregister(&self, cluster_id: &str) {
        self.clusters.lock().remove(cluster_id);
        tracing::info!(cluster_id, "cluster disconnected");
    }

    pub fn is_live(&self, cluster_id: &str) -> bool {
        self.clusters.lock().contains_key(cluster_id)
    }

    pub fn live_clusters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clusters.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Send a command to a cluster and wait for its response.
    pub async fn dispatch(&self, cluster_id: &str, command: &str, params: Value) -> Result<Value> {
        let request_id = Uuid::new_v4().simple().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        let sender = self.clusters.lock().get(cluster_id).cloned();
        let Some(sender) = sender else {
            self.pending.lock().remove(&request_id);
            return Err(Error::NotFound(format!("cluster not connected: {cluster_id}")));
        };

        let queued = sender
            .send(GatewayCommand {
                request_id: request_id.clone(),
                command: command.to_string(),
                params,
            })
            .await;
        if queued.is_err() {
            self.pending.lock().remove(&request_id);
            return Err(Error::NotFound(format!("cluster not connected: {cluster_id}")));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) if response.ok => Ok(response.result.unwrap_or(Value::Null)),
            Ok(Ok(response)) => Err(Error::Upstream(
                response.error.unwrap_or_else(|| "command failed".into()),
            )),
            Ok(Err(_)) => Err(Error::Upstream("agent dropped the command".into())),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(Error::Timeout(format!("command {command} to {cluster_id}")))
            }
        }
    }

    /// Deliver an agent response. Returns false for unknown request ids
    /// (e.g. the broker already timed the command out).
    pub fn resolve(&self, request_id: &str, response: CommandResponse) -> bool {
        match self.pending.lock().remove(request_id) {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn agent_authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let expected = match std::env::var(&state.config.orchestrator.gateway.agent_token_env) {
        Ok(token) if !token.is_empty() => token,
        _ => return false,
    };
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    use sha2::Digest;
    sha2::Sha256::digest(provided.as_bytes()) == sha2::Sha256::digest(expected.as_bytes())
}

fn sse_event(event: &str, data: &Value) -> Bytes {
    Bytes::from(format!("event: {event}\ndata: {data}\n\n"))
}

/// `GET /gateway/agent/connect` — the long-lived agent stream.
pub async fn agent_connect(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !agent_authorized(&state, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({"error": "auth", "detail": "invalid agent token"})),
        )
            .into_response();
    }

    let cluster_id = params
        .get("cluster_name")
        .cloned()
        .unwrap_or_else(|| "default".to_string());
    tracing::info!(
        cluster_id = %cluster_id,
        agent_version = params.get("agent_version"),
        kubernetes_version = params.get("kubernetes_version"),
        "agent connecting"
    );

    let mut commands = state.broker.register(&cluster_id);
    let broker = state.broker.clone();
    let heartbeat = Duration::from_secs(
        state
            .config
            .orchestrator
            .gateway
            .heartbeat_interval_seconds,
    );

    // Unregisters when the SSE task is dropped (client disconnect).
    struct Registration {
        broker: Arc<CommandBroker>,
        cluster_id: String,
    }
    impl Drop for Registration {
        fn drop(&mut self) {
            self.broker.unregister(&self.cluster_id);
        }
    }
    let registration = Registration {
        broker: broker.clone(),
        cluster_id: cluster_id.clone(),
    };

    let body = Body::from_stream(async_stream::stream! {
        let _registration = registration;

        yield Ok::<_, std::io::Error>(sse_event(
            "connected",
            &json!({
                "cluster_id": cluster_id,
                "message": "connected to command gateway",
            }),
        ));

        let mut ticker = tokio::time::interval(heartbeat);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    tracing::info!(
                        request_id = %command.request_id,
                        command = %command.command,
                        "delivering command"
                    );
                    yield Ok(sse_event(
                        "command",
                        &json!({
                            "request_id": command.request_id,
                            "command": command.command,
                            "params": command.params,
                        }),
                    ));
                }
                _ = ticker.tick() => {
                    yield Ok(sse_event(
                        "heartbeat",
                        &json!({"timestamp": chrono::Utc::now().to_rfc3339()}),
                    ));
                }
            }
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// `POST /api/v1/internal/cluster/command` — dispatch one executor
/// command to a connected cluster and wait for its result. Used by the
/// agent runtime's Kubernetes tools.
pub async fn cluster_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    // Internal callers share the orchestrator's internal token.
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if state.internal_token().as_deref() != Some(provided) || provided.is_empty() {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({"error": "auth", "detail": "invalid internal token"})),
        )
            .into_response();
    }

    let cluster = body
        .get("cluster")
        .and_then(Value::as_str)
        .unwrap_or("default");
    let command = body.get("command").and_then(Value::as_str).unwrap_or("");
    let params = body.get("params").cloned().unwrap_or(json!({}));

    match state.broker.dispatch(cluster, command, params).await {
        Ok(result) => axum::Json(json!({"ok": true, "result": result})).into_response(),
        Err(e) => {
            let status = StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                axum::Json(json!({"ok": false, "error": e.kind(), "detail": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// `POST /gateway/agent/response/{request_id}` — command results.
pub async fn agent_response(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    if !agent_authorized(&state, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({"error": "auth", "detail": "invalid agent token"})),
        )
            .into_response();
    }

    let response = CommandResponse {
        ok: body.get("ok").and_then(Value::as_bool).unwrap_or(false),
        result: body.get("result").cloned(),
        error: body
            .get("error")
            .and_then(Value::as_str)
            .map(String::from),
    };
    let delivered = state.broker.resolve(&request_id, response);
    if !delivered {
        tracing::warn!(request_id = %request_id, "response for unknown or expired request");
    }
    axum::Json(json!({"accepted": delivered})).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_resolves_via_response() {
        let broker = Arc::new(CommandBroker::new(Duration::from_secs(5)));
        let mut rx = broker.register("prod");

        let dispatcher = broker.clone();
        let handle = tokio::spawn(async move {
            dispatcher
                .dispatch("prod", "list_pods", json!({"namespace": "prod"}))
                .await
        });

        let command = rx.recv().await.unwrap();
        assert_eq!(command.command, "list_pods");
        assert!(broker.resolve(
            &command.request_id,
            CommandResponse {
                ok: true,
                result: Some(json!({"pod_count": 3})),
                error: None,
            },
        ));

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result["pod_count"], 3);
    }

    #[tokio::test]
    async fn dispatch_to_unknown_cluster_fails_fast() {
        let broker = CommandBroker::new(Duration::from_secs(5));
        let err = broker
            .dispatch("missing", "list_pods", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn dispatch_times_out_without_response() {
        let broker = Arc::new(CommandBroker::new(Duration::from_millis(50)));
        let _rx = broker.register("prod");
        let err = broker
            .dispatch("prod", "list_pods", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }

    #[tokio::test]
    async fn agent_error_surfaces_as_upstream() {
        let broker = Arc::new(CommandBroker::new(Duration::from_secs(5)));
        let mut rx = broker.register("prod");

        let dispatcher = broker.clone();
        let handle =
            tokio::spawn(async move { dispatcher.dispatch("prod", "drop_db", json!({})).await });

        let command = rx.recv().await.unwrap();
        broker.resolve(
            &command.request_id,
            CommandResponse {
                ok: false,
                result: None,
                error: Some("unknown command".into()),
            },
        );
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("unknown command"));
    }

    #[tokio::test]
    async fn liveness_follows_registration() {
        let broker = CommandBroker::new(Duration::from_secs(1));
        assert!(!broker.is_live("prod"));
        let _rx = broker.register("prod");
        assert!(broker.is_live("prod"));
        broker.unregister("prod");
        assert!(!broker.is_live("prod"));
    }

    #[tokio::test]
    async fn late_response_is_rejected() {
        let broker = CommandBroker::new(Duration::from_secs(1));
        assert!(!broker.resolve(
            "ghost",
            CommandResponse {
                ok: true,
                result: None,
                error: None,
            },
        ));
    }
}
