//! The long-lived SSE control channel to the gateway.
//!
//! The agent opens `GET /agent/connect`, executes `command` events
//! against the local Kubernetes API, and POSTs each result back to
//! `/agent/response/{request_id}`. Any stream error triggers a
//! reconnect with exponential backoff; the backoff resets after every
//! successful connection. Response delivery is best-effort — failures
//! are logged and never retried here; the control plane owns request
//! timeouts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{json, Value};

use ifox_domain::config::ClusterAgentConfig;
use ifox_domain::sse::drain_events;
use ifox_domain::{Error, Result};
use ifox_k8s::executor::CommandExecutor;

use crate::backoff::ReconnectBackoff;

pub struct GatewayConnection {
    config: ClusterAgentConfig,
    api_key: String,
    agent_version: String,
    executor: Arc<CommandExecutor>,
    http: reqwest::Client,
    running: Arc<AtomicBool>,
}

impl GatewayConnection {
    pub fn new(
        config: ClusterAgentConfig,
        api_key: String,
        agent_version: String,
        executor: Arc<CommandExecutor>,
    ) -> Result<Self> {
        // No overall timeout: the SSE stream lives for hours.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            config,
            api_key,
            agent_version,
            executor,
            http,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Handle used by the signal handler to stop the loop.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
            health_file: self.config.health_file.clone(),
        }
    }

    /// Run the connect loop until stopped.
    pub async fn run(&self) {
        self.running.store(true, Ordering::Release);
        let mut backoff = ReconnectBackoff::new(&self.config.reconnect);

        tracing::info!(
            gateway_url = %self.config.gateway_url,
            cluster = %self.config.cluster_name,
            "starting gateway connection"
        );

        while self.running.load(Ordering::Acquire) {
            match self.connect_once().await {
                Ok(()) => {
                    // Clean close: the gateway went away, retry fresh.
                    backoff.reset();
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::error!(
                        error = %e,
                        reconnect_in_secs = delay.as_secs(),
                        "gateway connection error"
                    );
                    if self.running.load(Ordering::Acquire) {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        remove_health_file(&self.config.health_file);
        tracing::info!("gateway connection stopped");
    }

    /// One connection attempt: open the stream and pump events until
    /// it closes.
    async fn connect_once(&self) -> Result<()> {
        let cluster_info = self.executor.client().cluster_info().await;
        let mut params: Vec<(String, String)> =
            vec![("agent_version".into(), self.agent_version.clone())];
        for key in ["kubernetes_version", "node_count", "namespace_count"] {
            if let Some(v) = cluster_info.get(key) {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                params.push((key.into(), value));
            }
        }

        let url = format!("{}/agent/connect", self.config.gateway_url);
        tracing::info!(%url, "connecting to gateway");

        let resp = self
            .http
            .get(&url)
            .query(&params)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header(
                "User-Agent",
                format!("ifox-cluster-agent/{}", self.agent_version),
            )
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("connect: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Upstream(format!(
                "gateway returned {}",
                resp.status().as_u16()
            )));
        }
        tracing::info!("connected to gateway");

        let mut byte_stream = resp.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = byte_stream.next().await {
            if !self.running.load(Ordering::Acquire) {
                return Ok(());
            }
            let bytes = chunk.map_err(|e| Error::Upstream(format!("stream read: {e}")))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));
            for message in drain_events(&mut buffer) {
                self.handle_event(message.event.as_deref().unwrap_or(""), &message.data)
                    .await;
            }
        }

        Ok(())
    }

    async fn handle_event(&self, event_type: &str, data: &str) {
        let payload: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(event_type, data, "invalid event data");
                return;
            }
        };

        match event_type {
            "connected" => {
                tracing::info!(
                    cluster_id = payload.get("cluster_id").and_then(serde_json::Value::as_str),
                    message = payload.get("message").and_then(serde_json::Value::as_str),
                    "gateway acknowledged connection"
                );
                create_health_file(&self.config.health_file);
            }
            "command" => self.handle_command(&payload).await,
            "heartbeat" => {
                tracing::debug!(
                    timestamp = payload.get("timestamp").and_then(serde_json::Value::as_str),
                    "heartbeat received"
                );
            }
            other => {
                tracing::warn!(event_type = other, "unknown event type");
            }
        }
    }

    async fn handle_command(&self, payload: &Value) {
        let request_id = payload
            .get("request_id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let command = payload
            .get("command")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let params = payload.get("params").cloned().unwrap_or(json!({}));

        tracing::info!(request_id = %request_id, command = %command, "command received");

        match self.executor.execute(&command, &params).await {
            Ok(result) => {
                self.send_response(&request_id, true, Some(result), None).await;
                tracing::info!(request_id = %request_id, command = %command, "command completed");
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, command = %command, error = %e, "command failed");
                let message = match &e {
                    Error::NotFound(m) if m == "unknown command" => "unknown command".to_string(),
                    other => other.to_string(),
                };
                self.send_response(&request_id, false, None, Some(message)).await;
            }
        }
    }

    /// POST the command result back. Best-effort only.
    async fn send_response(
        &self,
        request_id: &str,
        ok: bool,
        result: Option<Value>,
        error: Option<String>,
    ) {
        let url = format!("{}/agent/response/{request_id}", self.config.gateway_url);
        let mut body = json!({"request_id": request_id, "ok": ok});
        if let Some(result) = result {
            body["result"] = result;
        }
        if let Some(error) = error {
            body["error"] = Value::String(error);
        }

        let send = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(std::time::Duration::from_secs(10))
            .json(&body)
            .send()
            .await;
        match send {
            Ok(resp) if !resp.status().is_success() => {
                tracing::error!(
                    request_id,
                    status = resp.status().as_u16(),
                    "response delivery rejected"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(request_id, error = %e, "response delivery failed");
            }
        }
    }
}

/// Lets the signal handler stop the run loop and drop the health file.
pub struct StopHandle {
    running: Arc<AtomicBool>,
    health_file: PathBuf,
}

impl StopHandle {
    pub fn stop(&self) {
        tracing::info!("stopping gateway connection");
        self.running.store(false, Ordering::Release);
        remove_health_file(&self.health_file);
    }
}

fn create_health_file(path: &PathBuf) {
    if let Err(e) = std::fs::write(path, b"ok") {
        tracing::warn!(path = %path.display(), error = %e, "failed to create health file");
    }
}

fn remove_health_file(path: &PathBuf) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove health file");
        }
    }
}
