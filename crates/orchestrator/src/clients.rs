//! Small clients for the pipeline, agent, and telemetry services.

use std::time::Duration;

use serde_json::{json, Value};

use ifox_domain::{Error, Result};

fn client_10s() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::Http(e.to_string()))
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    body: &Value,
    service: &str,
) -> Result<Value> {
    let resp = client
        .post(url)
        .header("Authorization", format!("Bearer {token}"))
        .json(body)
        .send()
        .await
        .map_err(|e| Error::Upstream(format!("{service}: {e}")))?;
    let status = resp.status();
    let value: Value = resp.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        return Err(Error::Upstream(format!(
            "{service} returned {}: {value}",
            status.as_u16()
        )));
    }
    Ok(value)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PipelineApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl PipelineApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            http: client_10s()?,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Kick off the asynchronous pipeline bootstrap; the returned run
    /// handle is stored on the provisioning row but never awaited.
    pub async fn bootstrap(&self, token: &str, team_id: &str) -> Result<Value> {
        post_json(
            &self.http,
            &format!("{}/api/v1/bootstrap", self.base_url),
            token,
            &json!({"team_id": team_id}),
            "pipeline_api",
        )
        .await
    }

    /// One-off pipeline run (creates a Job, not a CronJob).
    pub async fn trigger_run(&self, token: &str, org_id: &str, team_id: &str) -> Result<Value> {
        post_json(
            &self.http,
            &format!("{}/api/v1/runs", self.base_url),
            token,
            &json!({"org_id": org_id, "team_id": team_id}),
            "pipeline_api",
        )
        .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AgentApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl AgentApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        // Agent runs take minutes; only connection setup is bounded by
        // the client, the overall call rides the run timeout.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Run an agent with a team (impersonation) token.
    pub async fn run_agent(
        &self,
        team_token: &str,
        agent_name: &str,
        message: &str,
        context: &Value,
        correlation_id: &str,
    ) -> Result<Value> {
        let body = json!({
            "agent_name": agent_name,
            "message": message,
            "context": context,
            "correlation_id": correlation_id,
        });
        let resp = self
            .http
            .post(format!("{}/api/v1/agent/run", self.base_url))
            .header("X-Infrafox-Team-Token", team_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("agent_api: {e}")))?;
        let status = resp.status();
        let value: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "agent_api returned {}",
                status.as_u16()
            )));
        }
        Ok(value)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Telemetry collector (license)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// License entitlements from the telemetry collector.
#[derive(Debug, Clone)]
pub struct LicenseInfo {
    /// -1 means unlimited.
    pub max_teams: i64,
    pub max_runs_per_month: i64,
    pub features: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct TelemetryCollectorClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelemetryCollectorClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            http: client_10s()?,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub async fn get_license(&self) -> Result<LicenseInfo> {
        let resp = self
            .http
            .get(format!("{}/api/v1/license", self.base_url))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("telemetry_collector: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Upstream(format!(
                "telemetry_collector returned {}",
                resp.status().as_u16()
            )));
        }
        let value: Value = resp
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("telemetry_collector decode: {e}")))?;
        let entitlements = value.get("entitlements").cloned().unwrap_or(json!({}));
        Ok(LicenseInfo {
            max_teams: entitlements
                .get("max_teams")
                .and_then(Value::as_i64)
                .unwrap_or(-1),
            max_runs_per_month: entitlements
                .get("max_runs_per_month")
                .and_then(Value::as_i64)
                .unwrap_or(-1),
            features: entitlements
                .get("features")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            warnings: value
                .get("warnings")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}
