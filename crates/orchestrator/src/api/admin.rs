//! Admin endpoints: provisioning, agent runs, pipeline control,
//! CronJob sync, deprovisioning.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use ifox_audit::{RunCompletion, RunStatus, Trigger};
use ifox_domain::team::TeamConfig;
use ifox_domain::{Error, Result};
use ifox_k8s::cronjobs::{create_or_update_cronjob, delete_cronjob, get_cronjob, CronKind};
use ifox_k8s::deployments::{
    create_dedicated_agent, delete_dedicated_agent, get_dedicated_agent,
};

use crate::api::auth::{error_response, extract_team_token, require_admin};
use crate::provision::{ProvisionStatus, ProvisioningRun};
use crate::state::AppState;

/// Header carrying the provisioning run id on every response path.
pub const RUN_ID_HEADER: &str = "X-Infrafox-Provisioning-Run-Id";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/admin/provision/team
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub org_id: String,
    pub team_node_id: String,
    #[serde(default)]
    pub slack_channel_ids: Vec<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Cron schedule for the AI pipeline; setting it creates a CronJob.
    #[serde(default)]
    pub pipeline_schedule: Option<String>,
    /// "shared" (default) or "dedicated" (enterprise).
    #[serde(default)]
    pub deployment_mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    pub provisioning_run_id: String,
    pub status: ProvisionStatus,
    pub team_node_id: String,
    pub org_id: String,
    pub team_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_bootstrap: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_cronjob: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedicated_deployment: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn respond_with_run_id(status: StatusCode, run_id: &Uuid, body: &ProvisionResponse) -> Response {
    let mut response = (status, Json(body)).into_response();
    if let Ok(value) = run_id.to_string().parse() {
        response.headers_mut().insert(RUN_ID_HEADER, value);
    }
    response
}

pub async fn provision_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ProvisionRequest>,
) -> Response {
    let permission = state.config.orchestrator.provision_permission.clone();
    let (token, principal) = match require_admin(&state, &headers, &permission).await {
        Ok(ok) => ok,
        Err(e) => return error_response(&e),
    };

    // ── License gate ─────────────────────────────────────────────────
    if let Some(collector) = &state.telemetry_collector {
        match collector.get_license().await {
            Ok(license) if license.max_teams >= 0 => {
                let current = state.provisioning.count_succeeded_teams() as i64;
                if current >= license.max_teams {
                    tracing::warn!(
                        current_teams = current,
                        max_teams = license.max_teams,
                        org_id = %body.org_id,
                        team_node_id = %body.team_node_id,
                        "team quota exceeded"
                    );
                    return error_response(&Error::Quota(format!(
                        "team limit reached: {current}/{} teams",
                        license.max_teams
                    )));
                }
            }
            Ok(_) => {}
            Err(e) => {
                // The license check never blocks provisioning on its
                // own failure.
                tracing::warn!(error = %e, "license check failed");
            }
        }
    }

    // ── Per-team advisory lock for the rest of the request ───────────
    let lock = state.team_locks.lock_for(&body.org_id, &body.team_node_id);
    let _guard = lock.lock().await;

    // ── Idempotency replay ───────────────────────────────────────────
    if let Some(key) = body.idempotency_key.as_deref() {
        if let Some(existing) =
            state
                .provisioning
                .find_by_key(&body.org_id, &body.team_node_id, key)
        {
            tracing::info!(
                run_id = %existing.id,
                idempotency_key = key,
                "returning existing provisioning run"
            );
            let response = ProvisionResponse {
                provisioning_run_id: existing.id.to_string(),
                status: existing.status,
                team_node_id: body.team_node_id.clone(),
                org_id: body.org_id.clone(),
                team_id: body.team_node_id.clone(),
                team_token: None,
                pipeline_bootstrap: existing
                    .steps
                    .get("bootstrap")
                    .and_then(|s| s.get("run"))
                    .cloned(),
                pipeline_cronjob: None,
                dedicated_deployment: None,
                error: existing.error.clone(),
            };
            return respond_with_run_id(StatusCode::OK, &existing.id, &response);
        }
    }

    // ── Create the run and execute the steps ─────────────────────────
    let run = match state.provisioning.create(
        &body.org_id,
        &body.team_node_id,
        body.idempotency_key.as_deref(),
    ) {
        Ok(run) => run,
        Err(e) => return error_response(&e),
    };
    tracing::info!(
        run_id = %run.id,
        org_id = %body.org_id,
        team_node_id = %body.team_node_id,
        actor = principal.actor(),
        "provision start"
    );

    match execute_provision_steps(&state, &token, &body, &run).await {
        Ok(outcome) => {
            let _ = state
                .provisioning
                .update(&run.id, |r| r.status = ProvisionStatus::Succeeded);
            let response = ProvisionResponse {
                provisioning_run_id: run.id.to_string(),
                status: ProvisionStatus::Succeeded,
                team_node_id: body.team_node_id.clone(),
                org_id: body.org_id.clone(),
                team_id: body.team_node_id.clone(),
                team_token: outcome.team_token,
                pipeline_bootstrap: outcome.pipeline_bootstrap,
                pipeline_cronjob: outcome.pipeline_cronjob,
                dedicated_deployment: outcome.dedicated_deployment,
                error: None,
            };
            respond_with_run_id(StatusCode::OK, &run.id, &response)
        }
        Err(e) => {
            let error_label = match &e {
                Error::Upstream(_) | Error::Http(_) => "upstream_error".to_string(),
                Error::Auth(m) | Error::Forbidden(m) | Error::NotFound(m) => m.clone(),
                _ => "internal_error".to_string(),
            };
            let _ = state.provisioning.update(&run.id, |r| {
                r.status = ProvisionStatus::Failed;
                r.error = Some(error_label.clone());
                r.steps
                    .insert("error".into(), Value::String(error_label.clone()));
            });
            tracing::error!(run_id = %run.id, error = %e, "provisioning failed");
            let response = ProvisionResponse {
                provisioning_run_id: run.id.to_string(),
                status: ProvisionStatus::Failed,
                team_node_id: body.team_node_id.clone(),
                org_id: body.org_id.clone(),
                team_id: body.team_node_id.clone(),
                team_token: None,
                pipeline_bootstrap: None,
                pipeline_cronjob: None,
                dedicated_deployment: None,
                error: Some(error_label),
            };
            let status = StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            respond_with_run_id(status, &run.id, &response)
        }
    }
}

struct ProvisionOutcome {
    team_token: Option<String>,
    pipeline_bootstrap: Option<Value>,
    pipeline_cronjob: Option<Value>,
    dedicated_deployment: Option<Value>,
}

/// The provisioning steps, in order. Failures in the config/token/
/// bootstrap steps abort the run; Kubernetes steps record their error
/// under `steps[name]` and let the run continue (the cluster converges
/// on the next sync).
async fn execute_provision_steps(
    state: &AppState,
    token: &str,
    body: &ProvisionRequest,
    run: &ProvisioningRun,
) -> Result<ProvisionOutcome> {
    let team_id = body.team_node_id.clone();

    // 1) Patch routing + pipeline hints into the team node config.
    let patch = json!({
        "routing": {
            "slack_channel_ids": body.slack_channel_ids,
            "team_id": team_id,
        },
        "ai_pipeline": {"team_id": team_id},
    });
    state
        .config_service
        .patch_node_config(token, &body.org_id, &body.team_node_id, &patch)
        .await?;
    record_step(state, &run.id, "config_patch", json!({"ok": true}));

    // 2) Channel routing lives in the Config Service; nothing local to
    // write.
    record_step(
        state,
        &run.id,
        "slack_channel_map",
        json!({
            "ok": true,
            "count": body.slack_channel_ids.len(),
            "source": "config_service",
        }),
    );

    // 3) Team token: never rotate implicitly. Minted at most once and
    // returned only in this response.
    let existing = state
        .config_service
        .list_team_tokens(token, &body.org_id, &body.team_node_id)
        .await?;
    let has_active = existing.iter().any(|t| t.revoked_at.is_none());
    let team_token = if has_active {
        record_step(
            state,
            &run.id,
            "team_token",
            json!({"ok": true, "created": false, "existing_tokens": existing.len()}),
        );
        None
    } else {
        let minted = state
            .config_service
            .issue_team_token(token, &body.org_id, &body.team_node_id)
            .await?;
        record_step(
            state,
            &run.id,
            "team_token",
            json!({"ok": true, "created": true}),
        );
        Some(minted)
    };

    // 4) Async pipeline bootstrap; the handle is stored, not awaited.
    let bootstrap = state.pipeline_api.bootstrap(token, &team_id).await?;
    record_step(
        state,
        &run.id,
        "bootstrap",
        json!({"ok": true, "run": bootstrap}),
    );

    // 5) AI-pipeline CronJob when a schedule was requested.
    let mut pipeline_cronjob = None;
    if let Some(schedule) = body.pipeline_schedule.as_deref() {
        match &state.kube {
            Some(kube) => {
                match create_or_update_cronjob(
                    kube,
                    CronKind::Pipeline,
                    &body.org_id,
                    &body.team_node_id,
                    schedule,
                    &state.config.k8s.pipeline_image,
                )
                .await
                {
                    Ok(result) => {
                        record_step(
                            state,
                            &run.id,
                            "pipeline_cronjob",
                            json!({"ok": true, "result": result}),
                        );
                        pipeline_cronjob = Some(result);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "pipeline cronjob create failed");
                        record_step(
                            state,
                            &run.id,
                            "pipeline_cronjob",
                            json!({"ok": false, "error": e.to_string()}),
                        );
                    }
                }
            }
            None => record_step(
                state,
                &run.id,
                "pipeline_cronjob",
                json!({"ok": false, "error": "kubernetes_not_available"}),
            ),
        }
    }

    // 6) Dedicated deployment for enterprise teams.
    let mut dedicated_deployment = None;
    if body.deployment_mode.as_deref() == Some("dedicated") {
        match &state.kube {
            Some(kube) => {
                match create_dedicated_agent(
                    kube,
                    &body.org_id,
                    &body.team_node_id,
                    &state.config.k8s.agent_image,
                    state.config.k8s.agent_port,
                )
                .await
                {
                    Ok(result) => {
                        if let Some(url) = result.get("service_url").and_then(Value::as_str) {
                            state
                                .config_service
                                .patch_node_config(
                                    token,
                                    &body.org_id,
                                    &body.team_node_id,
                                    &json!({"agent": {"dedicated_service_url": url}}),
                                )
                                .await?;
                        }
                        record_step(
                            state,
                            &run.id,
                            "dedicated_deployment",
                            json!({"ok": true, "result": result}),
                        );
                        dedicated_deployment = Some(result);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "dedicated deployment create failed");
                        record_step(
                            state,
                            &run.id,
                            "dedicated_deployment",
                            json!({"ok": false, "error": e.to_string()}),
                        );
                    }
                }
            }
            None => record_step(
                state,
                &run.id,
                "dedicated_deployment",
                json!({"ok": false, "error": "kubernetes_not_available"}),
            ),
        }
    }

    Ok(ProvisionOutcome {
        team_token,
        pipeline_bootstrap: Some(bootstrap),
        pipeline_cronjob,
        dedicated_deployment,
    })
}

fn record_step(state: &AppState, run_id: &Uuid, step: &str, value: Value) {
    if let Err(e) = state.provisioning.update(run_id, |r| {
        r.steps.insert(step.to_string(), value);
    }) {
        tracing::warn!(run_id = %run_id, step, error = %e, "failed to record step");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/v1/admin/provision/runs/{id}
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_provision_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = require_admin(&state, &headers, "admin:provision:read").await {
        return error_response(&e);
    }
    let Ok(id) = Uuid::parse_str(&run_id) else {
        return error_response(&Error::NotFound(format!("run {run_id}")));
    };
    match state.provisioning.get(&id) {
        Some(run) => Json(json!({
            "provisioning_run_id": run.id.to_string(),
            "status": run.status,
            "steps": run.steps,
            "error": run.error,
        }))
        .into_response(),
        None => error_response(&Error::NotFound("run_not_found".into())),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/admin/agents/run
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct AgentRunRequest {
    pub org_id: String,
    pub team_node_id: String,
    pub agent_name: String,
    pub message: String,
    #[serde(default)]
    pub context: Value,
}

/// Server-to-server agent runs: callers talk to the orchestrator, which
/// mints a short-lived impersonation token, so team tokens never reach
/// browsers or admin tools.
pub async fn run_agent_for_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AgentRunRequest>,
) -> Response {
    let token = match require_admin(&state, &headers, "admin:agent:run").await {
        Ok((token, _)) => token,
        Err(e) => return error_response(&e),
    };

    let run_id = Uuid::new_v4().simple().to_string();
    let correlation_id = run_id.clone();

    let impersonation = match state
        .config_service
        .issue_impersonation_token(&token, &body.org_id, &body.team_node_id)
        .await
    {
        Ok(token) if !token.token.is_empty() => token,
        Ok(_) => {
            return error_response(&Error::Upstream(
                "config_service_impersonation_token_missing".into(),
            ));
        }
        Err(e) => return error_response(&e),
    };

    // Record the run start.
    if let Err(e) = state.runs.create(
        &run_id,
        &body.org_id,
        &body.team_node_id,
        &correlation_id,
        &body.agent_name,
        Trigger {
            source: "api".into(),
            actor: Some("admin".into()),
            message: Some(body.message.clone()),
            channel: None,
        },
    ) {
        tracing::warn!(error = %e, "failed to record agent run start");
    }

    match state
        .agent_api
        .run_agent(
            &impersonation.token,
            &body.agent_name,
            &body.message,
            &body.context,
            &correlation_id,
        )
        .await
    {
        Ok(result) => {
            let output = result
                .get("output")
                .or_else(|| result.get("final_output"))
                .cloned()
                .unwrap_or(Value::Null);
            let output_summary = match &output {
                Value::Object(o) => o
                    .get("summary")
                    .or_else(|| o.get("root_cause"))
                    .and_then(Value::as_str)
                    .map(String::from),
                Value::String(s) => Some(s.clone()),
                _ => None,
            };
            let confidence = output.get("confidence").and_then(Value::as_f64);
            let success = result
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(true);

            let _ = state.runs.complete(
                &run_id,
                RunCompletion {
                    status: if success {
                        RunStatus::Completed
                    } else {
                        RunStatus::Failed
                    },
                    tool_calls_count: result
                        .get("tool_calls_count")
                        .and_then(Value::as_u64)
                        .map(|c| c as u32),
                    output_summary,
                    confidence,
                    error: None,
                },
            );

            Json(json!({
                "team_node_id": body.team_node_id,
                "agent_name": body.agent_name,
                "agent_result": result,
            }))
            .into_response()
        }
        Err(e) => {
            let _ = state.runs.complete(
                &run_id,
                RunCompletion {
                    status: RunStatus::Failed,
                    error: Some(e.to_string()),
                    ..RunCompletion::default()
                },
            );
            error_response(&e)
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/admin/pipeline/trigger
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct PipelineTriggerRequest {
    pub org_id: String,
    pub team_node_id: String,
}

pub async fn trigger_pipeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PipelineTriggerRequest>,
) -> Response {
    let (token, _) = match require_admin(&state, &headers, "admin:pipeline:trigger").await {
        Ok(ok) => ok,
        Err(e) => return error_response(&e),
    };
    if state.kube.is_none() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ok": false, "message": "kubernetes_not_available"})),
        )
            .into_response();
    }

    match state
        .pipeline_api
        .trigger_run(&token, &body.org_id, &body.team_node_id)
        .await
    {
        Ok(result) => {
            tracing::info!(
                org_id = %body.org_id,
                team_node_id = %body.team_node_id,
                "pipeline run triggered"
            );
            Json(json!({
                "ok": true,
                "job_name": result.get("job_name").or_else(|| result.get("run_id")),
                "message": "Pipeline run triggered",
            }))
            .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "pipeline trigger failed");
            Json(json!({"ok": false, "message": e.to_string()})).into_response()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CronJob sync (admin + team self-service)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SyncCronJobsRequest {
    pub org_id: String,
    pub team_node_id: String,
}

/// Reconcile one CronJob kind against the team's effective config:
/// enabled → create-or-update with the configured schedule, disabled →
/// delete (missing is reported as skipped).
async fn sync_one_cronjob(
    state: &AppState,
    kind: CronKind,
    org_id: &str,
    team_node_id: &str,
    enabled: bool,
    schedule: Option<&str>,
    errors: &mut Vec<String>,
) -> Value {
    let Some(kube) = &state.kube else {
        errors.push(format!("{}: kubernetes_not_available", kind.component()));
        return json!({"error": "kubernetes_not_available"});
    };

    if enabled {
        let schedule = schedule.unwrap_or(kind.default_schedule());
        match create_or_update_cronjob(
            kube,
            kind,
            org_id,
            team_node_id,
            schedule,
            &state.config.k8s.pipeline_image,
        )
        .await
        {
            Ok(result) => result,
            Err(e) => {
                errors.push(format!("{}: {e}", kind.component()));
                json!({"error": e.to_string()})
            }
        }
    } else {
        match delete_cronjob(kube, kind, org_id, team_node_id).await {
            Ok(result) => {
                if result.get("reason").and_then(Value::as_str) == Some("not_found") {
                    json!({"skipped": true, "reason": "not_found"})
                } else {
                    result
                }
            }
            Err(e) => {
                errors.push(format!("{}_delete: {e}", kind.component()));
                json!({"error": e.to_string()})
            }
        }
    }
}

async fn sync_cronjobs_for(
    state: &AppState,
    org_id: &str,
    team_node_id: &str,
    team_config: &TeamConfig,
) -> Response {
    let mut errors = Vec::new();

    let pipeline = sync_one_cronjob(
        state,
        CronKind::Pipeline,
        org_id,
        team_node_id,
        team_config.ai_pipeline.enabled,
        team_config.ai_pipeline.schedule.as_deref(),
        &mut errors,
    )
    .await;

    let dependency_discovery = sync_one_cronjob(
        state,
        CronKind::DependencyDiscovery,
        org_id,
        team_node_id,
        team_config.dependency_discovery.enabled,
        team_config.dependency_discovery.schedule.as_deref(),
        &mut errors,
    )
    .await;

    let message = if errors.is_empty() {
        "CronJobs synced".to_string()
    } else {
        format!("Errors: {}", errors.join(", "))
    };
    Json(json!({
        "ok": errors.is_empty(),
        "ai_pipeline": pipeline,
        "dependency_discovery": dependency_discovery,
        "message": message,
    }))
    .into_response()
}

pub async fn sync_cronjobs_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SyncCronJobsRequest>,
) -> Response {
    let (token, _) = match require_admin(&state, &headers, "admin:cronjobs:sync").await {
        Ok(ok) => ok,
        Err(e) => return error_response(&e),
    };
    if state.kube.is_none() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ok": false, "message": "kubernetes_not_available"})),
        )
            .into_response();
    }

    let team_config = match state
        .config_service
        .get_effective_config_for_node(&token, &body.org_id, &body.team_node_id)
        .await
    {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "sync cronjobs config fetch failed");
            return Json(json!({"ok": false, "message": format!("config_fetch_failed: {e}")}))
                .into_response();
        }
    };

    sync_cronjobs_for(&state, &body.org_id, &body.team_node_id, &team_config).await
}

/// Team-token variant: lets a team enable/disable its own scheduled
/// features without admin permissions.
pub async fn sync_cronjobs_team(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(team_token) = extract_team_token(&headers) else {
        return error_response(&Error::Auth("missing team token".into()));
    };

    // The config fetch validates the token.
    let team_config = match state.config_service.get_effective_config(&team_token).await {
        Ok(config) => config,
        Err(e @ Error::Auth(_)) => return error_response(&e),
        Err(e) => {
            tracing::error!(error = %e, "team sync cronjobs config fetch failed");
            return Json(json!({"ok": false, "message": format!("config_fetch_failed: {e}")}))
                .into_response();
        }
    };
    let identity = match state.config_service.auth_me_team(&team_token).await {
        Ok(identity) => identity,
        Err(e) => return error_response(&e),
    };
    if state.kube.is_none() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ok": false, "message": "kubernetes_not_available"})),
        )
            .into_response();
    }

    sync_cronjobs_for(&state, &identity.org_id, &identity.team_node_id, &team_config).await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deployment / pipeline status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn deployment_status(
    State(state): State<AppState>,
    Path((org_id, team_node_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = require_admin(&state, &headers, "admin:deployment:read").await {
        return error_response(&e);
    }
    let Some(kube) = &state.kube else {
        return Json(json!({"mode": "shared", "error": "kubernetes_not_available"}))
            .into_response();
    };

    match get_dedicated_agent(kube, &org_id, &team_node_id, state.config.k8s.agent_port).await {
        Ok(Some(mut info)) => {
            info["mode"] = Value::String("dedicated".into());
            Json(info).into_response()
        }
        Ok(None) => Json(json!({"mode": "shared"})).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn pipeline_status(
    State(state): State<AppState>,
    Path((org_id, team_node_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = require_admin(&state, &headers, "admin:pipeline:read").await {
        return error_response(&e);
    }
    let Some(kube) = &state.kube else {
        return Json(json!({"configured": false, "error": "kubernetes_not_available"}))
            .into_response();
    };

    match get_cronjob(kube, CronKind::Pipeline, &org_id, &team_node_id).await {
        Ok(Some(mut info)) => {
            info["configured"] = Value::Bool(true);
            Json(info).into_response()
        }
        Ok(None) => Json(json!({"configured": false})).into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/admin/deprovision/team
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct DeprovisionRequest {
    pub org_id: String,
    pub team_node_id: String,
    #[serde(default = "d_true")]
    pub delete_k8s_resources: bool,
    #[serde(default)]
    pub dry_run: bool,
}

fn d_true() -> bool {
    true
}

/// Delete a team's infrastructure (Deployment + Service + CronJobs).
/// Config Service data is untouched; missing resources are reported as
/// `not_found`, not errors.
pub async fn deprovision_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DeprovisionRequest>,
) -> Response {
    if let Err(e) = require_admin(&state, &headers, "admin:deprovision").await {
        return error_response(&e);
    }

    if body.dry_run {
        tracing::info!(
            org_id = %body.org_id,
            team_node_id = %body.team_node_id,
            "deprovision dry run"
        );
        return Json(json!({"ok": true, "dry_run": true, "deleted": {}, "errors": []}))
            .into_response();
    }
    if !body.delete_k8s_resources {
        return Json(json!({"ok": true, "deleted": {}, "errors": []})).into_response();
    }
    let Some(kube) = &state.kube else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ok": false, "errors": ["kubernetes_not_available"]})),
        )
            .into_response();
    };

    let mut deleted = serde_json::Map::new();
    let mut errors: Vec<String> = Vec::new();

    match delete_dedicated_agent(kube, &body.org_id, &body.team_node_id).await {
        Ok(result) => {
            let any = result.get("deployment_deleted").and_then(Value::as_bool) == Some(true)
                || result.get("service_deleted").and_then(Value::as_bool) == Some(true);
            deleted.insert(
                "dedicated_deployment".into(),
                if any {
                    result
                } else {
                    Value::String("not_found".into())
                },
            );
        }
        Err(e) => errors.push(format!("deployment: {e}")),
    }

    for (kind, key) in [
        (CronKind::Pipeline, "pipeline_cronjob"),
        (CronKind::DependencyDiscovery, "dependency_discovery_cronjob"),
    ] {
        match delete_cronjob(kube, kind, &body.org_id, &body.team_node_id).await {
            Ok(result) => {
                if result.get("deleted").and_then(Value::as_bool) == Some(true) {
                    deleted.insert(key.into(), result);
                } else {
                    deleted.insert(key.into(), Value::String("not_found".into()));
                }
            }
            Err(e) => errors.push(format!("{key}: {e}")),
        }
    }

    // Channel routing lives in the Config Service, not here.
    deleted.insert(
        "slack_channel_mappings".into(),
        Value::String("handled_by_config_service".into()),
    );

    tracing::info!(
        org_id = %body.org_id,
        team_node_id = %body.team_node_id,
        errors = errors.len(),
        "deprovision complete"
    );
    Json(json!({
        "ok": errors.is_empty(),
        "dry_run": false,
        "deleted": deleted,
        "errors": errors,
    }))
    .into_response()
}
