//! HTTP surface of the orchestrator.

pub mod admin;
pub mod auth;
pub mod health;
pub mod routing;

use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use uuid::Uuid;

use crate::gateway;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        // ── Admin ────────────────────────────────────────────────────
        .route("/api/v1/admin/provision/team", post(admin::provision_team))
        .route(
            "/api/v1/admin/provision/runs/:id",
            get(admin::get_provision_run),
        )
        .route("/api/v1/admin/agents/run", post(admin::run_agent_for_team))
        .route("/api/v1/admin/pipeline/trigger", post(admin::trigger_pipeline))
        .route(
            "/api/v1/admin/teams/sync-cronjobs",
            post(admin::sync_cronjobs_admin),
        )
        .route(
            "/api/v1/teams/me/sync-cronjobs",
            post(admin::sync_cronjobs_team),
        )
        .route(
            "/api/v1/admin/teams/:org/:team/deployment",
            get(admin::deployment_status),
        )
        .route(
            "/api/v1/admin/teams/:org/:team/pipeline",
            get(admin::pipeline_status),
        )
        .route("/api/v1/admin/deprovision/team", post(admin::deprovision_team))
        // ── Internal ─────────────────────────────────────────────────
        .route("/api/v1/internal/routing/lookup", post(routing::lookup))
        .route(
            "/api/v1/internal/cluster/command",
            post(gateway::cluster_command),
        )
        // ── Gateway ──────────────────────────────────────────────────
        .route("/gateway/agent/connect", get(gateway::agent_connect))
        .route(
            "/gateway/agent/response/:request_id",
            post(gateway::agent_response),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            request_context,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Request-id propagation, access logging, and metrics.
async fn request_context(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    let start = Instant::now();
    let mut response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status().as_u16();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    state
        .metrics
        .observe_request(&method, &path, status, duration.as_secs_f64());
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status_code = status,
        duration_ms = duration.as_millis() as u64,
        "http_request"
    );

    response
}
