//! Liveness and metrics endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// `GET /health` — liveness plus a license summary when a telemetry
/// collector is configured.
pub async fn health(State(state): State<AppState>) -> Response {
    let mut body = json!({"status": "ok"});

    if let Some(collector) = &state.telemetry_collector {
        body["license"] = match collector.get_license().await {
            Ok(license) => json!({
                "max_teams": license.max_teams,
                "max_runs_per_month": license.max_runs_per_month,
                "features": license.features,
                "warnings": license.warnings,
            }),
            Err(_) => json!({"error": "telemetry_collector_unavailable"}),
        };
    }

    Json(body).into_response()
}

/// `GET /metrics` — Prometheus exposition when enabled, 404 otherwise.
pub async fn metrics(State(state): State<AppState>) -> Response {
    if !state.metrics.enabled {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "not_found", "detail": "metrics_disabled"})),
        )
            .into_response();
    }
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.gather(),
    )
        .into_response()
}
