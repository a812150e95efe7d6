//! Admin authentication against the Config Service.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use ifox_config_client::AdminPrincipal;
use ifox_domain::{Error, Result};

use crate::state::AppState;

/// Pull the admin token from `Authorization: Bearer` or `X-Admin-Token`.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }
    headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Pull the team token from `Authorization: Bearer` or
/// `X-Infrafox-Team-Token`.
pub fn extract_team_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }
    headers
        .get("x-infrafox-team-token")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Validate the caller and enforce a scoped permission (`admin:*`
/// always passes). The principal is cached briefly to keep hot admin
/// paths off `/auth/me`.
pub async fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
    required: &str,
) -> Result<(String, AdminPrincipal)> {
    let token = extract_token(headers).ok_or_else(|| Error::Auth("missing admin token".into()))?;

    let principal = match state.admin_cache.get(&token) {
        Some(principal) => principal,
        None => {
            let principal = state.config_service.auth_me_admin(&token).await?;
            state.admin_cache.put(&token, principal.clone());
            principal
        }
    };

    if !principal.has_permission(required) {
        return Err(Error::Forbidden(format!("requires {required}")));
    }
    Ok((token, principal))
}

/// Standard error body: `{error: <kind>, detail}`. Internal variants
/// never leak their message.
pub fn error_response(e: &Error) -> Response {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let detail = match e {
        Error::Io(_) | Error::Json(_) | Error::Internal(_) => "internal_error".to_string(),
        other => other.to_string(),
    };
    (status, axum::Json(json!({"error": e.kind(), "detail": detail}))).into_response()
}
