//! External-authorization surface.
//!
//! The egress proxy consults `/check` before forwarding sandbox
//! traffic. We validate the sandbox token, pick the integration from
//! the original host/path, and answer with the headers to inject
//! upstream. Sandboxes never see a credential.

use axum::body::Body;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use ifox_credentials::domain_map::integration_for_host;
use ifox_credentials::headers::build_auth_headers;
use ifox_credentials::token::validate_sandbox_token;
use ifox_credentials::trial::check_entitlement;
use ifox_credentials::CredentialResolver;
use ifox_domain::config::TokenMode;
use ifox_domain::{Error, Result};

use crate::routes::{anthropic_error, header_str};
use crate::state::SharedState;

/// Integrations surfaced by the listing endpoint.
const KNOWN_INTEGRATIONS: [&str; 3] = ["anthropic", "coralogix", "confluence"];

/// Tenant context extracted from a request.
pub struct TenantContext {
    pub tenant_id: String,
    pub team_id: String,
    pub sandbox_name: String,
}

/// Extract tenant context from the sandbox token; in permissive mode a
/// missing/invalid token falls back to header claims.
pub fn extract_tenant_context(state: &SharedState, headers: &HeaderMap) -> Result<TenantContext> {
    let token = header_str(headers, "x-sandbox-jwt").unwrap_or("");

    if let Some(secret) = &state.token_secret {
        if !token.is_empty() {
            match validate_sandbox_token(token, secret) {
                Ok(claims) => {
                    return Ok(TenantContext {
                        tenant_id: claims.tenant_id,
                        team_id: claims.team_id,
                        sandbox_name: claims.sandbox_name,
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "sandbox token validation failed");
                }
            }
        }
    }

    match state.token_mode {
        TokenMode::Strict => Err(Error::Auth("invalid or missing sandbox token".into())),
        TokenMode::Permissive => Ok(TenantContext {
            tenant_id: header_str(headers, "x-tenant-id").unwrap_or("local").to_string(),
            team_id: header_str(headers, "x-team-id").unwrap_or("local").to_string(),
            sandbox_name: "unknown".to_string(),
        }),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /check — the ext-authz hop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn ext_authz_check(
    State(state): State<SharedState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    let context = match extract_tenant_context(&state, &headers) {
        Ok(c) => c,
        Err(_) => {
            return anthropic_error(
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid or missing sandbox token",
            );
        }
    };

    let target_host = header_str(&headers, "x-original-host").unwrap_or("");
    let original_path = uri
        .path()
        .strip_prefix("/check")
        .filter(|p| !p.is_empty())
        .unwrap_or(uri.path());

    let Some(integration_id) = integration_for_host(target_host, original_path) else {
        // No mapping — pass through with no injection.
        tracing::warn!(host = target_host, "no integration mapping for host");
        return StatusCode::OK.into_response();
    };

    tracing::info!(
        tenant = %context.tenant_id,
        team = %context.team_id,
        sandbox = %context.sandbox_name,
        integration = integration_id,
        host = target_host,
        "credential request"
    );

    let creds = match state
        .resolver
        .get(&context.tenant_id, &context.team_id, integration_id)
        .await
    {
        Ok(creds) => creds,
        Err(e) => {
            tracing::error!(error = %e, integration = integration_id, "credential lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !CredentialResolver::is_configured(integration_id, creds.as_ref()) {
        tracing::error!(
            integration = integration_id,
            tenant = %context.tenant_id,
            "credentials not configured"
        );
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let creds = creds.expect("checked by is_configured");

    if let Err(e) = check_entitlement(&creds, chrono::Utc::now()) {
        tracing::warn!(tenant = %context.tenant_id, error = %e, "entitlement denied");
        return StatusCode::FORBIDDEN.into_response();
    }

    let mut response_headers = HeaderMap::new();
    for (name, value) in build_auth_headers(integration_id, &creds) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            response_headers.insert(name, value);
        }
    }
    tracing::info!(
        integration = integration_id,
        header_count = response_headers.len(),
        "injecting headers"
    );

    (StatusCode::OK, response_headers).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/integrations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Non-sensitive metadata about configured integrations; used in
/// system prompts to tell the agent what is available.
pub async fn list_integrations(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    let context = match extract_tenant_context(&state, &headers) {
        Ok(c) => c,
        Err(_) => {
            return anthropic_error(
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid or missing sandbox token",
            );
        }
    };

    let mut available = Vec::new();
    for integration_id in KNOWN_INTEGRATIONS {
        let creds = state
            .resolver
            .get(&context.tenant_id, &context.team_id, integration_id)
            .await
            .ok()
            .flatten();
        if CredentialResolver::is_configured(integration_id, creds.as_ref()) {
            let creds = creds.expect("checked by is_configured");
            let mut entry = serde_json::json!({"id": integration_id});
            if let serde_json::Value::Object(meta) =
                CredentialResolver::metadata(integration_id, &creds)
            {
                for (k, v) in meta {
                    entry[k] = v;
                }
            }
            available.push(entry);
        }
    }

    axum::Json(serde_json::json!({"integrations": available})).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /confluence/{path} — reverse proxy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Confluence URLs are customer-specific, so static egress routing
/// cannot reach them. This endpoint resolves the team's instance URL
/// and forwards with Basic auth; credentials never leave the service.
pub async fn confluence_proxy(
    State(state): State<SharedState>,
    OriginalUri(uri): OriginalUri,
    axum::extract::Path(path): axum::extract::Path<String>,
    headers: HeaderMap,
    method: axum::http::Method,
    raw_body: axum::body::Bytes,
) -> Response {
    let context = match extract_tenant_context(&state, &headers) {
        Ok(c) => c,
        Err(_) => {
            return anthropic_error(
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid or missing sandbox token",
            );
        }
    };

    let creds = state
        .resolver
        .get(&context.tenant_id, &context.team_id, "confluence")
        .await
        .ok()
        .flatten();
    if !CredentialResolver::is_configured("confluence", creds.as_ref()) {
        return anthropic_error(
            StatusCode::NOT_FOUND,
            "not_found_error",
            "Confluence integration not configured",
        );
    }
    let creds = creds.expect("checked by is_configured");

    let mut base = creds.extra_str("domain").unwrap_or("").trim_end_matches('/').to_string();
    if let Some(stripped) = base.strip_suffix("/wiki") {
        base = stripped.to_string();
    }
    let mut target = format!("{base}/{path}");
    if let Some(query) = uri.query() {
        target = format!("{target}?{query}");
    }

    let mut rb = state
        .sync_http
        .request(method, &target)
        .header(
            "Content-Type",
            header_str(&headers, "content-type").unwrap_or("application/json"),
        )
        .header(
            "Accept",
            header_str(&headers, "accept").unwrap_or("application/json"),
        );
    for (name, value) in build_auth_headers("confluence", &creds) {
        rb = rb.header(name, value);
    }
    if !raw_body.is_empty() {
        rb = rb.body(raw_body);
    }

    match rb.send().await {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = resp
                .headers()
                .get("Content-Type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/json")
                .to_string();
            let bytes = resp.bytes().await.unwrap_or_default();
            Response::builder()
                .status(status)
                .header("Content-Type", content_type)
                .body(Body::from(bytes))
                .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
        }
        Err(e) if e.is_timeout() => {
            anthropic_error(StatusCode::GATEWAY_TIMEOUT, "api_error", "Confluence request timed out")
        }
        Err(e) => {
            tracing::error!(error = %e, "confluence request failed");
            anthropic_error(StatusCode::BAD_GATEWAY, "api_error", "Confluence request failed")
        }
    }
}
