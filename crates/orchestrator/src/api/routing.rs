//! Routing lookup — external identifiers → `(org, team)`.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use ifox_domain::routing::RoutingIndex;
use ifox_domain::Error;

use crate::api::auth::{error_response, extract_token};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    #[serde(default)]
    pub org: Option<String>,
    /// Singular identifier kind → value, e.g.
    /// `{"slack_channel_id": "C1"}`.
    pub identifiers: HashMap<String, String>,
}

/// `POST /api/v1/internal/routing/lookup`
///
/// Internal service-to-service endpoint: webhook handlers resolve
/// inbound events to a team before dispatching an agent. Team configs
/// are scanned in registration order, so ties are stable.
pub async fn lookup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LookupRequest>,
) -> Response {
    // Internal callers present the shared internal token; admins may
    // call it too for debugging.
    let caller_token = match extract_token(&headers) {
        Some(token) => token,
        None => return error_response(&Error::Auth("missing token".into())),
    };
    let internal = state.internal_token();
    if internal.as_deref() != Some(caller_token.as_str()) {
        if let Err(e) = crate::api::auth::require_admin(&state, &headers, "admin:routing:read").await
        {
            return error_response(&e);
        }
    }

    let token = internal.unwrap_or(caller_token);
    let entries = match state
        .config_service
        .list_team_configs(&token, body.org.as_deref())
        .await
    {
        Ok(entries) => entries,
        Err(e) => return error_response(&e),
    };

    let routes = entries
        .iter()
        .map(|entry| entry.config.route(&entry.org_id, &entry.team_node_id))
        .collect();
    let index = RoutingIndex::new(routes);
    let result = index.lookup(body.org.as_deref(), &body.identifiers);

    tracing::debug!(
        found = result.found,
        matched_by = result.matched_by.as_deref(),
        tried = ?result.tried,
        "routing lookup"
    );
    Json(result).into_response()
}
