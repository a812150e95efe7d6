//! LLM translating proxy.
//!
//! Fronts the Anthropic Messages API for every agent sandbox. Claude
//! models pass through to Anthropic with injected credentials; any
//! other model is translated to Chat Completions shape, routed to its
//! provider, and the response (sync or streaming) is translated back.
//! The ext-authz surface validates sandbox tokens and returns the
//! headers the egress proxy must attach per integration.

pub mod authz;
pub mod dispatch;
pub mod routes;
pub mod state;
pub mod stream;
pub mod translate;

use axum::routing::{any, get, post};
use axum::Router;

use crate::state::SharedState;

/// Build the proxy router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/v1/messages", post(routes::messages))
        .route("/v1/messages/count_tokens", post(routes::count_tokens))
        .route("/api/event_logging/*path", any(routes::event_logging))
        .route("/api/integrations", get(authz::list_integrations))
        .route("/check", any(authz::ext_authz_check))
        .route("/check/*path", any(authz::ext_authz_check))
        .route("/confluence/*path", any(authz::confluence_proxy))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
