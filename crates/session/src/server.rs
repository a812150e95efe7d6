//! Agent service: HTTP surface over the session runtime.
//!
//! One session per `thread_id`, created lazily with the caller's team
//! (or impersonation) token. Executions stream their events as SSE;
//! `interrupt` and `answer` address the running turn from separate
//! requests, which is how chat surfaces deliver button clicks.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;

use ifox_domain::config::SessionConfig;
use ifox_domain::event::AgentEvent;
use ifox_domain::{Error, Result};

use crate::handlers::{
    ClusterCommandTool, KbAnswerTool, KbSearchTool, KnowledgeBaseClient, SubagentTool,
};
use crate::provider::MessagesClient;
use crate::session::{InputImage, InteractiveSession};
use crate::tools::ToolRegistry;

pub struct SessionManager {
    config: SessionConfig,
    sessions: Mutex<HashMap<String, Arc<InteractiveSession>>>,
    internal_token: String,
}

pub type SharedState = Arc<SessionManager>;

impl SessionManager {
    pub fn new(config: SessionConfig, internal_token: String) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
            internal_token,
        }
    }

    /// Get or build the session for a thread. The team token funds the
    /// LLM calls; tools are wired to the platform services.
    fn session_for(&self, thread_id: &str, team_token: &str) -> Result<Arc<InteractiveSession>> {
        if let Some(session) = self.sessions.lock().get(thread_id) {
            return Ok(session.clone());
        }

        let provider = Arc::new(MessagesClient::new(&self.config.llm_proxy_url, team_token)?);

        // Sub-agents get the platform tools, but not Task itself (no
        // recursive delegation).
        let sub_tools = Arc::new(self.platform_tools()?);

        let mut root_tools = self.platform_tools()?;
        root_tools.register(Arc::new(SubagentTool {
            provider: provider.clone(),
            tools: sub_tools,
            model: None,
            max_loops: 8,
            max_output_bytes: self.config.max_tool_output_bytes,
        }));
        let root_registry = Arc::new(root_tools);

        let session = Arc::new(InteractiveSession::new(
            thread_id,
            self.config.clone(),
            provider,
            root_registry,
            None,
            None,
        ));
        self.sessions
            .lock()
            .insert(thread_id.to_string(), session.clone());
        Ok(session)
    }

    fn existing(&self, thread_id: &str) -> Option<Arc<InteractiveSession>> {
        self.sessions.lock().get(thread_id).cloned()
    }

    /// Knowledge-base and Kubernetes tool handlers.
    fn platform_tools(&self) -> Result<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        let kb = Arc::new(KnowledgeBaseClient::new(&self.config.knowledge_base_url)?);
        registry.register(Arc::new(KbSearchTool { client: kb.clone() }));
        registry.register(Arc::new(KbAnswerTool { client: kb }));
        for tool in ClusterCommandTool::all(
            &self.config.orchestrator_url,
            &self.internal_token,
            &self.config.cluster,
        )? {
            registry.register(tool);
        }
        Ok(registry)
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/agent/run", post(run_agent))
        .route("/api/v1/sessions/:thread/execute", post(execute))
        .route("/api/v1/sessions/:thread/interrupt", post(interrupt))
        .route("/api/v1/sessions/:thread/answer", post(answer))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

fn team_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-infrafox-team-token")
        .or_else(|| headers.get("authorization"))
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).to_string())
        .filter(|v| !v.is_empty())
}

fn error_response(e: &Error) -> Response {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let detail = match e {
        Error::Io(_) | Error::Json(_) | Error::Internal(_) => "internal_error".to_string(),
        other => other.to_string(),
    };
    (status, Json(json!({"error": e.kind(), "detail": detail}))).into_response()
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "sessions": state.sessions.lock().len(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/agent/run — one-shot run, drained to a summary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct RunRequest {
    #[serde(default)]
    agent_name: Option<String>,
    message: String,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    thread_id: Option<String>,
}

async fn run_agent(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<RunRequest>,
) -> Response {
    let Some(token) = team_token(&headers) else {
        return error_response(&Error::Auth("missing team token".into()));
    };
    let thread_id = body
        .thread_id
        .or(body.correlation_id)
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    let session = match state.session_for(&thread_id, &token) {
        Ok(session) => session,
        Err(e) => return error_response(&e),
    };
    let mut rx = match session.execute(&body.message, Vec::new()) {
        Ok(rx) => rx,
        Err(e) => return error_response(&e),
    };

    let mut tool_calls_count: u32 = 0;
    let mut final_text = String::new();
    let mut success = false;
    let mut error: Option<String> = None;
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::ToolStart { .. } => tool_calls_count += 1,
            AgentEvent::Result {
                text, success: ok, ..
            } => {
                final_text = text;
                success = ok;
            }
            AgentEvent::Error { message, .. } => error = Some(message),
            _ => {}
        }
    }

    Json(json!({
        "success": success && error.is_none(),
        "agent_name": body.agent_name,
        "output": {"summary": final_text},
        "tool_calls_count": tool_calls_count,
        "error": error,
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session endpoints
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct ExecuteRequest {
    prompt: String,
    #[serde(default)]
    images: Vec<ExecuteImage>,
}

#[derive(Deserialize)]
struct ExecuteImage {
    media_type: String,
    data: String,
}

/// Stream one execution's events as SSE.
async fn execute(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ExecuteRequest>,
) -> Response {
    let Some(token) = team_token(&headers) else {
        return error_response(&Error::Auth("missing team token".into()));
    };
    let session = match state.session_for(&thread_id, &token) {
        Ok(session) => session,
        Err(e) => return error_response(&e),
    };

    let images = body
        .images
        .into_iter()
        .map(|i| InputImage {
            media_type: i.media_type,
            data: i.data,
        })
        .collect();
    let mut rx = match session.execute(&body.prompt, images) {
        Ok(rx) => rx,
        Err(e) => return error_response(&e),
    };

    let stream_body = Body::from_stream(async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".into());
            yield Ok::<_, std::io::Error>(Bytes::from(format!("data: {data}\n\n")));
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(stream_body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn interrupt(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
) -> Response {
    let Some(session) = state.existing(&thread_id) else {
        return error_response(&Error::NotFound(format!("session {thread_id}")));
    };
    match session.interrupt().await {
        Ok(()) => Json(json!({"interrupted": true})).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct AnswerRequest {
    answers: serde_json::Value,
}

async fn answer(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
    Json(body): Json<AnswerRequest>,
) -> Response {
    let Some(session) = state.existing(&thread_id) else {
        return error_response(&Error::NotFound(format!("session {thread_id}")));
    };
    let delivered = session.provide_answer(body.answers);
    Json(json!({"delivered": delivered})).into_response()
}
