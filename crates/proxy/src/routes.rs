//! Proxy HTTP handlers: `/v1/messages`, token counting, telemetry.

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde_json::Value;

use ifox_credentials::trial::check_entitlement;
use ifox_domain::sse::drain_data_lines;

use crate::dispatch::{
    apply_consistency_patches, effective_model, estimate_input_tokens, is_claude_model,
    provider_base_url, provider_for_model, strip_provider_prefix,
};
use crate::state::SharedState;
use crate::stream::StreamTranslator;
use crate::translate::{
    anthropic_to_openai_request, error_body, openai_error_to_anthropic,
    openai_to_anthropic_response,
};

/// Providers that authenticate without a plain API key.
const NO_API_KEY_PROVIDERS: [&str; 2] = ["ollama", "vertex_ai"];

pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "source": format!("{:?}", state.resolver.source()),
        "token_mode": format!("{:?}", state.token_mode),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn messages(
    State(state): State<SharedState>,
    headers: HeaderMap,
    raw_body: Bytes,
) -> Response {
    // Tenant context was established by the ext-authz hop; the egress
    // proxy strips these headers from anything the sandbox sent itself.
    let tenant_id = header_str(&headers, "x-tenant-id").unwrap_or("local").to_string();
    let team_id = header_str(&headers, "x-team-id").unwrap_or("local").to_string();

    let body: Value = match serde_json::from_slice(&raw_body) {
        Ok(v) => v,
        Err(_) => {
            return anthropic_error(
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "Invalid JSON body",
            );
        }
    };

    // Model dispatch: team config → deployment default → body → default.
    let team_model = match state.resolver.get(&tenant_id, &team_id, "llm").await {
        Ok(Some(llm)) => llm.extra_str("model").map(String::from),
        _ => None,
    };
    let deployment_model = header_str(&headers, "x-llm-model")
        .map(String::from)
        .or_else(|| state.config.proxy.deployment_model.clone());
    let model = effective_model(
        team_model.as_deref(),
        deployment_model.as_deref(),
        body.get("model").and_then(Value::as_str),
        &state.config.proxy.default_model,
    );

    let is_streaming = body.get("stream").and_then(Value::as_bool) == Some(true);
    tracing::info!(
        model = %model,
        streaming = is_streaming,
        tenant = %tenant_id,
        team = %team_id,
        "llm proxy request"
    );

    if is_claude_model(&model) {
        forward_to_anthropic(&state, &headers, "/v1/messages", raw_body, is_streaming).await
    } else {
        forward_to_provider(&state, body, &model, is_streaming, &tenant_id, &team_id).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/messages/count_tokens
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Exact counting needs provider tokenizers; non-Claude models get an
/// estimate instead.
pub async fn count_tokens(
    State(state): State<SharedState>,
    headers: HeaderMap,
    raw_body: Bytes,
) -> Response {
    let model = header_str(&headers, "x-llm-model").unwrap_or("");
    if model.is_empty() || is_claude_model(model) {
        return forward_to_anthropic(&state, &headers, "/v1/messages/count_tokens", raw_body, false)
            .await;
    }
    let body: Value = serde_json::from_slice(&raw_body).unwrap_or(Value::Null);
    axum::Json(serde_json::json!({"input_tokens": estimate_input_tokens(&body)})).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /api/event_logging/{path}
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Anthropic telemetry: forwarded for Claude models, silently
/// accepted and discarded for anything else.
pub async fn event_logging(
    State(state): State<SharedState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    raw_body: Bytes,
) -> Response {
    let model = header_str(&headers, "x-llm-model").unwrap_or("");
    if model.is_empty() || is_claude_model(model) {
        let path = format!("/api/event_logging/{path}");
        return forward_to_anthropic(&state, &headers, &path, raw_body, false).await;
    }
    StatusCode::OK.into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Anthropic pass-through
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn forward_to_anthropic(
    state: &SharedState,
    headers: &HeaderMap,
    path: &str,
    raw_body: Bytes,
    is_streaming: bool,
) -> Response {
    let api_key = header_str(headers, "x-api-key").unwrap_or("").to_string();
    let url = format!("{}{path}", state.config.proxy.anthropic_upstream_url);

    let client = if is_streaming {
        &state.stream_http
    } else {
        &state.sync_http
    };
    let mut rb = client
        .post(&url)
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .header("x-api-key", api_key)
        .header(
            "anthropic-version",
            header_str(headers, "anthropic-version").unwrap_or("2023-06-01"),
        )
        .body(raw_body);
    if let Some(beta) = header_str(headers, "anthropic-beta") {
        rb = rb.header("anthropic-beta", beta);
    }

    let resp = match rb.send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!(error = %e, "anthropic upstream unreachable");
            return anthropic_error(StatusCode::BAD_GATEWAY, "api_error", "upstream unreachable");
        }
    };
    let status = StatusCode::from_u16(resp.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if is_streaming && status.is_success() {
        let byte_stream = resp.bytes_stream();
        let body = Body::from_stream(async_stream::stream! {
            let mut byte_stream = byte_stream;
            while let Some(chunk) = byte_stream.next().await {
                match chunk {
                    Ok(bytes) => yield Ok::<_, std::io::Error>(bytes),
                    Err(e) => {
                        tracing::warn!(error = %e, "anthropic stream interrupted");
                        break;
                    }
                }
            }
        });
        return sse_response(body);
    }

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
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Non-Claude: translate + provider call
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn forward_to_provider(
    state: &SharedState,
    body: Value,
    model: &str,
    is_streaming: bool,
    tenant_id: &str,
    team_id: &str,
) -> Response {
    let provider = provider_for_model(model);

    let creds = match state.resolver.get(tenant_id, team_id, provider).await {
        Ok(creds) => creds,
        Err(e) => {
            tracing::error!(error = %e, provider, "credential lookup failed");
            return anthropic_error(StatusCode::BAD_GATEWAY, "api_error", "credential lookup failed");
        }
    };

    if let Some(creds) = &creds {
        if let Err(e) = check_entitlement(creds, chrono::Utc::now()) {
            tracing::warn!(tenant = tenant_id, provider, error = %e, "entitlement denied");
            return anthropic_error(
                StatusCode::FORBIDDEN,
                "permission_error",
                "trial expired and no active subscription",
            );
        }
    }

    let api_key = creds.as_ref().and_then(|c| c.api_key.clone());
    if api_key.is_none() && !NO_API_KEY_PROVIDERS.contains(&provider) {
        tracing::error!(provider, tenant = tenant_id, "no api key for provider");
        return anthropic_error(
            StatusCode::UNAUTHORIZED,
            "authentication_error",
            &format!("No API key configured for {provider}"),
        );
    }

    // Translate and patch.
    let mut openai_body = anthropic_to_openai_request(&body);
    openai_body["model"] = Value::String(strip_provider_prefix(model).to_string());
    apply_consistency_patches(&mut openai_body, provider);

    tracing::info!(
        model,
        provider,
        messages = openai_body["messages"].as_array().map(Vec::len).unwrap_or(0),
        tools = openai_body.get("tools").and_then(serde_json::Value::as_array).map(Vec::len).unwrap_or(0),
        "translated request"
    );

    let base = creds
        .as_ref()
        .and_then(|c| c.extra_str("api_base").map(String::from))
        .unwrap_or_else(|| provider_base_url(provider).to_string());
    let url = format!("{}/chat/completions", base.trim_end_matches('/'));

    let client = if is_streaming {
        &state.stream_http
    } else {
        &state.sync_http
    };
    let mut rb = client.post(&url).json(&openai_body);
    if let Some(key) = &api_key {
        rb = rb.header("Authorization", format!("Bearer {key}"));
    }

    let resp = match rb.send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!(error = %e, provider, "provider unreachable");
            return anthropic_error(StatusCode::BAD_GATEWAY, "api_error", "provider unreachable");
        }
    };

    let status = resp.status();
    if !status.is_success() {
        let status_code = StatusCode::from_u16(status.as_u16())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let provider_body: Value = resp.json().await.unwrap_or(Value::Null);
        let translated = translate_provider_error(status_code, &provider_body);
        return json_response(status_code, &translated);
    }

    if is_streaming {
        stream_provider_response(resp, model)
    } else {
        let provider_body: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "provider response decode failed");
                return anthropic_error(
                    StatusCode::BAD_GATEWAY,
                    "api_error",
                    "provider response decode failed",
                );
            }
        };
        let anthropic = openai_to_anthropic_response(&provider_body, model);
        json_response(StatusCode::OK, &anthropic)
    }
}

/// Translate a provider chunk stream into Anthropic SSE.
fn stream_provider_response(resp: reqwest::Response, model: &str) -> Response {
    let mut translator = StreamTranslator::new(model);
    let mut byte_stream = resp.bytes_stream();

    let body = Body::from_stream(async_stream::stream! {
        let mut buffer = String::new();
        let mut failed = false;

        while let Some(chunk) = byte_stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "provider stream interrupted");
                    yield Ok::<_, std::io::Error>(Bytes::from(
                        StreamTranslator::error_event("provider stream interrupted"),
                    ));
                    failed = true;
                    break;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&bytes));
            for data in drain_data_lines(&mut buffer) {
                if data.trim() == "[DONE]" {
                    continue;
                }
                let chunk: Value = match serde_json::from_str(&data) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                for event in translator.translate_chunk(&chunk) {
                    yield Ok(Bytes::from(event));
                }
            }
        }

        if !failed {
            for event in translator.finalize() {
                yield Ok(Bytes::from(event));
            }
        }
    });

    sse_response(body)
}

/// Map a provider error status/body onto the Anthropic taxonomy.
fn translate_provider_error(status: StatusCode, provider_body: &Value) -> Value {
    if provider_body.get("error").is_some() {
        return openai_error_to_anthropic(provider_body);
    }
    let (error_type, message) = match status.as_u16() {
        401 => ("authentication_error", "provider rejected credentials"),
        403 => ("permission_error", "provider denied access"),
        404 => ("not_found_error", "provider endpoint not found"),
        429 => ("rate_limit_error", "provider rate limit exceeded"),
        400 => ("invalid_request_error", "provider rejected request"),
        _ => ("api_error", "provider error"),
    };
    error_body(error_type, message)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
}

fn sse_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn json_response(status: StatusCode, body: &Value) -> Response {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

pub(crate) fn anthropic_error(status: StatusCode, error_type: &str, message: &str) -> Response {
    json_response(status, &error_body(error_type, message))
}
