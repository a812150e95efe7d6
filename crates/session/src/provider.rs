//! LLM provider seam for the session runtime.
//!
//! The session only ever sees provider-agnostic [`StreamEvent`]s. The
//! production implementation speaks the Anthropic Messages API against
//! the translating proxy, which makes every configured model look the
//! same from here.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};

use ifox_domain::message::{ContentPart, Message, MessageContent, Role, ToolDefinition};
use ifox_domain::sse::drain_events;
use ifox_domain::stream::{BoxStream, StreamEvent, Usage};
use ifox_domain::{Error, Result};

/// One model turn's worth of context.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub model: Option<String>,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Messages-API client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Streams `/v1/messages` through the LLM proxy.
pub struct MessagesClient {
    http: reqwest::Client,
    base_url: String,
    /// Impersonation or team token presented as the API key.
    token: String,
}

impl MessagesClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
        })
    }

    fn build_body(req: &ChatRequest) -> Value {
        let mut system: Option<String> = None;
        let mut messages: Vec<Value> = Vec::new();

        for msg in &req.messages {
            match msg.role {
                Role::System => {
                    system = Some(msg.content.extract_all_text());
                }
                Role::User | Role::Assistant => {
                    messages.push(json!({
                        "role": if msg.role == Role::User { "user" } else { "assistant" },
                        "content": content_to_blocks(&msg.content),
                    }));
                }
                Role::Tool => {
                    // Tool results ride a user message as tool_result blocks.
                    messages.push(json!({
                        "role": "user",
                        "content": content_to_blocks(&msg.content),
                    }));
                }
            }
        }

        let mut body = json!({
            "model": req.model,
            "max_tokens": req.max_tokens,
            "messages": messages,
            "stream": true,
        });
        if let Some(system) = system {
            body["system"] = Value::String(system);
        }
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

fn content_to_blocks(content: &MessageContent) -> Value {
    match content {
        MessageContent::Text(t) => json!([{"type": "text", "text": t}]),
        MessageContent::Parts(parts) => {
            let blocks: Vec<Value> = parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => json!({"type": "text", "text": text}),
                    ContentPart::ToolUse { id, name, input } => json!({
                        "type": "tool_use", "id": id, "name": name, "input": input,
                    }),
                    ContentPart::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => json!({
                        "type": "tool_result",
                        "tool_use_id": tool_use_id,
                        "content": content,
                        "is_error": is_error,
                    }),
                    ContentPart::Image { media_type, data } => json!({
                        "type": "image",
                        "source": {"type": "base64", "media_type": media_type, "data": data},
                    }),
                })
                .collect();
            Value::Array(blocks)
        }
    }
}

#[async_trait]
impl LlmProvider for MessagesClient {
    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let body = Self::build_body(req);
        let url = format!("{}/v1/messages", self.base_url);

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.token)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("llm proxy: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: "llm-proxy".into(),
                message: format!("HTTP {} - {text}", status.as_u16()),
            });
        }

        Ok(anthropic_sse_stream(resp))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Anthropic SSE → StreamEvent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct AnthropicStreamState {
    /// block index → (tool id, tool name, argument buffer).
    tool_blocks: HashMap<i64, (String, String, String)>,
    usage: Option<Usage>,
    stop_reason: Option<String>,
}

impl AnthropicStreamState {
    /// Translate one parsed SSE payload into stream events.
    fn handle(&mut self, data: &Value) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        match data.get("type").and_then(Value::as_str) {
            Some("content_block_start") => {
                let index = data.get("index").and_then(Value::as_i64).unwrap_or(0);
                let block = data.get("content_block").cloned().unwrap_or(Value::Null);
                if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                    let id = block
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let name = block
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    events.push(StreamEvent::ToolCallStarted {
                        call_id: id.clone(),
                        tool_name: name.clone(),
                    });
                    self.tool_blocks.insert(index, (id, name, String::new()));
                }
            }
            Some("content_block_delta") => {
                let index = data.get("index").and_then(Value::as_i64).unwrap_or(0);
                let delta = data.get("delta").cloned().unwrap_or(Value::Null);
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            events.push(StreamEvent::Token { text: text.into() });
                        }
                    }
                    Some("input_json_delta") => {
                        if let Some((id, _, buffer)) = self.tool_blocks.get_mut(&index) {
                            let fragment = delta
                                .get("partial_json")
                                .and_then(Value::as_str)
                                .unwrap_or("");
                            buffer.push_str(fragment);
                            events.push(StreamEvent::ToolCallDelta {
                                call_id: id.clone(),
                                delta: fragment.into(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Some("content_block_stop") => {
                let index = data.get("index").and_then(Value::as_i64).unwrap_or(0);
                if let Some((id, name, buffer)) = self.tool_blocks.remove(&index) {
                    let arguments = if buffer.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&buffer).unwrap_or_else(|_| {
                            tracing::warn!(call_id = %id, "tool arguments are not valid JSON");
                            json!({})
                        })
                    };
                    events.push(StreamEvent::ToolCallFinished {
                        call_id: id,
                        tool_name: name,
                        arguments,
                    });
                }
            }
            Some("message_delta") => {
                if let Some(reason) = data.pointer("/delta/stop_reason").and_then(Value::as_str) {
                    self.stop_reason = Some(reason.to_string());
                }
                if let Some(usage) = data.get("usage") {
                    self.usage = Some(Usage {
                        input_tokens: usage
                            .get("input_tokens")
                            .and_then(Value::as_u64)
                            .unwrap_or(0) as u32,
                        output_tokens: usage
                            .get("output_tokens")
                            .and_then(Value::as_u64)
                            .unwrap_or(0) as u32,
                    });
                }
            }
            Some("message_stop") => {
                events.push(StreamEvent::Done {
                    usage: self.usage.take(),
                    stop_reason: self.stop_reason.take(),
                });
            }
            Some("error") => {
                let message = data
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("stream error")
                    .to_string();
                events.push(StreamEvent::Error { message });
            }
            _ => {}
        }
        events
    }
}

fn anthropic_sse_stream(resp: reqwest::Response) -> BoxStream<'static, Result<StreamEvent>> {
    let stream = async_stream::stream! {
        let mut byte_stream = resp.bytes_stream();
        let mut buffer = String::new();
        let mut state = AnthropicStreamState::default();
        let mut done = false;

        while let Some(chunk) = byte_stream.next().await {
            match chunk {
                Ok(bytes) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for message in drain_events(&mut buffer) {
                        let Ok(data) = serde_json::from_str::<Value>(&message.data) else {
                            continue;
                        };
                        for event in state.handle(&data) {
                            if matches!(event, StreamEvent::Done { .. }) {
                                done = true;
                            }
                            yield Ok(event);
                        }
                    }
                }
                Err(e) => {
                    yield Err(Error::Upstream(format!("stream read: {e}")));
                    return;
                }
            }
        }

        if !done {
            yield Ok(StreamEvent::Done { usage: None, stop_reason: None });
        }
    };
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_block_assembles_arguments() {
        let mut state = AnthropicStreamState::default();
        let mut events = Vec::new();
        events.extend(state.handle(&json!({
            "type": "content_block_start", "index": 0,
            "content_block": {"type": "tool_use", "id": "t1", "name": "list_pods", "input": {}},
        })));
        events.extend(state.handle(&json!({
            "type": "content_block_delta", "index": 0,
            "delta": {"type": "input_json_delta", "partial_json": "{\"namespace\":"},
        })));
        events.extend(state.handle(&json!({
            "type": "content_block_delta", "index": 0,
            "delta": {"type": "input_json_delta", "partial_json": "\"prod\"}"},
        })));
        events.extend(state.handle(&json!({"type": "content_block_stop", "index": 0})));

        match events.last().unwrap() {
            StreamEvent::ToolCallFinished {
                call_id,
                tool_name,
                arguments,
            } => {
                assert_eq!(call_id, "t1");
                assert_eq!(tool_name, "list_pods");
                assert_eq!(arguments["namespace"], "prod");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn message_delta_then_stop_yields_done_with_usage() {
        let mut state = AnthropicStreamState::default();
        state.handle(&json!({
            "type": "message_delta",
            "delta": {"stop_reason": "end_turn"},
            "usage": {"input_tokens": 10, "output_tokens": 4},
        }));
        let events = state.handle(&json!({"type": "message_stop"}));
        match &events[0] {
            StreamEvent::Done { usage, stop_reason } => {
                assert_eq!(stop_reason.as_deref(), Some("end_turn"));
                assert_eq!(usage.as_ref().unwrap().output_tokens, 4);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn request_body_splits_system_and_tools() {
        let req = ChatRequest {
            messages: vec![
                Message::system("you are an SRE"),
                Message::user("list pods in prod"),
            ],
            tools: vec![ToolDefinition {
                name: "list_pods".into(),
                description: "List pods".into(),
                parameters: json!({"type": "object"}),
            }],
            model: Some("claude-sonnet-4-20250514".into()),
            max_tokens: 8192,
        };
        let body = MessagesClient::build_body(&req);
        assert_eq!(body["system"], "you are an SRE");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["tools"][0]["name"], "list_pods");
        assert_eq!(body["stream"], true);
    }
}
