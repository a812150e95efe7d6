//! Translation between the Anthropic Messages API and the OpenAI Chat
//! Completions API.
//!
//! Pure functions over `serde_json::Value` with no I/O — the request
//! and response sides are exercised heavily by unit tests.

use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Anthropic server tools have no meaning on other providers and are
/// dropped from translated requests.
const SERVER_TOOL_NAMES: [&str; 4] = ["web_search", "computer", "text_editor", "bash"];
const SERVER_TOOL_TYPES: [&str; 3] = [
    "computer_20241022",
    "text_editor_20241022",
    "bash_20241022",
];

pub fn new_message_id() -> String {
    format!("msg_{}", &Uuid::new_v4().simple().to_string()[..24])
}

pub fn new_tool_use_id() -> String {
    format!("toolu_{}", &Uuid::new_v4().simple().to_string()[..24])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request translation: Anthropic → OpenAI
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Convert an Anthropic Messages request body to Chat Completions shape.
pub fn anthropic_to_openai_request(body: &Value) -> Value {
    let mut messages: Vec<Value> = Vec::new();

    // System prompt: plain string or an array of text blocks.
    match body.get("system") {
        Some(Value::String(s)) if !s.is_empty() => {
            messages.push(json!({"role": "system", "content": s}));
        }
        Some(Value::Array(blocks)) => {
            let text = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n");
            if !text.is_empty() {
                messages.push(json!({"role": "system", "content": text}));
            }
        }
        _ => {}
    }

    for msg in body
        .get("messages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        messages.extend(convert_message(msg));
    }

    let mut result = Map::new();
    result.insert("messages".into(), Value::Array(messages));

    for key in ["max_tokens", "temperature", "top_p"] {
        if let Some(v) = body.get(key) {
            result.insert(key.into(), v.clone());
        }
    }
    if let Some(stop) = body.get("stop_sequences") {
        result.insert("stop".into(), stop.clone());
    }

    if body.get("stream").and_then(Value::as_bool) == Some(true) {
        result.insert("stream".into(), Value::Bool(true));
        result.insert("stream_options".into(), json!({"include_usage": true}));
    }

    if let Some(tools) = body.get("tools").and_then(Value::as_array) {
        let converted: Vec<Value> = tools
            .iter()
            .filter(|t| is_client_tool(t))
            .map(convert_tool)
            .collect();
        if !converted.is_empty() {
            result.insert("tools".into(), Value::Array(converted));
        }
    }

    if let Some(choice) = body.get("tool_choice") {
        result.insert("tool_choice".into(), convert_tool_choice(choice));
    }

    Value::Object(result)
}

/// Convert one Anthropic message to one or more OpenAI messages.
///
/// Anthropic packs `tool_use` and `tool_result` into content blocks;
/// OpenAI wants `tool_calls` on the assistant message and separate
/// `{role:"tool"}` messages for results.
fn convert_message(msg: &Value) -> Vec<Value> {
    let role = msg.get("role").and_then(Value::as_str).unwrap_or("user");
    let content = msg.get("content");

    let blocks = match content {
        Some(Value::String(s)) => {
            return vec![json!({"role": role, "content": s})];
        }
        Some(Value::Array(blocks)) => blocks,
        _ => return vec![json!({"role": role, "content": ""})],
    };

    let mut content_parts: Vec<Value> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();
    let mut tool_results: Vec<Value> = Vec::new();

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                content_parts.push(json!({
                    "type": "text",
                    "text": block.get("text").and_then(Value::as_str).unwrap_or(""),
                }));
            }
            Some("image") => {
                let source = block.get("source").cloned().unwrap_or(Value::Null);
                match source.get("type").and_then(Value::as_str) {
                    Some("url") => content_parts.push(json!({
                        "type": "image_url",
                        "image_url": {"url": source.get("url")},
                    })),
                    Some("base64") => {
                        let media = source
                            .get("media_type")
                            .and_then(Value::as_str)
                            .unwrap_or("image/png");
                        let data = source.get("data").and_then(Value::as_str).unwrap_or("");
                        content_parts.push(json!({
                            "type": "image_url",
                            "image_url": {"url": format!("data:{media};base64,{data}")},
                        }));
                    }
                    _ => {}
                }
            }
            Some("tool_use") => {
                let id = block
                    .get("id")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(new_tool_use_id);
                let arguments = block
                    .get("input")
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "{}".into());
                tool_calls.push(json!({
                    "id": id,
                    "type": "function",
                    "function": {
                        "name": block.get("name").and_then(Value::as_str).unwrap_or(""),
                        "arguments": arguments,
                    },
                }));
            }
            Some("tool_result") => tool_results.push(block.clone()),
            _ => {}
        }
    }

    let mut out: Vec<Value> = Vec::new();

    let content_value = if content_parts.len() == 1
        && content_parts[0].get("type").and_then(Value::as_str) == Some("text")
    {
        content_parts[0].get("text").cloned().unwrap_or_default()
    } else if content_parts.is_empty() {
        Value::String(String::new())
    } else {
        Value::Array(content_parts.clone())
    };

    if !tool_calls.is_empty() {
        // Assistant message carrying the tool calls (and any text).
        out.push(json!({
            "role": "assistant",
            "content": content_value,
            "tool_calls": tool_calls,
        }));
    } else if !content_parts.is_empty() {
        out.push(json!({"role": role, "content": content_value}));
    }

    // Each tool_result becomes its own tool-role message, in order.
    for tr in tool_results {
        let content = match tr.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(blocks)) => blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        };
        out.push(json!({
            "role": "tool",
            "tool_call_id": tr.get("tool_use_id").and_then(Value::as_str).unwrap_or(""),
            "content": content,
        }));
    }

    if out.is_empty() {
        out.push(json!({"role": role, "content": ""}));
    }
    out
}

fn convert_tool(tool: &Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.get("name").and_then(Value::as_str).unwrap_or(""),
            "description": tool.get("description").and_then(Value::as_str).unwrap_or(""),
            "parameters": tool.get("input_schema").cloned().unwrap_or(json!({})),
        },
    })
}

/// Client tools translate; Anthropic server tools are dropped.
fn is_client_tool(tool: &Value) -> bool {
    if let Some(t) = tool.get("type").and_then(Value::as_str) {
        if SERVER_TOOL_TYPES.contains(&t) {
            return false;
        }
    }
    let name = tool.get("name").and_then(Value::as_str).unwrap_or("");
    !SERVER_TOOL_NAMES.contains(&name)
}

fn convert_tool_choice(choice: &Value) -> Value {
    match choice {
        Value::String(s) if s == "any" => Value::String("required".into()),
        Value::String(s) => Value::String(s.clone()),
        Value::Object(obj) => match obj.get("type").and_then(Value::as_str) {
            Some("tool") => json!({
                "type": "function",
                "function": {"name": obj.get("name")},
            }),
            Some("any") => Value::String("required".into()),
            Some("none") => Value::String("none".into()),
            _ => Value::String("auto".into()),
        },
        _ => Value::String("auto".into()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response translation: OpenAI → Anthropic
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Map an OpenAI `finish_reason` to an Anthropic `stop_reason`.
pub fn map_stop_reason(finish_reason: Option<&str>) -> &'static str {
    match finish_reason {
        Some("stop") => "end_turn",
        Some("tool_calls") | Some("function_call") => "tool_use",
        Some("length") => "max_tokens",
        Some("content_filter") => "end_turn",
        _ => "end_turn",
    }
}

/// Convert a Chat Completions response to Anthropic Messages shape.
pub fn openai_to_anthropic_response(response: &Value, model_name: &str) -> Value {
    let Some(choice) = response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    else {
        return error_body("api_error", "No choices in response");
    };
    let message = choice.get("message").cloned().unwrap_or(json!({}));

    let mut content: Vec<Value> = Vec::new();

    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            content.push(json!({"type": "text", "text": text}));
        }
    }

    for tc in message
        .get("tool_calls")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let func = tc.get("function").cloned().unwrap_or(json!({}));
        let arguments = func.get("arguments").and_then(Value::as_str).unwrap_or("{}");
        let input: Value =
            serde_json::from_str(arguments).unwrap_or_else(|_| Value::String(arguments.into()));
        content.push(json!({
            "type": "tool_use",
            "id": tc.get("id").and_then(Value::as_str).map(String::from)
                .unwrap_or_else(new_tool_use_id),
            "name": func.get("name").and_then(Value::as_str).unwrap_or(""),
            "input": input,
        }));
    }

    if content.is_empty() {
        content.push(json!({"type": "text", "text": ""}));
    }

    let finish_reason = choice.get("finish_reason").and_then(Value::as_str);
    let usage = response.get("usage").cloned().unwrap_or(json!({}));

    json!({
        "id": response.get("id").and_then(Value::as_str).map(String::from)
            .unwrap_or_else(new_message_id),
        "type": "message",
        "role": "assistant",
        "model": model_name,
        "content": content,
        "stop_reason": map_stop_reason(finish_reason),
        "stop_sequence": null,
        "usage": {
            "input_tokens": usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
            "output_tokens": usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
        },
    })
}

/// Convert a provider error body to the Anthropic error taxonomy.
pub fn openai_error_to_anthropic(error_body_value: &Value) -> Value {
    let error = error_body_value.get("error").cloned().unwrap_or(json!({}));
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| error_body_value.to_string());
    let error_type = error.get("type").and_then(Value::as_str).unwrap_or("api_error");

    let mapped = match error_type {
        "invalid_request_error" => "invalid_request_error",
        "authentication_error" => "authentication_error",
        "permission_error" => "permission_error",
        "not_found_error" => "not_found_error",
        "rate_limit_error" | "insufficient_quota" => "rate_limit_error",
        _ => "api_error",
    };
    error_body(mapped, &message)
}

pub fn error_body(error_type: &str, message: &str) -> Value {
    json!({
        "type": "error",
        "error": {"type": error_type, "message": message},
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_string_becomes_system_message() {
        let body = json!({"system": "be brief", "messages": []});
        let out = anthropic_to_openai_request(&body);
        assert_eq!(out["messages"][0]["role"], "system");
        assert_eq!(out["messages"][0]["content"], "be brief");
    }

    #[test]
    fn system_blocks_are_joined() {
        let body = json!({
            "system": [
                {"type": "text", "text": "one"},
                {"type": "text", "text": "two"},
            ],
            "messages": [],
        });
        let out = anthropic_to_openai_request(&body);
        assert_eq!(out["messages"][0]["content"], "one\ntwo");
    }

    #[test]
    fn tool_use_becomes_tool_calls_on_same_assistant_message() {
        let body = json!({
            "messages": [{
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "checking pods"},
                    {"type": "tool_use", "id": "toolu_1", "name": "list_pods",
                     "input": {"namespace": "prod"}},
                ],
            }],
        });
        let out = anthropic_to_openai_request(&body);
        let msg = &out["messages"][0];
        assert_eq!(msg["role"], "assistant");
        assert_eq!(msg["content"], "checking pods");
        assert_eq!(msg["tool_calls"][0]["id"], "toolu_1");
        assert_eq!(msg["tool_calls"][0]["function"]["name"], "list_pods");
        let args: Value =
            serde_json::from_str(msg["tool_calls"][0]["function"]["arguments"].as_str().unwrap())
                .unwrap();
        assert_eq!(args["namespace"], "prod");
    }

    #[test]
    fn tool_results_become_separate_tool_messages_in_order() {
        let body = json!({
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "3 pods"},
                    {"type": "tool_result", "tool_use_id": "toolu_2",
                     "content": [{"type": "text", "text": "ok"}]},
                ],
            }],
        });
        let out = anthropic_to_openai_request(&body);
        let msgs = out["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["role"], "tool");
        assert_eq!(msgs[0]["tool_call_id"], "toolu_1");
        assert_eq!(msgs[0]["content"], "3 pods");
        assert_eq!(msgs[1]["tool_call_id"], "toolu_2");
        assert_eq!(msgs[1]["content"], "ok");
    }

    #[test]
    fn server_tools_are_dropped() {
        let body = json!({
            "messages": [],
            "tools": [
                {"name": "list_pods", "input_schema": {"type": "object"}},
                {"name": "web_search"},
                {"name": "edit", "type": "text_editor_20241022"},
            ],
        });
        let out = anthropic_to_openai_request(&body);
        let tools = out["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["function"]["name"], "list_pods");
    }

    #[test]
    fn tool_choice_mapping() {
        assert_eq!(convert_tool_choice(&json!("any")), json!("required"));
        assert_eq!(convert_tool_choice(&json!("auto")), json!("auto"));
        assert_eq!(
            convert_tool_choice(&json!({"type": "tool", "name": "list_pods"})),
            json!({"type": "function", "function": {"name": "list_pods"}})
        );
        assert_eq!(convert_tool_choice(&json!({"type": "any"})), json!("required"));
    }

    #[test]
    fn stream_implies_usage_option() {
        let out = anthropic_to_openai_request(&json!({"messages": [], "stream": true}));
        assert_eq!(out["stream"], true);
        assert_eq!(out["stream_options"]["include_usage"], true);
    }

    #[test]
    fn optional_fields_pass_through() {
        let out = anthropic_to_openai_request(&json!({
            "messages": [],
            "max_tokens": 1024,
            "temperature": 0.2,
            "top_p": 0.9,
            "stop_sequences": ["END"],
        }));
        assert_eq!(out["max_tokens"], 1024);
        assert_eq!(out["temperature"], 0.2);
        assert_eq!(out["stop"], json!(["END"]));
    }

    #[test]
    fn base64_image_becomes_data_uri() {
        let body = json!({
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "what is this"},
                    {"type": "image", "source": {
                        "type": "base64", "media_type": "image/png", "data": "aGk=",
                    }},
                ],
            }],
        });
        let out = anthropic_to_openai_request(&body);
        let parts = out["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,aGk=");
    }

    // ── response side ───────────────────────────────────────────────

    #[test]
    fn response_maps_text_and_tool_calls() {
        let response = json!({
            "id": "chatcmpl-1",
            "choices": [{
                "message": {
                    "content": "running checks",
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {"name": "list_pods", "arguments": "{\"namespace\":\"prod\"}"},
                    }],
                },
                "finish_reason": "tool_calls",
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5},
        });
        let out = openai_to_anthropic_response(&response, "openai/gpt-4o");
        assert_eq!(out["stop_reason"], "tool_use");
        assert_eq!(out["content"][0]["type"], "text");
        assert_eq!(out["content"][1]["type"], "tool_use");
        assert_eq!(out["content"][1]["id"], "call_1");
        assert_eq!(out["content"][1]["input"]["namespace"], "prod");
        assert_eq!(out["usage"]["input_tokens"], 12);
        assert_eq!(out["usage"]["output_tokens"], 5);
    }

    #[test]
    fn empty_text_with_tool_calls_omits_text_block() {
        let response = json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {"name": "f", "arguments": "{}"},
                    }],
                },
                "finish_reason": "tool_calls",
            }],
        });
        let out = openai_to_anthropic_response(&response, "m");
        assert_eq!(out["content"].as_array().unwrap().len(), 1);
        assert_eq!(out["content"][0]["type"], "tool_use");
    }

    #[test]
    fn stop_reason_table() {
        assert_eq!(map_stop_reason(Some("stop")), "end_turn");
        assert_eq!(map_stop_reason(Some("tool_calls")), "tool_use");
        assert_eq!(map_stop_reason(Some("function_call")), "tool_use");
        assert_eq!(map_stop_reason(Some("length")), "max_tokens");
        assert_eq!(map_stop_reason(Some("content_filter")), "end_turn");
        assert_eq!(map_stop_reason(Some("whatever")), "end_turn");
        assert_eq!(map_stop_reason(None), "end_turn");
    }

    #[test]
    fn request_response_round_trip_preserves_tools_and_content() {
        // The translated request's assistant turn survives a provider
        // echo and maps back with matching ids and stop reason.
        let anthropic_request = json!({
            "messages": [{
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "let me check"},
                    {"type": "tool_use", "id": "toolu_abc", "name": "list_pods",
                     "input": {"namespace": "prod"}},
                ],
            }],
        });
        let openai = anthropic_to_openai_request(&anthropic_request);
        let echoed = json!({
            "choices": [{
                "message": openai["messages"][0],
                "finish_reason": "tool_calls",
            }],
        });
        let back = openai_to_anthropic_response(&echoed, "m");
        assert_eq!(back["content"][0]["text"], "let me check");
        assert_eq!(back["content"][1]["id"], "toolu_abc");
        assert_eq!(back["content"][1]["input"]["namespace"], "prod");
        assert_eq!(back["stop_reason"], "tool_use");
    }

    #[test]
    fn provider_errors_map_to_anthropic_taxonomy() {
        let rate = openai_error_to_anthropic(
            &json!({"error": {"type": "insufficient_quota", "message": "slow down"}}),
        );
        assert_eq!(rate["error"]["type"], "rate_limit_error");
        assert_eq!(rate["error"]["message"], "slow down");

        let unknown = openai_error_to_anthropic(&json!({"error": {"type": "weird"}}));
        assert_eq!(unknown["error"]["type"], "api_error");
    }
}
