//! Model dispatch and provider-consistency patches.
//!
//! The effective model is chosen from (1) team config, (2) deployment
//! default, (3) the request body, (4) the hardcoded default. Claude
//! models pass through to Anthropic untouched; everything else is
//! translated and sent to the provider the model name selects.

use serde_json::{json, Value};

/// OpenAI-side hard limit on the tools array.
pub const MAX_TOOLS: usize = 128;

/// Per-provider completion-token caps. The SDK defaults to far more
/// than some providers accept.
const PROVIDER_MAX_TOKENS: &[(&str, u64)] = &[
    ("openai", 16_384),
    ("deepseek", 8_192),
    ("mistral", 8_192),
    ("groq", 8_192),
    ("fireworks_ai", 8_192),
    ("cohere", 4_096),
];

/// Whether a model string names a Claude/Anthropic model.
pub fn is_claude_model(model: &str) -> bool {
    let m = model.to_lowercase();
    m.starts_with("claude") || m.starts_with("anthropic/")
}

/// Map a model string to the credential integration that funds it.
pub fn provider_for_model(model: &str) -> &'static str {
    let m = model.to_lowercase();
    let prefixes: &[(&str, &'static str)] = &[
        ("claude", "anthropic"),
        ("anthropic/", "anthropic"),
        ("openai/", "openai"),
        ("gpt-", "openai"),
        ("o1-", "openai"),
        ("o3-", "openai"),
        ("gemini/", "gemini"),
        ("azure/", "azure"),
        ("bedrock/", "bedrock"),
        ("mistral/", "mistral"),
        ("cohere/", "cohere"),
        ("command-r", "cohere"),
        ("together_ai/", "together_ai"),
        ("groq/", "groq"),
        ("fireworks_ai/", "fireworks_ai"),
        ("xai/", "xai"),
        ("vertex_ai/", "vertex_ai"),
        ("ollama/", "ollama"),
        ("openrouter/", "openrouter"),
        ("deepseek/", "deepseek"),
    ];
    for (prefix, provider) in prefixes {
        if m.starts_with(prefix) {
            return provider;
        }
    }
    // Catch-all for unrecognized model names.
    "openrouter"
}

/// Choose the effective model for a request.
///
/// Priority: team config → deployment default → request body →
/// hardcoded default.
pub fn effective_model(
    team_model: Option<&str>,
    deployment_model: Option<&str>,
    body_model: Option<&str>,
    default_model: &str,
) -> String {
    for candidate in [team_model, deployment_model, body_model] {
        if let Some(model) = candidate {
            if !model.is_empty() {
                return model.to_string();
            }
        }
    }
    default_model.to_string()
}

/// HTTP base URL for an OpenAI-compatible provider.
pub fn provider_base_url(provider: &str) -> &'static str {
    match provider {
        "openai" => "https://api.openai.com/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "mistral" => "https://api.mistral.ai/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "fireworks_ai" => "https://api.fireworks.ai/inference/v1",
        "together_ai" => "https://api.together.xyz/v1",
        "xai" => "https://api.x.ai/v1",
        "gemini" => "https://generativelanguage.googleapis.com/v1beta/openai",
        "cohere" => "https://api.cohere.ai/compatibility/v1",
        "ollama" => "http://localhost:11434/v1",
        _ => "https://openrouter.ai/api/v1",
    }
}

/// Provider APIs want the bare model name, without our routing prefix.
pub fn strip_provider_prefix(model: &str) -> &str {
    model.split_once('/').map_or(model, |(_, rest)| rest)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Consistency patches
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Patch a translated request in place before it leaves for the
/// provider: truncate oversized tool lists, cap `max_tokens`, and give
/// every dangling assistant `tool_calls[].id` a synthetic result.
pub fn apply_consistency_patches(body: &mut Value, provider: &str) {
    truncate_tools(body);
    cap_max_tokens(body, provider);
    patch_unresolved_tool_calls(body);
}

fn truncate_tools(body: &mut Value) {
    if let Some(tools) = body.get_mut("tools").and_then(Value::as_array_mut) {
        if tools.len() > MAX_TOOLS {
            tracing::warn!(
                from = tools.len(),
                to = MAX_TOOLS,
                "truncating tools to provider limit"
            );
            tools.truncate(MAX_TOOLS);
        }
    }
}

fn cap_max_tokens(body: &mut Value, provider: &str) {
    let Some(cap) = PROVIDER_MAX_TOKENS
        .iter()
        .find(|(p, _)| *p == provider)
        .map(|(_, cap)| *cap)
    else {
        return;
    };
    if let Some(max_tokens) = body.get("max_tokens").and_then(Value::as_u64) {
        if max_tokens > cap {
            tracing::warn!(provider, from = max_tokens, to = cap, "capping max_tokens");
            body["max_tokens"] = json!(cap);
        }
    }
}

/// Every assistant `tool_calls[].id` must be answered by a later
/// `{role:"tool"}` message. Providers reject histories with dangling
/// ids, which happen when a turn was interrupted mid-dispatch. Insert
/// `(no result)` stubs directly after the offending assistant message.
fn patch_unresolved_tool_calls(body: &mut Value) {
    let Some(messages) = body.get("messages").and_then(Value::as_array) else {
        return;
    };

    let mut pending: Vec<String> = Vec::new();
    let mut resolved: Vec<String> = Vec::new();
    for msg in messages {
        if msg.get("role").and_then(Value::as_str) == Some("assistant") {
            for tc in msg
                .get("tool_calls")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                if let Some(id) = tc.get("id").and_then(Value::as_str) {
                    pending.push(id.to_string());
                }
            }
        }
        if msg.get("role").and_then(Value::as_str) == Some("tool") {
            if let Some(id) = msg.get("tool_call_id").and_then(Value::as_str) {
                resolved.push(id.to_string());
            }
        }
    }

    let unresolved: Vec<String> = pending
        .into_iter()
        .filter(|id| !resolved.contains(id))
        .collect();
    if unresolved.is_empty() {
        return;
    }
    tracing::warn!(
        count = unresolved.len(),
        "patching unresolved tool_call ids with synthetic results"
    );

    let mut patched: Vec<Value> = Vec::new();
    for msg in messages {
        patched.push(msg.clone());
        if msg.get("role").and_then(Value::as_str) == Some("assistant") {
            for tc in msg
                .get("tool_calls")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                if let Some(id) = tc.get("id").and_then(Value::as_str) {
                    if unresolved.iter().any(|u| u == id) {
                        patched.push(json!({
                            "role": "tool",
                            "tool_call_id": id,
                            "content": "(no result)",
                        }));
                    }
                }
            }
        }
    }
    body["messages"] = Value::Array(patched);
}

/// Rough token estimate for non-Claude `count_tokens` requests:
/// serialized content length / 4.
pub fn estimate_input_tokens(body: &Value) -> u64 {
    let total: usize = body
        .get("messages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|m| {
            m.get("content")
                .map(|c| c.to_string().len())
                .unwrap_or(0)
        })
        .sum();
    (total / 4) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_detection() {
        assert!(is_claude_model("claude-sonnet-4-20250514"));
        assert!(is_claude_model("anthropic/claude-3-5-haiku"));
        assert!(!is_claude_model("openai/gpt-4o"));
    }

    #[test]
    fn provider_mapping() {
        assert_eq!(provider_for_model("openai/gpt-4o"), "openai");
        assert_eq!(provider_for_model("gpt-4o-mini"), "openai");
        assert_eq!(provider_for_model("deepseek/deepseek-chat"), "deepseek");
        assert_eq!(provider_for_model("command-r-plus"), "cohere");
        assert_eq!(provider_for_model("somevendor/mystery"), "openrouter");
    }

    #[test]
    fn model_priority_chain() {
        assert_eq!(
            effective_model(Some("gemini/g"), Some("openai/d"), Some("claude-x"), "def"),
            "gemini/g"
        );
        assert_eq!(
            effective_model(None, Some("openai/d"), Some("claude-x"), "def"),
            "openai/d"
        );
        assert_eq!(effective_model(None, None, Some("claude-x"), "def"), "claude-x");
        assert_eq!(effective_model(Some(""), None, None, "def"), "def");
    }

    #[test]
    fn tools_above_limit_are_truncated() {
        let tools: Vec<Value> = (0..200)
            .map(|i| json!({"type": "function", "function": {"name": format!("t{i}")}}))
            .collect();
        let mut body = json!({"messages": [], "tools": tools});
        apply_consistency_patches(&mut body, "openai");
        assert_eq!(body["tools"].as_array().unwrap().len(), MAX_TOOLS);
    }

    #[test]
    fn max_tokens_is_capped_per_provider() {
        let mut body = json!({"messages": [], "max_tokens": 32000});
        apply_consistency_patches(&mut body, "openai");
        assert_eq!(body["max_tokens"], 16384);

        let mut unknown = json!({"messages": [], "max_tokens": 32000});
        apply_consistency_patches(&mut unknown, "xai");
        assert_eq!(unknown["max_tokens"], 32000);
    }

    #[test]
    fn unresolved_tool_call_gets_synthetic_result_in_place() {
        let mut body = json!({"messages": [
            {"role": "assistant", "content": "", "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "a", "arguments": "{}"}},
                {"id": "call_2", "type": "function", "function": {"name": "b", "arguments": "{}"}},
            ]},
            {"role": "tool", "tool_call_id": "call_1", "content": "done"},
            {"role": "user", "content": "next"},
        ]});
        apply_consistency_patches(&mut body, "openai");
        let msgs = body["messages"].as_array().unwrap();
        // Synthetic result lands immediately after the assistant message.
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[1]["role"], "tool");
        assert_eq!(msgs[1]["tool_call_id"], "call_2");
        assert_eq!(msgs[1]["content"], "(no result)");
        assert_eq!(msgs[2]["tool_call_id"], "call_1");

        // Every assistant id now has a matching tool message.
        let resolved: Vec<&str> = msgs
            .iter()
            .filter(|m| m["role"] == "tool")
            .map(|m| m["tool_call_id"].as_str().unwrap())
            .collect();
        assert!(resolved.contains(&"call_1") && resolved.contains(&"call_2"));
    }

    #[test]
    fn fully_resolved_history_is_untouched() {
        let original = json!({"messages": [
            {"role": "assistant", "content": "", "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "a", "arguments": "{}"}},
            ]},
            {"role": "tool", "tool_call_id": "call_1", "content": "ok"},
        ]});
        let mut body = original.clone();
        apply_consistency_patches(&mut body, "openai");
        assert_eq!(body, original);
    }

    #[test]
    fn token_estimate_is_chars_over_four() {
        let body = json!({"messages": [
            {"role": "user", "content": "abcdefgh"},
        ]});
        // "abcdefgh" serializes with quotes: 10 chars → 2 tokens.
        assert_eq!(estimate_input_tokens(&body), 2);
    }
}
