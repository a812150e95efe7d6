//! Streaming SSE translation: OpenAI chunk stream → Anthropic events.
//!
//! A state machine that opens/closes content blocks as the provider's
//! deltas switch between text and tool calls, and accumulates usage for
//! the closing `message_delta`. Event lifecycle:
//!
//! ```text
//! message_start
//!   (content_block_start → content_block_delta* → content_block_stop)+
//! message_delta(stop_reason, usage) → message_stop
//! ```

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::translate::{map_stop_reason, new_message_id, new_tool_use_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolUse,
}

struct ToolBlock {
    block_index: i64,
}

/// Converts OpenAI-format streaming chunks into Anthropic SSE strings.
pub struct StreamTranslator {
    model_name: String,
    message_id: String,

    message_started: bool,
    block_index: i64,
    open_block: Option<BlockKind>,

    /// OpenAI tool-call index → state.
    tool_calls: HashMap<i64, ToolBlock>,

    finish_reason: Option<String>,
    input_tokens: u64,
    output_tokens: u64,
}

impl StreamTranslator {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            message_id: new_message_id(),
            message_started: false,
            block_index: -1,
            open_block: None,
            tool_calls: HashMap::new(),
            finish_reason: None,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Translate one provider chunk into zero or more SSE strings.
    pub fn translate_chunk(&mut self, chunk: &Value) -> Vec<String> {
        let mut events = Vec::new();

        if !self.message_started {
            events.push(self.message_start());
            self.message_started = true;
        }

        let choice = chunk
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first());

        // Usage can ride the last content chunk or a trailing
        // usage-only chunk.
        if let Some(usage) = chunk.get("usage") {
            self.update_usage(usage);
        }

        let Some(choice) = choice else {
            return events;
        };
        let delta = choice.get("delta").cloned().unwrap_or(json!({}));

        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                events.extend(self.handle_text(text));
            }
        }

        for tc in delta
            .get("tool_calls")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            events.extend(self.handle_tool_call(tc));
        }

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.finish_reason = Some(reason.to_string());
        }

        events
    }

    /// Close any open block and emit `message_delta` + `message_stop`.
    pub fn finalize(&mut self) -> Vec<String> {
        let mut events = Vec::new();

        if !self.message_started {
            events.push(self.message_start());
            self.message_started = true;
        }

        if self.open_block.take().is_some() {
            events.push(self.block_stop());
        }

        let stop_reason = map_stop_reason(self.finish_reason.as_deref());
        events.push(format_sse(
            "message_delta",
            &json!({
                "type": "message_delta",
                "delta": {"stop_reason": stop_reason},
                "usage": {
                    "input_tokens": self.input_tokens,
                    "output_tokens": self.output_tokens,
                },
            }),
        ));
        events.push(format_sse("message_stop", &json!({"type": "message_stop"})));
        events
    }

    /// A single in-stream error event; the consumer renders a normal
    /// message end after it.
    pub fn error_event(message: &str) -> String {
        format_sse(
            "error",
            &crate::translate::error_body("api_error", message),
        )
    }

    // ── internals ────────────────────────────────────────────────────

    fn handle_text(&mut self, text: &str) -> Vec<String> {
        let mut events = Vec::new();

        if self.open_block == Some(BlockKind::ToolUse) {
            events.push(self.block_stop());
            self.open_block = None;
        }
        if self.open_block != Some(BlockKind::Text) {
            self.block_index += 1;
            self.open_block = Some(BlockKind::Text);
            events.push(format_sse(
                "content_block_start",
                &json!({
                    "type": "content_block_start",
                    "index": self.block_index,
                    "content_block": {"type": "text", "text": ""},
                }),
            ));
        }
        events.push(format_sse(
            "content_block_delta",
            &json!({
                "type": "content_block_delta",
                "index": self.block_index,
                "delta": {"type": "text_delta", "text": text},
            }),
        ));
        events
    }

    fn handle_tool_call(&mut self, tc: &Value) -> Vec<String> {
        let mut events = Vec::new();
        let tc_index = tc.get("index").and_then(Value::as_i64).unwrap_or(0);

        if !self.tool_calls.contains_key(&tc_index) {
            // New tool call: close whatever block is open.
            if self.open_block.take().is_some() {
                events.push(self.block_stop());
            }
            self.block_index += 1;
            self.open_block = Some(BlockKind::ToolUse);

            let tool_id = tc
                .get("id")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(new_tool_use_id);
            let tool_name = tc
                .pointer("/function/name")
                .and_then(Value::as_str)
                .unwrap_or("");

            self.tool_calls.insert(
                tc_index,
                ToolBlock {
                    block_index: self.block_index,
                },
            );

            events.push(format_sse(
                "content_block_start",
                &json!({
                    "type": "content_block_start",
                    "index": self.block_index,
                    "content_block": {
                        "type": "tool_use",
                        "id": tool_id,
                        "name": tool_name,
                        "input": {},
                    },
                }),
            ));
        }

        if let Some(fragment) = tc.pointer("/function/arguments").and_then(Value::as_str) {
            if !fragment.is_empty() {
                let block_index = self.tool_calls[&tc_index].block_index;
                events.push(format_sse(
                    "content_block_delta",
                    &json!({
                        "type": "content_block_delta",
                        "index": block_index,
                        "delta": {"type": "input_json_delta", "partial_json": fragment},
                    }),
                ));
            }
        }

        events
    }

    fn message_start(&self) -> String {
        format_sse(
            "message_start",
            &json!({
                "type": "message_start",
                "message": {
                    "id": self.message_id,
                    "type": "message",
                    "role": "assistant",
                    "content": [],
                    "model": self.model_name,
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": {"input_tokens": 0, "output_tokens": 0},
                },
            }),
        )
    }

    fn block_stop(&self) -> String {
        format_sse(
            "content_block_stop",
            &json!({"type": "content_block_stop", "index": self.block_index}),
        )
    }

    fn update_usage(&mut self, usage: &Value) {
        if let Some(prompt) = usage.get("prompt_tokens").and_then(Value::as_u64) {
            self.input_tokens = prompt;
        }
        if let Some(completion) = usage.get("completion_tokens").and_then(Value::as_u64) {
            self.output_tokens = completion;
        }
    }
}

fn format_sse(event_type: &str, data: &Value) -> String {
    format!("event: {event_type}\ndata: {data}\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_types(events: &[String]) -> Vec<String> {
        events
            .iter()
            .map(|e| {
                e.lines()
                    .next()
                    .unwrap()
                    .strip_prefix("event: ")
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    fn data_of(event: &str) -> Value {
        let line = event
            .lines()
            .find(|l| l.starts_with("data: "))
            .unwrap()
            .strip_prefix("data: ")
            .unwrap();
        serde_json::from_str(line).unwrap()
    }

    fn text_chunk(text: &str) -> Value {
        json!({"choices": [{"delta": {"content": text}}]})
    }

    #[test]
    fn text_stream_is_well_formed() {
        let mut tr = StreamTranslator::new("openai/gpt-4o");
        let mut all: Vec<String> = Vec::new();
        all.extend(tr.translate_chunk(&text_chunk("Hel")));
        all.extend(tr.translate_chunk(&text_chunk("lo")));
        all.extend(tr.translate_chunk(
            &json!({"choices": [{"delta": {}, "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 7, "completion_tokens": 2}}),
        ));
        all.extend(tr.finalize());

        let types = event_types(&all);
        assert_eq!(
            types,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        let delta = data_of(&all[types.iter().position(|t| t == "message_delta").unwrap()]);
        assert_eq!(delta["delta"]["stop_reason"], "end_turn");
        assert_eq!(delta["usage"]["input_tokens"], 7);
        assert_eq!(delta["usage"]["output_tokens"], 2);
    }

    #[test]
    fn tool_call_stream_emits_input_json_deltas() {
        let mut tr = StreamTranslator::new("openai/gpt-4o");
        let mut all: Vec<String> = Vec::new();
        all.extend(tr.translate_chunk(&json!({
            "choices": [{"delta": {"tool_calls": [{
                "index": 0, "id": "call_1",
                "function": {"name": "list_pods", "arguments": ""},
            }]}}],
        })));
        all.extend(tr.translate_chunk(&json!({
            "choices": [{"delta": {"tool_calls": [{
                "index": 0, "function": {"arguments": "{\"namespace\":"},
            }]}}],
        })));
        all.extend(tr.translate_chunk(&json!({
            "choices": [{"delta": {"tool_calls": [{
                "index": 0, "function": {"arguments": "\"prod\"}"},
            }]}}],
        })));
        all.extend(tr.translate_chunk(
            &json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
        ));
        all.extend(tr.finalize());

        let types = event_types(&all);
        assert_eq!(
            types,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        let start = data_of(&all[1]);
        assert_eq!(start["content_block"]["type"], "tool_use");
        assert_eq!(start["content_block"]["id"], "call_1");
        assert_eq!(start["content_block"]["name"], "list_pods");

        let frag1 = data_of(&all[2]);
        assert_eq!(frag1["delta"]["type"], "input_json_delta");
        let joined = format!(
            "{}{}",
            frag1["delta"]["partial_json"].as_str().unwrap(),
            data_of(&all[3])["delta"]["partial_json"].as_str().unwrap(),
        );
        assert_eq!(joined, "{\"namespace\":\"prod\"}");

        let delta = data_of(&all[5]);
        assert_eq!(delta["delta"]["stop_reason"], "tool_use");
    }

    #[test]
    fn text_to_tool_switch_closes_text_block_first() {
        let mut tr = StreamTranslator::new("m");
        let mut all: Vec<String> = Vec::new();
        all.extend(tr.translate_chunk(&text_chunk("thinking")));
        all.extend(tr.translate_chunk(&json!({
            "choices": [{"delta": {"tool_calls": [{
                "index": 0, "id": "call_1", "function": {"name": "f", "arguments": "{}"},
            }]}}],
        })));
        all.extend(tr.finalize());

        let types = event_types(&all);
        assert_eq!(
            types,
            vec![
                "message_start",
                "content_block_start",  // text
                "content_block_delta",
                "content_block_stop",   // text closed before tool opens
                "content_block_start",  // tool_use
                "content_block_delta",  // "{}" fragment
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        // Block indexes advance.
        assert_eq!(data_of(&all[1])["index"], 0);
        assert_eq!(data_of(&all[4])["index"], 1);
    }

    #[test]
    fn usage_only_trailing_chunk_is_accumulated() {
        let mut tr = StreamTranslator::new("m");
        let mut all: Vec<String> = Vec::new();
        all.extend(tr.translate_chunk(&text_chunk("hi")));
        all.extend(tr.translate_chunk(
            &json!({"choices": [], "usage": {"prompt_tokens": 100, "completion_tokens": 25}}),
        ));
        all.extend(tr.finalize());
        let delta = all
            .iter()
            .find(|e| e.starts_with("event: message_delta"))
            .unwrap();
        let data = data_of(delta);
        assert_eq!(data["usage"]["input_tokens"], 100);
        assert_eq!(data["usage"]["output_tokens"], 25);
    }

    #[test]
    fn empty_stream_still_brackets_the_message() {
        let mut tr = StreamTranslator::new("m");
        let all = tr.finalize();
        let types = event_types(&all);
        assert_eq!(types, vec!["message_start", "message_delta", "message_stop"]);
    }

    #[test]
    fn balanced_start_stop_pairs_per_index() {
        let mut tr = StreamTranslator::new("m");
        let mut all: Vec<String> = Vec::new();
        all.extend(tr.translate_chunk(&text_chunk("a")));
        all.extend(tr.translate_chunk(&json!({
            "choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "c0", "function": {"name": "f", "arguments": "{}"}},
            ]}}],
        })));
        all.extend(tr.translate_chunk(&json!({
            "choices": [{"delta": {"tool_calls": [
                {"index": 1, "id": "c1", "function": {"name": "g", "arguments": "{}"}},
            ]}}],
        })));
        all.extend(tr.finalize());

        let starts: Vec<i64> = all
            .iter()
            .filter(|e| e.starts_with("event: content_block_start"))
            .map(|e| data_of(e)["index"].as_i64().unwrap())
            .collect();
        let stops: Vec<i64> = all
            .iter()
            .filter(|e| e.starts_with("event: content_block_stop"))
            .map(|e| data_of(e)["index"].as_i64().unwrap())
            .collect();
        assert_eq!(starts, vec![0, 1, 2]);
        assert_eq!(stops, vec![0, 1, 2]);
    }
}
