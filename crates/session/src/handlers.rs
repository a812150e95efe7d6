//! Built-in tool handlers: knowledge-base queries, in-cluster
//! Kubernetes commands, and sub-agent delegation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};

use ifox_domain::event::AgentEvent;
use ifox_domain::message::{Message, ToolDefinition};
use ifox_domain::stream::StreamEvent;
use ifox_domain::{Error, Result};

use crate::provider::{ChatRequest, LlmProvider};
use crate::tools::{ToolContext, ToolHandler, ToolOutcome, ToolRegistry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Knowledge base
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared HTTP access to the knowledge-base service.
pub struct KnowledgeBaseClient {
    http: reqwest::Client,
    base_url: String,
}

impl KnowledgeBaseClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("knowledge base: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Upstream(format!(
                "knowledge base returned {}",
                resp.status().as_u16()
            )));
        }
        resp.json()
            .await
            .map_err(|e| Error::Upstream(format!("knowledge base decode: {e}")))
    }
}

/// `kb_search` — retrieve chunks from one tree.
pub struct KbSearchTool {
    pub client: Arc<KnowledgeBaseClient>,
}

#[async_trait]
impl ToolHandler for KbSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "kb_search".into(),
            description: "Search the team knowledge base for relevant runbooks and docs".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "top_k": {"type": "integer", "default": 10},
                    "tree": {"type": "string"},
                },
                "required": ["query"],
            }),
        }
    }

    async fn call(&self, input: &Value, _ctx: &ToolContext) -> ToolOutcome {
        match self.client.post("/api/v1/search", input).await {
            Ok(result) => ToolOutcome::ok(result.to_string()),
            Err(e) => ToolOutcome::error(e.to_string()),
        }
    }
}

/// `kb_answer` — retrieval plus answer synthesis with citations.
pub struct KbAnswerTool {
    pub client: Arc<KnowledgeBaseClient>,
}

#[async_trait]
impl ToolHandler for KbAnswerTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "kb_answer".into(),
            description: "Ask the knowledge base a question and get a cited answer".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string"},
                    "top_k": {"type": "integer", "default": 10},
                    "tree": {"type": "string"},
                },
                "required": ["question"],
            }),
        }
    }

    async fn call(&self, input: &Value, _ctx: &ToolContext) -> ToolOutcome {
        match self.client.post("/api/v1/answer", input).await {
            Ok(result) => ToolOutcome::ok(result.to_string()),
            Err(e) => ToolOutcome::error(e.to_string()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-cluster Kubernetes commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One handler per executor command; each call goes through the
/// orchestrator's command gateway to the in-cluster agent.
pub struct ClusterCommandTool {
    http: reqwest::Client,
    orchestrator_url: String,
    internal_token: String,
    cluster: String,
    command: &'static str,
    description: &'static str,
    parameters: Value,
}

impl ClusterCommandTool {
    /// Build handlers for the full executor command set.
    pub fn all(
        orchestrator_url: &str,
        internal_token: &str,
        cluster: &str,
    ) -> Result<Vec<Arc<dyn ToolHandler>>> {
        let http = reqwest::Client::builder()
            // Executor deadline plus delivery margin.
            .timeout(Duration::from_secs(45))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        let namespace = json!({"type": "string", "default": "default"});
        let specs: Vec<(&'static str, &'static str, Value)> = vec![
            (
                "list_pods",
                "List pods in a namespace",
                json!({"type": "object", "properties": {
                    "namespace": namespace,
                    "label_selector": {"type": "string"},
                }}),
            ),
            (
                "get_pod_logs",
                "Fetch recent logs from a pod",
                json!({"type": "object", "properties": {
                    "pod_name": {"type": "string"},
                    "namespace": {"type": "string"},
                    "container": {"type": "string"},
                    "tail_lines": {"type": "integer", "default": 100},
                    "previous": {"type": "boolean"},
                }, "required": ["pod_name"]}),
            ),
            (
                "describe_pod",
                "Describe a pod (status, containers, conditions)",
                json!({"type": "object", "properties": {
                    "pod_name": {"type": "string"},
                    "namespace": {"type": "string"},
                }, "required": ["pod_name"]}),
            ),
            (
                "get_pod_events",
                "Events related to a pod, newest first",
                json!({"type": "object", "properties": {
                    "pod_name": {"type": "string"},
                    "namespace": {"type": "string"},
                }, "required": ["pod_name"]}),
            ),
            (
                "describe_deployment",
                "Describe a deployment (replicas, strategy, conditions)",
                json!({"type": "object", "properties": {
                    "deployment_name": {"type": "string"},
                    "namespace": {"type": "string"},
                }, "required": ["deployment_name"]}),
            ),
            (
                "list_namespaces",
                "List cluster namespaces",
                json!({"type": "object", "properties": {}}),
            ),
        ];

        Ok(specs
            .into_iter()
            .map(|(command, description, parameters)| {
                Arc::new(ClusterCommandTool {
                    http: http.clone(),
                    orchestrator_url: orchestrator_url.trim_end_matches('/').to_owned(),
                    internal_token: internal_token.to_owned(),
                    cluster: cluster.to_owned(),
                    command,
                    description,
                    parameters,
                }) as Arc<dyn ToolHandler>
            })
            .collect())
    }
}

#[async_trait]
impl ToolHandler for ClusterCommandTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.command.to_string(),
            description: self.description.to_string(),
            parameters: self.parameters.clone(),
        }
    }

    async fn call(&self, input: &Value, _ctx: &ToolContext) -> ToolOutcome {
        let body = json!({
            "cluster": self.cluster,
            "command": self.command,
            "params": input,
        });
        let resp = self
            .http
            .post(format!(
                "{}/api/v1/internal/cluster/command",
                self.orchestrator_url
            ))
            .header("Authorization", format!("Bearer {}", self.internal_token))
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(resp) => {
                let ok = resp.status().is_success();
                let value: Value = resp.json().await.unwrap_or(Value::Null);
                if ok {
                    ToolOutcome::ok(
                        value.get("result").cloned().unwrap_or(Value::Null).to_string(),
                    )
                } else {
                    ToolOutcome::error(
                        value
                            .get("detail")
                            .and_then(Value::as_str)
                            .unwrap_or("cluster command failed")
                            .to_string(),
                    )
                }
            }
            Err(e) => ToolOutcome::error(format!("cluster command failed: {e}")),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sub-agent delegation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `Task` — run a prompt as an isolated sub-agent. The child's tool
/// activity is emitted through the parent's event stream with
/// `parent_tool_use_id` set to this invocation, so consumers can
/// render the hierarchy.
pub struct SubagentTool {
    pub provider: Arc<dyn LlmProvider>,
    pub tools: Arc<ToolRegistry>,
    pub model: Option<String>,
    /// Tool-loop cap for the child (kept small; deep dives belong in
    /// their own session).
    pub max_loops: usize,
    /// Preview cap for child tool outputs, matching the session's
    /// post-tool hook cap.
    pub max_output_bytes: usize,
}

#[async_trait]
impl ToolHandler for SubagentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "Task".into(),
            description: "Delegate a focused sub-task to a specialist sub-agent".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "description": {"type": "string"},
                    "prompt": {"type": "string"},
                },
                "required": ["prompt"],
            }),
        }
    }

    async fn call(&self, input: &Value, ctx: &ToolContext) -> ToolOutcome {
        let prompt = input.get("prompt").and_then(Value::as_str).unwrap_or("");
        if prompt.is_empty() {
            return ToolOutcome::error("sub-agent prompt is empty");
        }
        let parent_id = ctx.tool_use_id.clone();
        tracing::info!(parent_tool_use_id = %parent_id, "sub-agent started");

        let mut messages = vec![Message::user(prompt)];
        let mut final_text = String::new();

        for _ in 0..self.max_loops {
            let request = ChatRequest {
                messages: messages.clone(),
                tools: self.tools.definitions(),
                model: self.model.clone(),
                max_tokens: 8192,
            };
            let mut stream = match self.provider.chat_stream(&request).await {
                Ok(stream) => stream,
                Err(e) => return ToolOutcome::error(e.to_string()),
            };

            let mut text = String::new();
            let mut calls: Vec<(String, String, Value)> = Vec::new();
            while let Some(event) = stream.next().await {
                match event {
                    Ok(StreamEvent::Token { text: t }) => text.push_str(&t),
                    Ok(StreamEvent::ToolCallFinished {
                        call_id,
                        tool_name,
                        arguments,
                    }) => calls.push((call_id, tool_name, arguments)),
                    Ok(StreamEvent::Error { message }) => {
                        return ToolOutcome::error(message);
                    }
                    Ok(_) => {}
                    Err(e) => return ToolOutcome::error(e.to_string()),
                }
            }

            if !text.is_empty() {
                let _ = ctx
                    .events
                    .send(AgentEvent::Thought {
                        text: text.clone(),
                        parent_tool_use_id: Some(parent_id.clone()),
                    })
                    .await;
                final_text = text.clone();
            }

            if calls.is_empty() {
                tracing::info!(parent_tool_use_id = %parent_id, "sub-agent finished");
                return ToolOutcome::ok(final_text);
            }

            // Child tool dispatch, labeled with this invocation's id.
            let mut assistant_parts = Vec::new();
            if !text.is_empty() {
                assistant_parts.push(ifox_domain::message::ContentPart::Text { text });
            }
            for (call_id, tool_name, arguments) in &calls {
                assistant_parts.push(ifox_domain::message::ContentPart::ToolUse {
                    id: call_id.clone(),
                    name: tool_name.clone(),
                    input: arguments.clone(),
                });
            }
            messages.push(Message {
                role: ifox_domain::message::Role::Assistant,
                content: ifox_domain::message::MessageContent::Parts(assistant_parts),
            });

            for (call_id, tool_name, arguments) in calls {
                let _ = ctx
                    .events
                    .send(AgentEvent::ToolStart {
                        name: tool_name.clone(),
                        input: arguments.clone(),
                        tool_use_id: call_id.clone(),
                        parent_tool_use_id: Some(parent_id.clone()),
                    })
                    .await;

                let child_ctx = ToolContext {
                    thread_id: ctx.thread_id.clone(),
                    events: ctx.events.clone(),
                    tool_use_id: call_id.clone(),
                    parent_tool_use_id: Some(parent_id.clone()),
                };
                let outcome = self.tools.dispatch(&tool_name, &arguments, &child_ctx).await;

                let _ = ctx
                    .events
                    .send(AgentEvent::ToolEnd {
                        name: tool_name.clone(),
                        success: !outcome.is_error,
                        output: Some(crate::hooks::truncate_preview(
                            &outcome.output,
                            self.max_output_bytes,
                        )),
                        tool_use_id: call_id.clone(),
                        parent_tool_use_id: Some(parent_id.clone()),
                    })
                    .await;

                messages.push(Message::tool_result(&call_id, &outcome.output));
            }
        }

        ToolOutcome::error("sub-agent tool loop limit reached")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::StaticTool;
    use ifox_domain::stream::BoxStream;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;

    struct ScriptedProvider {
        turns: Mutex<VecDeque<Vec<StreamEvent>>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat_stream(
            &self,
            _req: &ChatRequest,
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            let events = self.turns.lock().pop_front().unwrap_or_default();
            Ok(Box::pin(futures_util::stream::iter(
                events.into_iter().map(Ok),
            )))
        }
    }

    #[tokio::test]
    async fn subagent_labels_child_events_with_parent_id() {
        let provider = Arc::new(ScriptedProvider {
            turns: Mutex::new(VecDeque::from([
                vec![
                    StreamEvent::Token {
                        text: "checking logs".into(),
                    },
                    StreamEvent::ToolCallFinished {
                        call_id: "c1".into(),
                        tool_name: "get_pod_logs".into(),
                        arguments: json!({"pod_name": "api-7f9"}),
                    },
                    StreamEvent::Done {
                        usage: None,
                        stop_reason: Some("tool_use".into()),
                    },
                ],
                vec![
                    StreamEvent::Token {
                        text: "logs show OOM".into(),
                    },
                    StreamEvent::Done {
                        usage: None,
                        stop_reason: Some("end_turn".into()),
                    },
                ],
            ])),
        });

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StaticTool {
            name: "get_pod_logs".into(),
            output: "OOMKilled".into(),
            is_error: false,
        }));

        let tool = SubagentTool {
            provider,
            tools: Arc::new(registry),
            model: None,
            max_loops: 5,
            max_output_bytes: 50_000,
        };

        let (tx, mut rx) = mpsc::channel(32);
        let ctx = ToolContext {
            thread_id: "th".into(),
            events: tx,
            tool_use_id: "task-1".into(),
            parent_tool_use_id: None,
        };

        let outcome = tool
            .call(&json!({"prompt": "why is api crashing"}), &ctx)
            .await;
        assert!(!outcome.is_error);
        assert_eq!(outcome.output, "logs show OOM");

        drop(ctx);
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        // Every child event carries the parent invocation id.
        assert!(!events.is_empty());
        for event in &events {
            let parent = match event {
                AgentEvent::Thought {
                    parent_tool_use_id, ..
                }
                | AgentEvent::ToolStart {
                    parent_tool_use_id, ..
                }
                | AgentEvent::ToolEnd {
                    parent_tool_use_id, ..
                } => parent_tool_use_id.clone(),
                other => panic!("unexpected event: {other:?}"),
            };
            assert_eq!(parent.as_deref(), Some("task-1"));
        }
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::ToolEnd { success: true, .. })));
    }

    #[tokio::test]
    async fn child_tool_output_is_capped_like_the_session() {
        let provider = Arc::new(ScriptedProvider {
            turns: Mutex::new(VecDeque::from([
                vec![
                    StreamEvent::ToolCallFinished {
                        call_id: "c1".into(),
                        tool_name: "get_pod_logs".into(),
                        arguments: json!({"pod_name": "api-7f9"}),
                    },
                    StreamEvent::Done {
                        usage: None,
                        stop_reason: Some("tool_use".into()),
                    },
                ],
                vec![
                    StreamEvent::Token {
                        text: "done".into(),
                    },
                    StreamEvent::Done {
                        usage: None,
                        stop_reason: Some("end_turn".into()),
                    },
                ],
            ])),
        });

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StaticTool {
            name: "get_pod_logs".into(),
            output: "z".repeat(600),
            is_error: false,
        }));

        let tool = SubagentTool {
            provider,
            tools: Arc::new(registry),
            model: None,
            max_loops: 5,
            max_output_bytes: 100,
        };

        let (tx, mut rx) = mpsc::channel(32);
        let ctx = ToolContext {
            thread_id: "th".into(),
            events: tx,
            tool_use_id: "task-2".into(),
            parent_tool_use_id: None,
        };
        tool.call(&json!({"prompt": "dump logs"}), &ctx).await;
        drop(ctx);

        let mut capped = false;
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::ToolEnd { output, .. } = event {
                let output = output.unwrap();
                assert!(output.starts_with(&"z".repeat(100)));
                assert!(output.ends_with("[truncated, 600 total chars]"));
                capped = true;
            }
        }
        assert!(capped, "expected a capped child tool_end");
    }
}
