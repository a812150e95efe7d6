//! Tool dispatch for the session runtime.
//!
//! Tools are registered by name; the session dispatches each model
//! request through here. Handlers receive a [`ToolContext`] so nested
//! work (sub-agents) can emit events tagged with the parent invocation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use ifox_domain::event::AgentEvent;
use ifox_domain::message::ToolDefinition;

/// Context threaded into every tool call.
#[derive(Clone)]
pub struct ToolContext {
    pub thread_id: String,
    /// Sink for nested events (sub-agent children emit through this
    /// with their parent's tool_use_id).
    pub events: mpsc::Sender<AgentEvent>,
    /// The invocation this call belongs to.
    pub tool_use_id: String,
    /// Set when this call runs inside a sub-agent.
    pub parent_tool_use_id: Option<String>,
}

/// Result of a tool call: output text plus an error flag.
pub struct ToolOutcome {
    pub output: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn call(&self, input: &Value, ctx: &ToolContext) -> ToolOutcome;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Name → handler registry with an optional allowlist.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    /// When set, only these tools may run; others are rejected at
    /// dispatch. Order-independent.
    allowed: Option<HashSet<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.definition().name, handler);
    }

    pub fn restrict_to<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(names.into_iter().map(Into::into).collect());
    }

    /// Definitions advertised to the model, filtered by the allowlist.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .handlers
            .values()
            .map(|h| h.definition())
            .filter(|d| self.is_allowed(&d.name))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowed
            .as_ref()
            .is_none_or(|allowed| allowed.contains(name))
    }

    /// Dispatch one call. Unknown or disallowed tools come back as
    /// error outcomes, never as panics.
    pub async fn dispatch(&self, name: &str, input: &Value, ctx: &ToolContext) -> ToolOutcome {
        if !self.is_allowed(name) {
            return ToolOutcome::error(format!("tool '{name}' is not permitted for this team"));
        }
        match self.handlers.get(name) {
            Some(handler) => handler.call(input, ctx).await,
            None => ToolOutcome::error(format!("unknown tool: {name}")),
        }
    }
}
