//! Post-tool hook queue.
//!
//! Tool completions are not emitted inline by the dispatch loop;
//! instead each finished tool queues a synthetic `tool_end` here. The
//! session drains the queue before producing the next model-facing
//! event and once more when the execution ends, so consumers always
//! see every completion. Large outputs are capped to a preview.
//!
//! Sub-agent child tools are labeled and emitted by the `Task` handler
//! itself; this queue only carries the session's top-level calls.

use std::collections::VecDeque;

use parking_lot::Mutex;

use ifox_domain::event::AgentEvent;

/// Cap an output to `max_bytes` characters of preview, marking the cut.
pub fn truncate_preview(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let cut: String = output.chars().take(max_bytes).collect();
    format!(
        "{cut}... [truncated, {} total chars]",
        output.chars().count()
    )
}

struct PendingToolEnd {
    name: String,
    tool_use_id: String,
    success: bool,
    output: Option<String>,
}

pub struct ToolHookQueue {
    pending: Mutex<VecDeque<PendingToolEnd>>,
    max_output_bytes: usize,
}

impl ToolHookQueue {
    pub fn new(max_output_bytes: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            max_output_bytes,
        }
    }

    /// Queue a completion. The stored output is capped to the preview
    /// limit.
    pub fn complete(&self, name: &str, tool_use_id: &str, success: bool, output: Option<&str>) {
        let output = output.map(|o| truncate_preview(o, self.max_output_bytes));
        self.pending.lock().push_back(PendingToolEnd {
            name: name.to_string(),
            tool_use_id: tool_use_id.to_string(),
            success,
            output,
        });
    }

    /// Drain all queued completions as events, in completion order.
    pub fn drain(&self) -> Vec<AgentEvent> {
        self.pending
            .lock()
            .drain(..)
            .map(|p| AgentEvent::ToolEnd {
                name: p.name,
                success: p.success,
                output: p.output,
                tool_use_id: p.tool_use_id,
                parent_tool_use_id: None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_drain_in_order() {
        let queue = ToolHookQueue::new(50_000);
        queue.complete("list_pods", "t1", true, Some("3 pods"));
        queue.complete("get_pod_logs", "t2", false, Some("denied"));

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        match &events[0] {
            AgentEvent::ToolEnd {
                name,
                tool_use_id,
                success,
                output,
                parent_tool_use_id,
            } => {
                assert_eq!(name, "list_pods");
                assert_eq!(tool_use_id, "t1");
                assert!(success);
                assert_eq!(output.as_deref(), Some("3 pods"));
                assert!(parent_tool_use_id.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match &events[1] {
            AgentEvent::ToolEnd { success, .. } => assert!(!success),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn output_is_capped_with_marker() {
        let queue = ToolHookQueue::new(100);
        let big = "y".repeat(500);
        queue.complete("read", "t1", true, Some(&big));
        let events = queue.drain();
        match &events[0] {
            AgentEvent::ToolEnd { output, .. } => {
                let output = output.as_ref().unwrap();
                assert!(output.starts_with(&"y".repeat(100)));
                assert!(output.ends_with("[truncated, 500 total chars]"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn truncate_preview_leaves_short_outputs_alone() {
        assert_eq!(truncate_preview("short", 100), "short");
        let exact = "x".repeat(100);
        assert_eq!(truncate_preview(&exact, 100), exact);
    }
}
