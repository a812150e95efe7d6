//! Progress rendering — event stream → debounced chat updates.
//!
//! Tool calls are bucketed into coarse investigation phases; phase
//! transitions are pushed to a [`ProgressSink`] no more often than the
//! configured debounce interval. On the final result every running
//! phase flips to done, the always-on root-cause phase is marked done,
//! and the findings ride along.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use ifox_domain::event::AgentEvent;

/// The always-present synthesis phase.
pub const ROOT_CAUSE_PHASE: &str = "root_cause_analysis";

/// Stable tool-name → phase table.
pub fn phase_for_tool(tool_name: &str) -> Option<&'static str> {
    match tool_name {
        "query_warehouse"
        | "search_incidents_by_service"
        | "get_recent_incidents"
        | "get_deployment_incidents" => Some("incident_history"),
        "search_logs" | "get_error_logs" | "search_traces" | "list_log_services" => {
            Some("log_search")
        }
        "query_metrics" | "get_service_health" | "get_alerts" => Some("metrics"),
        "list_pods" | "get_pod_logs" | "get_pod_events" | "describe_pod"
        | "describe_deployment" | "list_namespaces" => Some("kubernetes"),
        "kb_search" | "kb_answer" | "kb_federated_search" => Some("knowledge_base"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// One rendered update.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProgressUpdate {
    pub phases: Vec<(String, PhaseStatus)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Set when the payload was cut to the surface's block limit; the
    /// renderer shows a single "content truncated" marker.
    pub truncated: bool,
    pub finished: bool,
}

/// Where updates go (a chat message editor, in production).
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, update: ProgressUpdate);
}

struct RendererState {
    phase_status: HashMap<String, PhaseStatus>,
    /// Phase → number of tools currently running in it.
    running_tools: HashMap<String, usize>,
    last_sent: Option<Instant>,
    delayed_pending: bool,
    finished: bool,
}

pub struct ProgressRenderer {
    state: Mutex<RendererState>,
    sink: Arc<dyn ProgressSink>,
    debounce: Duration,
    block_limit: usize,
}

impl ProgressRenderer {
    pub fn new(sink: Arc<dyn ProgressSink>, debounce: Duration, block_limit: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RendererState {
                phase_status: HashMap::new(),
                running_tools: HashMap::new(),
                last_sent: None,
                delayed_pending: false,
                finished: false,
            }),
            sink,
            debounce,
            block_limit,
        })
    }

    /// Feed one session event through the renderer.
    pub async fn observe(self: &Arc<Self>, event: &AgentEvent) {
        match event {
            AgentEvent::ToolStart { name, .. } => {
                let Some(phase) = phase_for_tool(name) else { return };
                let changed = {
                    let mut state = self.state.lock();
                    *state.running_tools.entry(phase.to_string()).or_insert(0) += 1;
                    let status = state
                        .phase_status
                        .entry(phase.to_string())
                        .or_insert(PhaseStatus::Pending);
                    if *status != PhaseStatus::Done && *status != PhaseStatus::Running {
                        *status = PhaseStatus::Running;
                        true
                    } else {
                        false
                    }
                };
                if changed {
                    self.schedule_update().await;
                }
            }
            AgentEvent::ToolEnd { name, success, .. } => {
                let Some(phase) = phase_for_tool(name) else { return };
                {
                    let mut state = self.state.lock();
                    let running = state.running_tools.entry(phase.to_string()).or_insert(0);
                    *running = running.saturating_sub(1);
                    if *running == 0 {
                        let status = state
                            .phase_status
                            .entry(phase.to_string())
                            .or_insert(PhaseStatus::Running);
                        *status = if *success {
                            PhaseStatus::Done
                        } else {
                            PhaseStatus::Failed
                        };
                    }
                }
                self.schedule_update().await;
            }
            AgentEvent::Result { text, .. } => {
                self.finalize(Some(text.clone()), None).await;
            }
            _ => {}
        }
    }

    /// Mark everything done and push the final update immediately.
    pub async fn finalize(self: &Arc<Self>, findings: Option<String>, confidence: Option<f64>) {
        let update = {
            let mut state = self.state.lock();
            for status in state.phase_status.values_mut() {
                if *status == PhaseStatus::Running {
                    *status = PhaseStatus::Done;
                }
            }
            state
                .phase_status
                .insert(ROOT_CAUSE_PHASE.to_string(), PhaseStatus::Done);
            state.finished = true;
            state.last_sent = Some(Instant::now());
            self.build_update(&state, findings, confidence)
        };
        self.sink.publish(update).await;
    }

    // ── debounced dispatch ───────────────────────────────────────────

    async fn schedule_update(self: &Arc<Self>) {
        let send_now = {
            let mut state = self.state.lock();
            if state.finished {
                return;
            }
            match state.last_sent {
                Some(last) if last.elapsed() < self.debounce => {
                    if state.delayed_pending {
                        return; // a delayed dispatch is already queued
                    }
                    state.delayed_pending = true;
                    false
                }
                _ => {
                    state.last_sent = Some(Instant::now());
                    true
                }
            }
        };

        if send_now {
            self.send_current().await;
        } else {
            let renderer = self.clone();
            let delay = {
                let state = renderer.state.lock();
                let elapsed = state.last_sent.map(|l| l.elapsed()).unwrap_or_default();
                self.debounce.saturating_sub(elapsed)
            };
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                {
                    let mut state = renderer.state.lock();
                    if state.finished {
                        state.delayed_pending = false;
                        return;
                    }
                    state.delayed_pending = false;
                    state.last_sent = Some(Instant::now());
                }
                renderer.send_current().await;
            });
        }
    }

    async fn send_current(&self) {
        let update = {
            let state = self.state.lock();
            self.build_update(&state, None, None)
        };
        self.sink.publish(update).await;
    }

    fn build_update(
        &self,
        state: &RendererState,
        findings: Option<String>,
        confidence: Option<f64>,
    ) -> ProgressUpdate {
        let mut phases: Vec<(String, PhaseStatus)> = state
            .phase_status
            .iter()
            .map(|(phase, status)| (phase.clone(), *status))
            .collect();
        phases.sort_by(|a, b| a.0.cmp(&b.0));

        let mut truncated = false;
        if phases.len() > self.block_limit {
            phases.truncate(self.block_limit);
            truncated = true;
        }

        ProgressUpdate {
            phases,
            findings,
            confidence,
            truncated,
            finished: state.finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectSink {
        updates: Mutex<Vec<ProgressUpdate>>,
    }

    #[async_trait]
    impl ProgressSink for CollectSink {
        async fn publish(&self, update: ProgressUpdate) {
            self.updates.lock().push(update);
        }
    }

    fn tool_start(name: &str) -> AgentEvent {
        AgentEvent::ToolStart {
            name: name.into(),
            input: serde_json::json!({}),
            tool_use_id: "t1".into(),
            parent_tool_use_id: None,
        }
    }

    fn tool_end(name: &str, success: bool) -> AgentEvent {
        AgentEvent::ToolEnd {
            name: name.into(),
            success,
            output: None,
            tool_use_id: "t1".into(),
            parent_tool_use_id: None,
        }
    }

    fn renderer() -> (Arc<ProgressRenderer>, Arc<CollectSink>) {
        let sink = Arc::new(CollectSink {
            updates: Mutex::new(Vec::new()),
        });
        (
            ProgressRenderer::new(sink.clone(), Duration::from_secs(2), 50),
            sink,
        )
    }

    #[tokio::test]
    async fn tool_start_marks_phase_running() {
        let (r, sink) = renderer();
        r.observe(&tool_start("list_pods")).await;
        let updates = sink.updates.lock();
        assert_eq!(updates.len(), 1);
        assert!(updates[0]
            .phases
            .iter()
            .any(|(p, s)| p == "kubernetes" && *s == PhaseStatus::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_events_are_debounced() {
        let (r, sink) = renderer();
        r.observe(&tool_start("list_pods")).await;        // sent immediately
        r.observe(&tool_end("list_pods", true)).await;    // within debounce → delayed
        r.observe(&tool_start("search_logs")).await;      // coalesced into same delayed send
        assert_eq!(sink.updates.lock().len(), 1);

        // Let the delayed dispatch fire.
        tokio::time::sleep(Duration::from_secs(3)).await;
        let updates = sink.updates.lock();
        assert_eq!(updates.len(), 2);
        let last = updates.last().unwrap();
        assert!(last
            .phases
            .iter()
            .any(|(p, s)| p == "kubernetes" && *s == PhaseStatus::Done));
        assert!(last
            .phases
            .iter()
            .any(|(p, s)| p == "log_search" && *s == PhaseStatus::Running));
    }

    #[tokio::test]
    async fn result_finalizes_phases_and_adds_root_cause() {
        let (r, sink) = renderer();
        r.observe(&tool_start("list_pods")).await;
        r.observe(&AgentEvent::Result {
            text: "OOM kill on api-7f9".into(),
            success: true,
            subtype: "success".into(),
            images: None,
            files: None,
        })
        .await;

        let updates = sink.updates.lock();
        let last = updates.last().unwrap();
        assert!(last.finished);
        assert_eq!(last.findings.as_deref(), Some("OOM kill on api-7f9"));
        assert!(last
            .phases
            .iter()
            .any(|(p, s)| p == ROOT_CAUSE_PHASE && *s == PhaseStatus::Done));
        assert!(last
            .phases
            .iter()
            .all(|(_, s)| *s != PhaseStatus::Running));
    }

    #[tokio::test]
    async fn failed_tool_marks_phase_failed() {
        let (r, sink) = renderer();
        r.observe(&tool_start("query_metrics")).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        r.observe(&tool_end("query_metrics", false)).await;
        r.finalize(None, Some(0.4)).await;

        let updates = sink.updates.lock();
        let last = updates.last().unwrap();
        assert!(last
            .phases
            .iter()
            .any(|(p, s)| p == "metrics" && *s == PhaseStatus::Failed));
        assert_eq!(last.confidence, Some(0.4));
    }

    #[tokio::test]
    async fn unmapped_tools_are_ignored() {
        let (r, sink) = renderer();
        r.observe(&tool_start("Read")).await;
        assert!(sink.updates.lock().is_empty());
    }

    #[tokio::test]
    async fn payload_is_truncated_to_block_limit() {
        let sink = Arc::new(CollectSink {
            updates: Mutex::new(Vec::new()),
        });
        let r = ProgressRenderer::new(sink.clone(), Duration::from_millis(0), 2);
        r.observe(&tool_start("list_pods")).await;
        r.observe(&tool_start("search_logs")).await;
        r.observe(&tool_start("query_metrics")).await;
        r.finalize(None, None).await;

        let updates = sink.updates.lock();
        let last = updates.last().unwrap();
        assert!(last.truncated);
        assert_eq!(last.phases.len(), 2);
    }
}
