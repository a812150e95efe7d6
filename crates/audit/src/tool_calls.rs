//! Per-run tool-call traces, persisted as a batch at end of run.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ifox_domain::Result;

use crate::jsonl::JsonlFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub run_id: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Parent sub-agent invocation, when the tool ran inside one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_agent: Option<String>,
    pub input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub status: ToolCallStatus,
    pub sequence_number: u32,
}

pub struct ToolCallStore {
    by_run: RwLock<HashMap<String, Vec<ToolCallRecord>>>,
    file: JsonlFile,
}

impl ToolCallStore {
    pub fn open(state_dir: &Path) -> Result<Self> {
        let file = JsonlFile::new(state_dir, "tool_calls.jsonl")?;
        let mut by_run: HashMap<String, Vec<ToolCallRecord>> = HashMap::new();
        for record in file.load::<ToolCallRecord>()? {
            by_run.entry(record.run_id.clone()).or_default().push(record);
        }
        for calls in by_run.values_mut() {
            calls.sort_by_key(|c| c.sequence_number);
        }
        Ok(Self {
            by_run: RwLock::new(by_run),
            file,
        })
    }

    /// Persist a run's tool calls in one batch. Records are stored in
    /// `sequence_number` order regardless of input order.
    pub fn record_batch(&self, run_id: &str, mut calls: Vec<ToolCallRecord>) -> Result<usize> {
        calls.sort_by_key(|c| c.sequence_number);
        for call in &calls {
            self.file.append(call)?;
        }
        let count = calls.len();
        self.by_run.write().insert(run_id.to_string(), calls);
        tracing::debug!(run_id, count, "tool call batch recorded");
        Ok(count)
    }

    /// Tool calls for a run, ordered by sequence number.
    pub fn for_run(&self, run_id: &str) -> Vec<ToolCallRecord> {
        self.by_run.read().get(run_id).cloned().unwrap_or_default()
    }
}
