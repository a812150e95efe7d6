//! Agent-run lifecycle records.
//!
//! A run is created when an agent starts and completed exactly once;
//! the stale-run sweeper may move `running` rows to `timeout` after
//! they exceed the configured age.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ifox_domain::{Error, Result};

use crate::jsonl::JsonlFile;
use crate::truncate_str;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Timeout,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// What started the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trigger {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: String,
    pub org: String,
    pub team: String,
    pub correlation_id: String,
    pub agent_name: String,
    pub status: RunStatus,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fields supplied when a run finishes.
#[derive(Debug, Clone, Default)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub tool_calls_count: Option<u32>,
    pub output_summary: Option<String>,
    pub confidence: Option<f64>,
    pub error: Option<String>,
}

impl Default for RunStatus {
    fn default() -> Self {
        RunStatus::Completed
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RunStore {
    runs: RwLock<HashMap<String, AgentRun>>,
    file: JsonlFile,
}

impl RunStore {
    pub fn open(state_dir: &Path) -> Result<Self> {
        let file = JsonlFile::new(state_dir, "agent_runs.jsonl")?;
        let mut runs = HashMap::new();
        for run in file.load::<AgentRun>()? {
            runs.insert(run.id.clone(), run);
        }
        Ok(Self {
            runs: RwLock::new(runs),
            file,
        })
    }

    /// Record a run start. Fails with `conflict` when the id exists.
    pub fn create(
        &self,
        id: &str,
        org: &str,
        team: &str,
        correlation_id: &str,
        agent_name: &str,
        trigger: Trigger,
    ) -> Result<AgentRun> {
        let run = AgentRun {
            id: id.to_string(),
            org: org.to_string(),
            team: team.to_string(),
            correlation_id: correlation_id.to_string(),
            agent_name: agent_name.to_string(),
            status: RunStatus::Running,
            trigger,
            started_at: Utc::now(),
            completed_at: None,
            duration_seconds: None,
            tool_calls_count: None,
            output_summary: None,
            confidence: None,
            error: None,
        };
        {
            let mut runs = self.runs.write();
            if runs.contains_key(id) {
                return Err(Error::Conflict(format!("agent run {id} already exists")));
            }
            runs.insert(id.to_string(), run.clone());
        }
        self.file.append(&run)?;
        Ok(run)
    }

    /// Complete a run. The `running → terminal` transition happens at
    /// most once; a second completion is a `conflict`.
    pub fn complete(&self, id: &str, completion: RunCompletion) -> Result<AgentRun> {
        let updated = {
            let mut runs = self.runs.write();
            let run = runs
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("agent run {id}")))?;
            if run.status.is_terminal() {
                return Err(Error::Conflict(format!(
                    "agent run {id} already {:?}",
                    run.status
                )));
            }
            let now = Utc::now();
            run.status = completion.status;
            run.completed_at = Some(now);
            run.duration_seconds =
                Some((now - run.started_at).num_milliseconds() as f64 / 1000.0);
            run.tool_calls_count = completion.tool_calls_count;
            run.output_summary = completion
                .output_summary
                .map(|s| truncate_str(&s, 200));
            run.confidence = completion.confidence;
            run.error = completion.error.map(|e| truncate_str(&e, 200));
            run.clone()
        };
        self.file.append(&updated)?;
        Ok(updated)
    }

    pub fn get(&self, id: &str) -> Option<AgentRun> {
        self.runs.read().get(id).cloned()
    }

    /// List runs for a team, newest first.
    pub fn list(&self, org: &str, team: Option<&str>, limit: usize) -> Vec<AgentRun> {
        let runs = self.runs.read();
        let mut rows: Vec<AgentRun> = runs
            .values()
            .filter(|r| r.org == org && team.is_none_or(|t| r.team == t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        rows.truncate(limit);
        rows
    }

    /// Transition runs older than `max_age_seconds` from `running` to
    /// `timeout`. Returns the ids swept.
    pub fn sweep_stale(&self, max_age_seconds: u64) -> Vec<String> {
        let cutoff = Utc::now() - chrono::Duration::seconds(max_age_seconds as i64);
        let mut swept = Vec::new();
        let updated: Vec<AgentRun> = {
            let mut runs = self.runs.write();
            runs.values_mut()
                .filter(|r| r.status == RunStatus::Running && r.started_at < cutoff)
                .map(|r| {
                    r.status = RunStatus::Timeout;
                    r.completed_at = Some(Utc::now());
                    r.error = Some("swept: exceeded max run age".into());
                    swept.push(r.id.clone());
                    r.clone()
                })
                .collect()
        };
        for run in &updated {
            if let Err(e) = self.file.append(run) {
                tracing::warn!(run_id = %run.id, error = %e, "failed to persist swept run");
            }
        }
        if !swept.is_empty() {
            tracing::info!(count = swept.len(), "stale agent runs moved to timeout");
        }
        swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (RunStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (RunStore::open(dir.path()).unwrap(), dir)
    }

    fn trigger() -> Trigger {
        Trigger {
            source: "slack".into(),
            actor: Some("U123".into()),
            message: Some("pods crashlooping".into()),
            channel: Some("C1".into()),
        }
    }

    #[test]
    fn create_then_complete_once() {
        let (store, _dir) = store();
        store
            .create("r1", "acme", "core", "corr-1", "investigator", trigger())
            .unwrap();

        let run = store
            .complete(
                "r1",
                RunCompletion {
                    status: RunStatus::Completed,
                    tool_calls_count: Some(3),
                    output_summary: Some("x".repeat(400)),
                    confidence: Some(0.8),
                    error: None,
                },
            )
            .unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.duration_seconds.is_some());
        // Summaries are truncated to 200 chars.
        assert_eq!(run.output_summary.unwrap().len(), 203);

        let err = store
            .complete("r1", RunCompletion::default())
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn duplicate_create_conflicts() {
        let (store, _dir) = store();
        store
            .create("r1", "acme", "core", "c", "a", trigger())
            .unwrap();
        let err = store
            .create("r1", "acme", "core", "c", "a", trigger())
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn sweeper_only_touches_old_running_runs() {
        let (store, _dir) = store();
        store
            .create("young", "acme", "core", "c", "a", trigger())
            .unwrap();
        store
            .create("old", "acme", "core", "c", "a", trigger())
            .unwrap();
        store
            .create("done", "acme", "core", "c", "a", trigger())
            .unwrap();
        store
            .complete(
                "done",
                RunCompletion {
                    status: RunStatus::Completed,
                    ..RunCompletion::default()
                },
            )
            .unwrap();

        // Age the "old" run by hand.
        {
            let mut runs = store.runs.write();
            runs.get_mut("old").unwrap().started_at =
                Utc::now() - chrono::Duration::seconds(7200);
        }

        let swept = store.sweep_stale(3600);
        assert_eq!(swept, vec!["old".to_string()]);
        assert_eq!(store.get("old").unwrap().status, RunStatus::Timeout);
        assert_eq!(store.get("young").unwrap().status, RunStatus::Running);
        assert_eq!(store.get("done").unwrap().status, RunStatus::Completed);
    }

    #[test]
    fn reload_replays_latest_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RunStore::open(dir.path()).unwrap();
            store
                .create("r1", "acme", "core", "c", "a", trigger())
                .unwrap();
            store
                .complete(
                    "r1",
                    RunCompletion {
                        status: RunStatus::Failed,
                        error: Some("boom".into()),
                        ..RunCompletion::default()
                    },
                )
                .unwrap();
        }
        let store = RunStore::open(dir.path()).unwrap();
        let run = store.get("r1").unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("boom"));
    }

    #[test]
    fn list_filters_and_orders() {
        let (store, _dir) = store();
        store.create("r1", "acme", "core", "c", "a", trigger()).unwrap();
        store.create("r2", "acme", "web", "c", "a", trigger()).unwrap();
        store.create("r3", "other", "core", "c", "a", trigger()).unwrap();

        assert_eq!(store.list("acme", None, 10).len(), 2);
        let core = store.list("acme", Some("core"), 10);
        assert_eq!(core.len(), 1);
        assert_eq!(core[0].id, "r1");
    }
}
