//! Provisioning state machine.
//!
//! Every `provision_team` call creates a durable [`ProvisioningRun`]
//! row and executes the provisioning steps in order, recording each
//! step's outcome under `steps[name]` so the status endpoint can show
//! partial progress. Runs are serialized per `(org, team)` by a keyed
//! lock, and an `idempotency_key` replays the stored run instead of
//! re-executing.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use ifox_audit::JsonlFile;
use ifox_domain::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningRun {
    pub id: Uuid,
    pub org_id: String,
    pub team_node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub status: ProvisionStatus,
    pub steps: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ProvisioningStore {
    runs: RwLock<HashMap<Uuid, ProvisioningRun>>,
    file: JsonlFile,
}

impl ProvisioningStore {
    pub fn open(state_dir: &Path) -> Result<Self> {
        let file = JsonlFile::new(state_dir, "provisioning_runs.jsonl")?;
        let mut runs = HashMap::new();
        for run in file.load::<ProvisioningRun>()? {
            runs.insert(run.id, run);
        }
        Ok(Self {
            runs: RwLock::new(runs),
            file,
        })
    }

    pub fn create(
        &self,
        org_id: &str,
        team_node_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<ProvisioningRun> {
        let now = Utc::now();
        let run = ProvisioningRun {
            id: Uuid::new_v4(),
            org_id: org_id.to_string(),
            team_node_id: team_node_id.to_string(),
            idempotency_key: idempotency_key.map(String::from),
            status: ProvisionStatus::Running,
            steps: HashMap::new(),
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.file.append(&run)?;
        self.runs.write().insert(run.id, run.clone());
        Ok(run)
    }

    /// Mutate a run under the write lock and persist the new state.
    pub fn update<F>(&self, id: &Uuid, mutate: F) -> Result<ProvisioningRun>
    where
        F: FnOnce(&mut ProvisioningRun),
    {
        let updated = {
            let mut runs = self.runs.write();
            let run = runs
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("provisioning run {id}")))?;
            mutate(run);
            run.updated_at = Utc::now();
            run.clone()
        };
        self.file.append(&updated)?;
        Ok(updated)
    }

    pub fn get(&self, id: &Uuid) -> Option<ProvisioningRun> {
        self.runs.read().get(id).cloned()
    }

    /// Prior run for the same `(org, team, idempotency_key)`, if any.
    pub fn find_by_key(
        &self,
        org_id: &str,
        team_node_id: &str,
        idempotency_key: &str,
    ) -> Option<ProvisioningRun> {
        let runs = self.runs.read();
        let mut matches: Vec<&ProvisioningRun> = runs
            .values()
            .filter(|r| {
                r.org_id == org_id
                    && r.team_node_id == team_node_id
                    && r.idempotency_key.as_deref() == Some(idempotency_key)
            })
            .collect();
        matches.sort_by_key(|r| r.created_at);
        matches.first().map(|r| (*r).clone())
    }

    /// Distinct `(org, team)` pairs with a succeeded run — the number
    /// the license gate compares against `max_teams`.
    pub fn count_succeeded_teams(&self) -> usize {
        let runs = self.runs.read();
        let mut teams: Vec<(String, String)> = runs
            .values()
            .filter(|r| r.status == ProvisionStatus::Succeeded)
            .map(|r| (r.org_id.clone(), r.team_node_id.clone()))
            .collect();
        teams.sort();
        teams.dedup();
        teams.len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-team locks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Advisory locks keyed by `hash("provision|org|team")`, held across
/// the full provisioning request so overlapping requests for the same
/// team run strictly serially. Released on every exit path by the
/// returned guard's drop.
#[derive(Default)]
pub struct TeamLocks {
    locks: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>,
}

impl TeamLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(org_id: &str, team_node_id: &str) -> u64 {
        let joined = format!("provision|{}|{}", org_id.trim(), team_node_id.trim());
        let digest = Sha256::digest(joined.as_bytes());
        u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
    }

    pub fn lock_for(&self, org_id: &str, team_node_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let key = Self::key(org_id, team_node_id);
        self.locks
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn idempotency_key_finds_earliest_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProvisioningStore::open(dir.path()).unwrap();
        let first = store.create("acme", "core", Some("k1")).unwrap();
        store.create("acme", "core", Some("k2")).unwrap();

        let found = store.find_by_key("acme", "core", "k1").unwrap();
        assert_eq!(found.id, first.id);
        assert!(store.find_by_key("acme", "web", "k1").is_none());
    }

    #[test]
    fn steps_and_status_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = ProvisioningStore::open(dir.path()).unwrap();
            let run = store.create("acme", "core", None).unwrap();
            store
                .update(&run.id, |r| {
                    r.steps
                        .insert("config_patch".into(), serde_json::json!({"ok": true}));
                    r.status = ProvisionStatus::Succeeded;
                })
                .unwrap();
            run.id
        };
        let store = ProvisioningStore::open(dir.path()).unwrap();
        let run = store.get(&id).unwrap();
        assert_eq!(run.status, ProvisionStatus::Succeeded);
        assert_eq!(run.steps["config_patch"]["ok"], true);
        assert_eq!(store.count_succeeded_teams(), 1);
    }

    #[test]
    fn succeeded_team_count_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProvisioningStore::open(dir.path()).unwrap();
        for _ in 0..3 {
            let run = store.create("acme", "core", None).unwrap();
            store
                .update(&run.id, |r| r.status = ProvisionStatus::Succeeded)
                .unwrap();
        }
        let run = store.create("acme", "web", None).unwrap();
        store
            .update(&run.id, |r| r.status = ProvisionStatus::Succeeded)
            .unwrap();
        store.create("acme", "data", None).unwrap(); // still running

        assert_eq!(store.count_succeeded_teams(), 2);
    }

    #[tokio::test]
    async fn team_lock_serializes_same_team() {
        let locks = Arc::new(TeamLocks::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let locks = locks.clone();
            let concurrent = concurrent.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let lock = locks.lock_for("acme", "core");
                let _guard = lock.lock().await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1, "lock must serialize");
    }

    #[test]
    fn different_teams_use_different_locks() {
        let locks = TeamLocks::new();
        let a = locks.lock_for("acme", "core");
        let b = locks.lock_for("acme", "web");
        assert!(!Arc::ptr_eq(&a, &b));
        let a2 = locks.lock_for("acme", "core");
        assert!(Arc::ptr_eq(&a, &a2));
    }
}
