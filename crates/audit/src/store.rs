//! Feedback, pending config changes, and conversation mappings.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ifox_domain::{Error, Result};

use crate::jsonl::JsonlFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub run_id: String,
    pub feedback_type: FeedbackType,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A proposed config change awaiting approval. Idempotent by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: String,
    pub org: String,
    pub node: String,
    pub change_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_path: Option<String>,
    pub proposed_value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<serde_json::Value>,
    pub requested_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: ChangeStatus,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Pending,
    Approved,
    Rejected,
}

/// Maps a session to its external conversation. One current mapping per
/// session id; re-registering updates in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMapping {
    pub session_id: String,
    pub external_conversation_id: String,
    pub session_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub last_used_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MiscStore {
    feedback: RwLock<Vec<Feedback>>,
    changes: RwLock<HashMap<String, PendingChange>>,
    conversations: RwLock<HashMap<String, ConversationMapping>>,
    feedback_file: JsonlFile,
    changes_file: JsonlFile,
    conversations_file: JsonlFile,
}

impl MiscStore {
    pub fn open(state_dir: &Path) -> Result<Self> {
        let feedback_file = JsonlFile::new(state_dir, "feedback.jsonl")?;
        let changes_file = JsonlFile::new(state_dir, "pending_changes.jsonl")?;
        let conversations_file = JsonlFile::new(state_dir, "conversations.jsonl")?;

        let feedback = feedback_file.load::<Feedback>()?;
        let mut changes = HashMap::new();
        for change in changes_file.load::<PendingChange>()? {
            changes.insert(change.id.clone(), change);
        }
        let mut conversations = HashMap::new();
        for mapping in conversations_file.load::<ConversationMapping>()? {
            conversations.insert(mapping.session_id.clone(), mapping);
        }

        Ok(Self {
            feedback: RwLock::new(feedback),
            changes: RwLock::new(changes),
            conversations: RwLock::new(conversations),
            feedback_file,
            changes_file,
            conversations_file,
        })
    }

    // ── feedback ─────────────────────────────────────────────────────

    pub fn add_feedback(&self, feedback: Feedback) -> Result<()> {
        self.feedback_file.append(&feedback)?;
        self.feedback.write().push(feedback);
        Ok(())
    }

    pub fn feedback_for_run(&self, run_id: &str) -> Vec<Feedback> {
        self.feedback
            .read()
            .iter()
            .filter(|f| f.run_id == run_id)
            .cloned()
            .collect()
    }

    // ── pending changes ──────────────────────────────────────────────

    /// Register a pending change. Re-submitting an existing id returns
    /// the stored row unchanged.
    pub fn propose_change(&self, change: PendingChange) -> Result<PendingChange> {
        {
            let changes = self.changes.read();
            if let Some(existing) = changes.get(&change.id) {
                return Ok(existing.clone());
            }
        }
        self.changes_file.append(&change)?;
        self.changes
            .write()
            .insert(change.id.clone(), change.clone());
        Ok(change)
    }

    pub fn resolve_change(&self, id: &str, status: ChangeStatus) -> Result<PendingChange> {
        let updated = {
            let mut changes = self.changes.write();
            let change = changes
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("pending change {id}")))?;
            change.status = status;
            change.clone()
        };
        self.changes_file.append(&updated)?;
        Ok(updated)
    }

    pub fn pending_changes(&self, org: &str) -> Vec<PendingChange> {
        self.changes
            .read()
            .values()
            .filter(|c| c.org == org && c.status == ChangeStatus::Pending)
            .cloned()
            .collect()
    }

    // ── conversation mappings ────────────────────────────────────────

    /// Upsert the mapping for a session.
    pub fn upsert_conversation(&self, mapping: ConversationMapping) -> Result<()> {
        self.conversations_file.append(&mapping)?;
        self.conversations
            .write()
            .insert(mapping.session_id.clone(), mapping);
        Ok(())
    }

    pub fn conversation(&self, session_id: &str) -> Option<ConversationMapping> {
        self.conversations.read().get(session_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (MiscStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (MiscStore::open(dir.path()).unwrap(), dir)
    }

    fn change(id: &str) -> PendingChange {
        PendingChange {
            id: id.into(),
            org: "acme".into(),
            node: "core".into(),
            change_type: "config".into(),
            change_path: Some("routing.slack_channel_ids".into()),
            proposed_value: serde_json::json!(["C1", "C2"]),
            previous_value: None,
            requested_by: "agent".into(),
            reason: None,
            status: ChangeStatus::Pending,
            requested_at: Utc::now(),
        }
    }

    #[test]
    fn pending_change_is_idempotent_by_id() {
        let (store, _dir) = store();
        store.propose_change(change("c1")).unwrap();
        store.resolve_change("c1", ChangeStatus::Approved).unwrap();

        // Re-proposing the same id does not reset the status.
        let replayed = store.propose_change(change("c1")).unwrap();
        assert_eq!(replayed.status, ChangeStatus::Approved);
        assert!(store.pending_changes("acme").is_empty());
    }

    #[test]
    fn conversation_upsert_keeps_one_mapping_per_session() {
        let (store, _dir) = store();
        for conversation_id in ["ts-1", "ts-2"] {
            store
                .upsert_conversation(ConversationMapping {
                    session_id: "s1".into(),
                    external_conversation_id: conversation_id.into(),
                    session_type: "slack_thread".into(),
                    org: Some("acme".into()),
                    team: Some("core".into()),
                    last_used_at: Utc::now(),
                })
                .unwrap();
        }
        assert_eq!(
            store.conversation("s1").unwrap().external_conversation_id,
            "ts-2"
        );
    }

    #[test]
    fn feedback_filters_by_run() {
        let (store, _dir) = store();
        store
            .add_feedback(Feedback {
                id: "f1".into(),
                run_id: "r1".into(),
                feedback_type: FeedbackType::Positive,
                source: "slack".into(),
                user_id: Some("U1".into()),
                correlation_id: None,
                created_at: Utc::now(),
            })
            .unwrap();
        assert_eq!(store.feedback_for_run("r1").len(), 1);
        assert!(store.feedback_for_run("r2").is_empty());
    }
}
