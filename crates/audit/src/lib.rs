//! Audit store — durable records of agent activity.
//!
//! Owns agent-run lifecycle rows, per-run tool-call traces, feedback,
//! pending config changes, and session → conversation mappings. Each
//! store keeps an in-memory index under a `parking_lot` lock and
//! appends every write to a JSONL file under the state directory;
//! loading replays the file with last-write-wins per id.

mod jsonl;
mod runs;
mod store;
mod tool_calls;

pub use jsonl::JsonlFile;
pub use runs::{AgentRun, RunCompletion, RunStatus, RunStore, Trigger};
pub use store::{ChangeStatus, ConversationMapping, Feedback, FeedbackType, MiscStore, PendingChange};
pub use tool_calls::{ToolCallRecord, ToolCallStatus, ToolCallStore};

/// Truncate a string to at most `max` characters, appending an
/// ellipsis when anything was cut.
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_strings_alone() {
        assert_eq!(truncate_str("ok", 200), "ok");
    }

    #[test]
    fn truncate_cuts_and_marks() {
        let long = "x".repeat(300);
        let cut = truncate_str(&long, 200);
        assert_eq!(cut.len(), 203);
        assert!(cut.ends_with("..."));
    }
}
