//! Blocking user questions.
//!
//! When the model calls `AskUserQuestion`, the session parks the tool
//! on a single-shot channel and waits a bounded time for
//! `provide_answer` to arrive from the chat surface.

use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

/// Outcome of a question wait.
#[derive(Debug)]
pub enum QuestionOutcome {
    Answered(Value),
    TimedOut,
}

/// One pending question slot per session.
///
/// `wait()` arms the slot and blocks; `provide()` resolves it. Only one
/// question can be outstanding at a time — arming again drops any
/// previous waiter (its execute turn already ended).
#[derive(Default)]
pub struct QuestionGate {
    pending: Mutex<Option<oneshot::Sender<Value>>>,
}

impl QuestionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a question is currently waiting for an answer.
    pub fn is_waiting(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Arm the gate and wait up to `timeout` for an answer.
    pub async fn wait(&self, timeout: Duration) -> QuestionOutcome {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock() = Some(tx);

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(answers)) => QuestionOutcome::Answered(answers),
            _ => QuestionOutcome::TimedOut,
        };
        *self.pending.lock() = None;
        outcome
    }

    /// Deliver an answer. Returns false when nothing was waiting.
    pub fn provide(&self, answers: Value) -> bool {
        match self.pending.lock().take() {
            Some(tx) => tx.send(answers).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn answer_resolves_wait() {
        let gate = Arc::new(QuestionGate::new());
        let waiter = gate.clone();
        let handle =
            tokio::spawn(async move { waiter.wait(Duration::from_secs(5)).await });

        // Let the waiter arm the gate.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(gate.is_waiting());
        assert!(gate.provide(serde_json::json!({"q1": "prod"})));

        match handle.await.unwrap() {
            QuestionOutcome::Answered(answers) => assert_eq!(answers["q1"], "prod"),
            QuestionOutcome::TimedOut => panic!("expected answer"),
        }
        assert!(!gate.is_waiting());
    }

    #[tokio::test]
    async fn timeout_elapses_without_answer() {
        let gate = QuestionGate::new();
        match gate.wait(Duration::from_millis(30)).await {
            QuestionOutcome::TimedOut => {}
            QuestionOutcome::Answered(_) => panic!("expected timeout"),
        }
        assert!(!gate.is_waiting());
    }

    #[tokio::test]
    async fn provide_without_waiter_returns_false() {
        let gate = QuestionGate::new();
        assert!(!gate.provide(serde_json::json!({})));
    }
}
