//! Work items flowing through the ingestion pipeline.
//!
//! ```text
//! Created → Queued → Sequenced → Persisted → CallbackFired → (dropped)
//!              └──────→ Failed ──────────────↗
//! ```

use bytes::Bytes;

use crate::domain::ports::{OwnerId, SequenceKey};
use crate::error::Result;

/// Completion callback supplied with a submission.
///
/// Invoked exactly once on the dispatcher task with the assigned key, or
/// with the error that stopped persistence.
pub type CompletionCallback = Box<dyn FnOnce(Result<SequenceKey>) + Send + 'static>;

/// Lifecycle phase of a pending action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    /// Built by the caller, not yet enqueued
    Created,
    /// Waiting in the ingestion queue
    Queued,
    /// Sequence key assigned by the store counter
    Sequenced,
    /// Index and value written
    Persisted,
    /// Persistence failed or was skipped
    Failed,
    /// Callback has run
    CallbackFired,
}

impl std::fmt::Display for ActionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionPhase::Created => write!(f, "Created"),
            ActionPhase::Queued => write!(f, "Queued"),
            ActionPhase::Sequenced => write!(f, "Sequenced"),
            ActionPhase::Persisted => write!(f, "Persisted"),
            ActionPhase::Failed => write!(f, "Failed"),
            ActionPhase::CallbackFired => write!(f, "CallbackFired"),
        }
    }
}

/// A submitted value waiting for its sequence key.
pub struct PendingAction {
    pub owner: OwnerId,
    pub value: Bytes,
    pub key: Option<SequenceKey>,
    pub phase: ActionPhase,
    pub on_complete: CompletionCallback,
}

impl PendingAction {
    pub fn new(owner: OwnerId, value: Bytes, on_complete: CompletionCallback) -> Self {
        Self {
            owner,
            value,
            key: None,
            phase: ActionPhase::Created,
            on_complete,
        }
    }

    /// Attach the sequencer's outcome, ready for the dispatcher.
    pub fn complete(self, result: Result<SequenceKey>) -> CompletedAction {
        let phase = if result.is_ok() {
            ActionPhase::Persisted
        } else {
            ActionPhase::Failed
        };
        CompletedAction {
            owner: self.owner,
            key: self.key,
            phase,
            result,
            on_complete: self.on_complete,
        }
    }
}

impl std::fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAction")
            .field("owner", &self.owner)
            .field("value_len", &self.value.len())
            .field("key", &self.key)
            .field("phase", &self.phase)
            .finish()
    }
}

/// A sequenced action waiting for its callback.
pub struct CompletedAction {
    pub owner: OwnerId,
    pub key: Option<SequenceKey>,
    pub phase: ActionPhase,
    pub result: Result<SequenceKey>,
    pub on_complete: CompletionCallback,
}

impl CompletedAction {
    /// Run the callback, consuming the action.
    pub fn fire(self) -> ActionPhase {
        (self.on_complete)(self.result);
        ActionPhase::CallbackFired
    }
}

impl std::fmt::Debug for CompletedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletedAction")
            .field("owner", &self.owner)
            .field("key", &self.key)
            .field("phase", &self.phase)
            .field("ok", &self.result.is_ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::mpsc;

    #[test]
    fn test_complete_success_phase() {
        let action = PendingAction::new(OwnerId(1), Bytes::from_static(b"v"), Box::new(|_| {}));
        assert_eq!(action.phase, ActionPhase::Created);
        assert!(action.key.is_none());

        let done = action.complete(Ok(SequenceKey(3)));
        assert_eq!(done.phase, ActionPhase::Persisted);
    }

    #[test]
    fn test_complete_failure_phase() {
        let action = PendingAction::new(OwnerId(1), Bytes::new(), Box::new(|_| {}));
        let done = action.complete(Err(Error::Poisoned));
        assert_eq!(done.phase, ActionPhase::Failed);
    }

    #[test]
    fn test_fire_passes_result() {
        let (tx, rx) = mpsc::channel();
        let action = PendingAction::new(
            OwnerId(9),
            Bytes::from_static(b"payload"),
            Box::new(move |result| {
                tx.send(result.map(|k| k.as_u64()).ok()).unwrap();
            }),
        );

        let phase = action.complete(Ok(SequenceKey(17))).fire();
        assert_eq!(phase, ActionPhase::CallbackFired);
        assert_eq!(rx.recv().unwrap(), Some(17));
    }
}
