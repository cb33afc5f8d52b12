//! Dialog Registry - In-Flight Dialog State
//!
//! Information Hiding:
//! - Dialog entries are mutated only through the record/supersede contract
//! - Callers get owned snapshots, never references into the store
//! - Insertion order is preserved across retries (identity changes, position
//!   does not)

use crate::protocol::{ChatResponse, DialogError, DialogId};
use crate::session::messages::UserQuestion;
use crate::session::router::MessageKind;
use std::collections::HashMap;
use uuid::Uuid;

/// One user request/response exchange.
#[derive(Debug, Clone)]
pub struct Dialog {
    pub dialog_id: DialogId,
    pub conversation_id: Uuid,
    pub question: UserQuestion,
    /// Partial responses, append-only while the dialog is in flight,
    /// strictly in arrival order.
    pub intermediate_responses: Vec<ChatResponse>,
    pub final_response: Option<ChatResponse>,
    pub error_response: Option<ChatResponse>,
}

impl Dialog {
    pub fn new(conversation_id: Uuid, question: UserQuestion) -> Self {
        Self {
            dialog_id: Uuid::new_v4(),
            conversation_id,
            question,
            intermediate_responses: Vec::new(),
            final_response: None,
            error_response: None,
        }
    }

    /// A dialog is terminal once either a final or an error response landed.
    /// The two are mutually exclusive by construction.
    pub fn is_terminal(&self) -> bool {
        self.final_response.is_some() || self.error_response.is_some()
    }

    pub fn dialog_error(&self) -> Option<&DialogError> {
        self.error_response.as_ref().and_then(|r| r.error.as_ref())
    }

    /// Whether this dialog is eligible for automatic resubmission.
    /// `retry_default` applies when the error payload carries no flag.
    pub fn is_retryable(&self, retry_default: bool) -> bool {
        self.dialog_error()
            .map(|e| e.is_retryable(retry_default))
            .unwrap_or(false)
    }
}

/// What became of a recorded response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Applied(MessageKind),
    /// No dialog with that id is tracked; the response was dropped. Usually
    /// a late message for a dialog already superseded by a retry.
    UnknownDialog,
    /// The dialog already reached a terminal state; the response was ignored.
    AfterTerminal,
}

/// Insertion-ordered store of dialogs, keyed by dialog id.
#[derive(Debug, Default)]
pub struct DialogRegistry {
    dialogs: Vec<Dialog>,
    index: HashMap<DialogId, usize>,
}

impl DialogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new dialog with a fresh id. Ids are never reused, not even
    /// from completed dialogs.
    pub fn create(&mut self, conversation_id: Uuid, question: UserQuestion) -> DialogId {
        self.insert(Dialog::new(conversation_id, question))
    }

    pub fn insert(&mut self, dialog: Dialog) -> DialogId {
        let dialog_id = dialog.dialog_id;
        self.index.insert(dialog_id, self.dialogs.len());
        self.dialogs.push(dialog);
        dialog_id
    }

    pub fn get(&self, dialog_id: &DialogId) -> Option<&Dialog> {
        self.index.get(dialog_id).map(|&i| &self.dialogs[i])
    }

    /// Owned copies of every dialog, in insertion order.
    pub fn snapshot(&self) -> Vec<Dialog> {
        self.dialogs.clone()
    }

    pub fn len(&self) -> usize {
        self.dialogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }

    pub fn clear(&mut self) {
        self.dialogs.clear();
        self.index.clear();
    }

    /// Apply a classified response to its dialog. Unknown ids and responses
    /// arriving after a terminal state are dropped, never an error.
    pub fn record(&mut self, response: ChatResponse, kind: MessageKind) -> RecordOutcome {
        let Some(&i) = self.index.get(&response.dialog_id) else {
            tracing::debug!(dialog_id = %response.dialog_id, "dropping response for unknown dialog");
            return RecordOutcome::UnknownDialog;
        };
        let dialog = &mut self.dialogs[i];

        if dialog.is_terminal() {
            tracing::warn!(
                dialog_id = %dialog.dialog_id,
                ?kind,
                "ignoring response for already-terminal dialog"
            );
            return RecordOutcome::AfterTerminal;
        }

        match kind {
            MessageKind::Intermediate => dialog.intermediate_responses.push(response),
            MessageKind::Final => dialog.final_response = Some(response),
            MessageKind::Error => dialog.error_response = Some(response),
        }
        RecordOutcome::Applied(kind)
    }

    /// Replace a dialog's identity in place for a retry: same position in
    /// history, same question and conversation, fresh id, state reset.
    /// Responses still carrying the old id will fall through `record` as
    /// unknown from now on.
    pub fn supersede(&mut self, old_id: &DialogId, new_id: DialogId) -> bool {
        let Some(i) = self.index.remove(old_id) else {
            return false;
        };
        let dialog = &mut self.dialogs[i];
        dialog.dialog_id = new_id;
        dialog.intermediate_responses.clear();
        dialog.final_response = None;
        dialog.error_response = None;
        self.index.insert(new_id, i);
        true
    }

    /// Mark every non-terminal dialog as failed with a synthetic,
    /// explicitly-retryable connection-lost error. Called when the link
    /// drops so no dialog is left indeterminate forever.
    pub fn mark_connection_lost(&mut self) -> Vec<DialogId> {
        let mut affected = Vec::new();
        for dialog in &mut self.dialogs {
            if dialog.is_terminal() {
                continue;
            }
            dialog.error_response = Some(ChatResponse {
                dialog_id: dialog.dialog_id,
                conversation_id: Some(dialog.conversation_id),
                user_id: None,
                answer: None,
                error: Some(DialogError {
                    error_str: "connection lost before a final response arrived".to_string(),
                    retry: Some(true),
                    status_code: None,
                }),
            });
            affected.push(dialog.dialog_id);
        }
        affected
    }

    /// Dialogs currently in error whose error is marked retryable.
    pub fn retryable_errors(&self, retry_default: bool) -> Vec<DialogId> {
        self.dialogs
            .iter()
            .filter(|d| d.is_retryable(retry_default))
            .map(|d| d.dialog_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn intermediate(dialog_id: DialogId, text: &str) -> ChatResponse {
        serde_json::from_value(json!({
            "dialog_id": dialog_id,
            "answer": {"answer_string": text}
        }))
        .unwrap()
    }

    fn final_answer(dialog_id: DialogId, text: &str) -> ChatResponse {
        serde_json::from_value(json!({
            "dialog_id": dialog_id,
            "answer": {"answer_string": text, "is_final": true}
        }))
        .unwrap()
    }

    fn error(dialog_id: DialogId, retry: bool) -> ChatResponse {
        serde_json::from_value(json!({
            "dialog_id": dialog_id,
            "error": {"error_str": "backend failed", "retry": retry}
        }))
        .unwrap()
    }

    #[test]
    fn test_intermediates_accumulate_in_order() {
        let mut registry = DialogRegistry::new();
        let id = registry.create(Uuid::new_v4(), UserQuestion::text("hello"));

        registry.record(intermediate(id, "one"), MessageKind::Intermediate);
        registry.record(intermediate(id, "two"), MessageKind::Intermediate);
        registry.record(final_answer(id, "done"), MessageKind::Final);

        let dialog = registry.get(&id).unwrap();
        assert_eq!(dialog.intermediate_responses.len(), 2);
        let texts: Vec<_> = dialog
            .intermediate_responses
            .iter()
            .map(|r| r.answer.as_ref().unwrap().answer_string.clone().unwrap())
            .collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert!(dialog.final_response.is_some());
    }

    #[test]
    fn test_terminal_blocks_further_responses() {
        let mut registry = DialogRegistry::new();
        let id = registry.create(Uuid::new_v4(), UserQuestion::text("hello"));

        registry.record(final_answer(id, "done"), MessageKind::Final);
        assert_eq!(
            registry.record(error(id, true), MessageKind::Error),
            RecordOutcome::AfterTerminal
        );
        assert_eq!(
            registry.record(intermediate(id, "late"), MessageKind::Intermediate),
            RecordOutcome::AfterTerminal
        );

        let dialog = registry.get(&id).unwrap();
        assert!(dialog.final_response.is_some());
        assert!(dialog.error_response.is_none());
        assert!(dialog.intermediate_responses.is_empty());
    }

    #[test]
    fn test_unknown_dialog_is_a_noop() {
        let mut registry = DialogRegistry::new();
        let outcome = registry.record(
            intermediate(Uuid::new_v4(), "orphan"),
            MessageKind::Intermediate,
        );
        assert_eq!(outcome, RecordOutcome::UnknownDialog);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_supersede_preserves_position_and_drops_old_id() {
        let mut registry = DialogRegistry::new();
        let conversation = Uuid::new_v4();
        let first = registry.create(conversation, UserQuestion::text("first"));
        let second = registry.create(conversation, UserQuestion::text("second"));
        registry.record(error(second, true), MessageKind::Error);

        let new_id = Uuid::new_v4();
        assert!(registry.supersede(&second, new_id));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].dialog_id, first);
        assert_eq!(snapshot[1].dialog_id, new_id);
        assert!(!snapshot[1].is_terminal());

        // Responses for the superseded id are now dropped.
        assert_eq!(
            registry.record(final_answer(second, "late"), MessageKind::Final),
            RecordOutcome::UnknownDialog
        );
        assert!(registry.get(&new_id).unwrap().final_response.is_none());
    }

    #[test]
    fn test_mark_connection_lost_spares_terminal_dialogs() {
        let mut registry = DialogRegistry::new();
        let conversation = Uuid::new_v4();
        let done = registry.create(conversation, UserQuestion::text("done"));
        let pending = registry.create(conversation, UserQuestion::text("pending"));
        registry.record(final_answer(done, "ok"), MessageKind::Final);

        let affected = registry.mark_connection_lost();
        assert_eq!(affected, vec![pending]);
        assert!(registry.get(&pending).unwrap().is_retryable(false));
        assert!(registry.get(&done).unwrap().final_response.is_some());
    }

    #[test]
    fn test_retry_eligibility_honors_default_policy() {
        let mut registry = DialogRegistry::new();
        let conversation = Uuid::new_v4();
        let flagged = registry.create(conversation, UserQuestion::text("a"));
        let unflagged = registry.create(conversation, UserQuestion::text("b"));
        registry.record(error(flagged, true), MessageKind::Error);

        let unflagged_error: ChatResponse = serde_json::from_value(json!({
            "dialog_id": unflagged,
            "error": {"error_str": "no flag"}
        }))
        .unwrap();
        registry.record(unflagged_error, MessageKind::Error);

        assert_eq!(registry.retryable_errors(false), vec![flagged]);
        assert_eq!(registry.retryable_errors(true).len(), 2);
    }
}
