//! Message Router - Inbound Classification and Dispatch
//!
//! Every inbound frame goes through exactly one classification pass and one
//! dispatch: registry update first, then any one-shot callback registered for
//! the dialog id. Malformed frames are logged and dropped without touching
//! state.

use crate::error::SessionError;
use crate::protocol::{ChatResponse, CompletionMarker, DialogId};
use crate::session::registry::DialogRegistry;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Error,
    Intermediate,
    Final,
}

/// Classify an inbound response. First match wins:
/// 1. a non-empty error indicator makes it an error
/// 2. the configured completion marker makes it final
/// 3. anything else is an intermediate update
pub fn classify(response: &ChatResponse, marker: CompletionMarker) -> MessageKind {
    if let Some(error) = &response.error {
        if !error.error_str.is_empty() {
            return MessageKind::Error;
        }
    }

    if let Some(answer) = &response.answer {
        let is_final = match marker {
            CompletionMarker::IsFinalFlag => answer.is_final,
            CompletionMarker::DataPoints => !answer.data_points.is_empty(),
            CompletionMarker::StepsExecution => answer.steps_execution.is_some(),
        };
        if is_final {
            return MessageKind::Final;
        }
    }

    MessageKind::Intermediate
}

/// One-shot callback registrations keyed by dialog id. Each entry fires at
/// most once: on the first message for its dialog, on expiry, or when the
/// connection goes away, whichever comes first.
#[derive(Debug, Default)]
pub struct CallbackTable {
    entries: HashMap<DialogId, CallbackEntry>,
}

#[derive(Debug)]
struct CallbackEntry {
    tx: oneshot::Sender<Result<ChatResponse, SessionError>>,
    deadline: Instant,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn register(
        &mut self,
        dialog_id: DialogId,
        tx: oneshot::Sender<Result<ChatResponse, SessionError>>,
        ttl: Duration,
    ) {
        let deadline = Instant::now() + ttl;
        if self
            .entries
            .insert(dialog_id, CallbackEntry { tx, deadline })
            .is_some()
        {
            tracing::warn!(%dialog_id, "replaced an existing callback registration");
        }
    }

    /// Fire and remove the registration for a dialog, if any. Firing for an
    /// unregistered or already-fired id is a no-op.
    pub fn fire(&mut self, dialog_id: &DialogId, response: ChatResponse) {
        if let Some(entry) = self.entries.remove(dialog_id) {
            let _ = entry.tx.send(Ok(response));
        }
    }

    /// Resolve every registration past its deadline with a timeout failure.
    pub fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<DialogId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for dialog_id in &expired {
            if let Some(entry) = self.entries.remove(dialog_id) {
                tracing::debug!(%dialog_id, "callback registration timed out");
                let _ = entry.tx.send(Err(SessionError::Timeout));
            }
        }
        expired.len()
    }

    /// Resolve every registration with an error. Used on disconnect and
    /// shutdown so no waiter is left pending forever.
    pub fn fail_all(&mut self, make_error: impl Fn() -> SessionError) {
        for (_, entry) in self.entries.drain() {
            let _ = entry.tx.send(Err(make_error()));
        }
    }
}

/// Parse, classify and dispatch one raw frame. Returns what was routed, or
/// `None` for a malformed frame.
pub fn route(
    raw: &str,
    marker: CompletionMarker,
    registry: &mut DialogRegistry,
    callbacks: &mut CallbackTable,
) -> Option<(DialogId, MessageKind)> {
    let response: ChatResponse = match serde_json::from_str(raw) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed inbound message");
            return None;
        }
    };

    let kind = classify(&response, marker);
    let dialog_id = response.dialog_id;

    registry.record(response.clone(), kind);
    // Callbacks fire regardless of whether the registry knew the dialog:
    // out-of-band flows are not part of the dialog list.
    callbacks.fire(&dialog_id, response);

    Some((dialog_id, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::messages::UserQuestion;
    use serde_json::json;
    use uuid::Uuid;

    fn response(value: serde_json::Value) -> ChatResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_error_wins_over_completion_marker() {
        let r = response(json!({
            "dialog_id": Uuid::new_v4(),
            "answer": {"answer_string": "done", "is_final": true},
            "error": {"error_str": "failed anyway"}
        }));
        assert_eq!(
            classify(&r, CompletionMarker::IsFinalFlag),
            MessageKind::Error
        );
    }

    #[test]
    fn test_empty_error_string_is_not_an_error() {
        let r = response(json!({
            "dialog_id": Uuid::new_v4(),
            "answer": {"answer_string": "done", "is_final": true},
            "error": {"error_str": ""}
        }));
        assert_eq!(
            classify(&r, CompletionMarker::IsFinalFlag),
            MessageKind::Final
        );
    }

    #[test]
    fn test_completion_marker_policies_disagree() {
        let r = response(json!({
            "dialog_id": Uuid::new_v4(),
            "answer": {"answer_string": "results", "data_points": ["a", "b"]}
        }));
        assert_eq!(
            classify(&r, CompletionMarker::DataPoints),
            MessageKind::Final
        );
        assert_eq!(
            classify(&r, CompletionMarker::IsFinalFlag),
            MessageKind::Intermediate
        );
        assert_eq!(
            classify(&r, CompletionMarker::StepsExecution),
            MessageKind::Intermediate
        );
    }

    #[test]
    fn test_answerless_message_is_intermediate() {
        let r = response(json!({"dialog_id": Uuid::new_v4()}));
        assert_eq!(
            classify(&r, CompletionMarker::IsFinalFlag),
            MessageKind::Intermediate
        );
    }

    #[tokio::test]
    async fn test_route_updates_registry_and_fires_callback() {
        let mut registry = DialogRegistry::new();
        let mut callbacks = CallbackTable::new();
        let dialog_id = registry.create(Uuid::new_v4(), UserQuestion::text("hello"));

        let (tx, rx) = oneshot::channel();
        callbacks.register(dialog_id, tx, Duration::from_secs(5));

        let raw = json!({
            "dialog_id": dialog_id,
            "answer": {"answer_string": "done", "is_final": true}
        })
        .to_string();

        let routed = route(
            &raw,
            CompletionMarker::IsFinalFlag,
            &mut registry,
            &mut callbacks,
        );
        assert_eq!(routed, Some((dialog_id, MessageKind::Final)));
        assert!(registry.get(&dialog_id).unwrap().final_response.is_some());

        let delivered = rx.await.unwrap().unwrap();
        assert_eq!(delivered.dialog_id, dialog_id);
        // Second message for the same dialog finds no registration left.
        assert!(callbacks.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_message_routes_nothing() {
        let mut registry = DialogRegistry::new();
        let mut callbacks = CallbackTable::new();
        assert_eq!(
            route(
                "not json {",
                CompletionMarker::IsFinalFlag,
                &mut registry,
                &mut callbacks
            ),
            None
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_expire_resolves_with_timeout() {
        let mut callbacks = CallbackTable::new();
        let (tx, rx) = oneshot::channel();
        callbacks.register(Uuid::new_v4(), tx, Duration::from_millis(0));

        assert_eq!(callbacks.expire(Instant::now()), 1);
        assert!(matches!(rx.await.unwrap(), Err(SessionError::Timeout)));
        assert!(callbacks.is_empty());
    }

    #[tokio::test]
    async fn test_fail_all_resolves_every_waiter() {
        let mut callbacks = CallbackTable::new();
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        callbacks.register(Uuid::new_v4(), tx_a, Duration::from_secs(5));
        callbacks.register(Uuid::new_v4(), tx_b, Duration::from_secs(5));

        callbacks.fail_all(|| SessionError::ConnectionLost);
        assert!(matches!(
            rx_a.await.unwrap(),
            Err(SessionError::ConnectionLost)
        ));
        assert!(matches!(
            rx_b.await.unwrap(),
            Err(SessionError::ConnectionLost)
        ));
    }
}
