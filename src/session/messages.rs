//! Command and event types exchanged with the session actor.

use crate::error::SessionError;
use crate::protocol::{ChatResponse, DialogId, PayloadItem, UserProfile};
use crate::session::registry::Dialog;
use crate::session::router::MessageKind;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

/// What the user asked: the outbound payload content plus any per-request
/// profile or classification override. Kept verbatim on the dialog so a
/// retry can re-send it unchanged.
#[derive(Debug, Clone)]
pub struct UserQuestion {
    pub payload: Vec<PayloadItem>,
    pub user_profile: Option<UserProfile>,
    pub overrides: Option<Value>,
}

impl UserQuestion {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            payload: vec![PayloadItem::text(value)],
            user_profile: None,
            overrides: None,
        }
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.user_profile = Some(profile);
        self
    }

    pub fn with_overrides(mut self, overrides: Value) -> Self {
        self.overrides = Some(overrides);
        self
    }
}

#[derive(Debug)]
pub enum SessionCommand {
    Connect {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Send {
        question: UserQuestion,
        /// Registered against the new dialog id before anything can arrive
        /// for it, so a fast response cannot race the registration.
        callback: Option<oneshot::Sender<Result<ChatResponse, SessionError>>>,
        reply: oneshot::Sender<Result<DialogId, SessionError>>,
    },
    RegisterCallback {
        dialog_id: DialogId,
        tx: oneshot::Sender<Result<ChatResponse, SessionError>>,
    },
    RetryDialog {
        dialog_id: DialogId,
        reply: oneshot::Sender<Result<DialogId, SessionError>>,
    },
    RetryErrored {
        reply: oneshot::Sender<Vec<DialogId>>,
    },
    GetDialog {
        dialog_id: DialogId,
        reply: oneshot::Sender<Option<Dialog>>,
    },
    ListDialogs {
        reply: oneshot::Sender<Vec<Dialog>>,
    },
    NewConversation {
        reply: oneshot::Sender<Uuid>,
    },
    Shutdown,
}

/// Best-effort notifications for a UI layer. Delivery is lossy: the actor
/// never blocks on a slow consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DialogCreated {
        dialog_id: DialogId,
    },
    DialogUpdated {
        dialog_id: DialogId,
        kind: MessageKind,
    },
    /// The reconnect budget is exhausted; no further automatic attempts.
    ConnectionLost {
        attempts: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// The session actor has stopped.
    Closed,
}
