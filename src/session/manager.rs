//! Session Manager - Handle and Actor
//!
//! Information Hiding:
//! - All mutable session state (link, dialog registry, callback table) is
//!   owned by one spawned actor task; handles only pass messages
//! - One inbound frame is processed fully before the next, so registry
//!   mutations need no locking
//! - The transport is owned exclusively by the actor and replaced wholesale
//!   on reconnect; never two sockets at once

use crate::config::Settings;
use crate::error::SessionError;
use crate::protocol::{ChatRequest, ChatResponse, DialogId, UserPrompt};
use crate::session::connection::{backoff_delay, Transport, TransportConnection};
use crate::session::messages::{ConnectionState, SessionCommand, SessionEvent, UserQuestion};
use crate::session::registry::{Dialog, DialogRegistry};
use crate::session::router::{self, CallbackTable, MessageKind};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use uuid::Uuid;

/// Cloneable handle to a running session actor.
///
/// The session is an explicit object: construct it with [`SessionHandle::spawn`],
/// passing configuration and a transport, and drop every handle (or call
/// [`SessionHandle::shutdown`]) to stop it. Nothing lives at module scope.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl SessionHandle {
    /// Spawn the session actor. Returns the handle plus a lossy event stream
    /// a UI layer can render from.
    pub fn spawn(
        settings: Settings,
        transport: Arc<dyn Transport>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let buffer = settings.session.channel_buffer_size;
        let (sender, commands) = mpsc::channel(buffer);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, event_rx) = mpsc::channel(buffer);

        let actor = SessionActor {
            commands,
            transport,
            registry: DialogRegistry::new(),
            callbacks: CallbackTable::new(),
            link: Link::Down,
            pending_connect: Vec::new(),
            conversation_id: Uuid::new_v4(),
            state_tx,
            events: event_tx,
            settings,
        };
        tokio::spawn(actor.run());

        (
            Self {
                sender,
                state: state_rx,
            },
            event_rx,
        )
    }

    /// Observe the connection state ("the connection is down" is global
    /// state, distinct from any per-dialog failure).
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Open the connection, driving bounded retries with backoff internally.
    /// Resolves once the transport is open, or with
    /// [`SessionError::ConnectionLost`] when the budget is exhausted.
    /// Calling while already open resolves immediately.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCommand::Connect { reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Close the connection without stopping the session. Pending callback
    /// registrations fire with a connection-lost error; no automatic
    /// reconnect follows an explicit disconnect.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCommand::Disconnect { reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Send a question, creating a new dialog. Fails fast with
    /// [`SessionError::NotConnected`] when no connection is open.
    pub async fn send(&self, question: UserQuestion) -> Result<DialogId, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCommand::Send {
            question,
            callback: None,
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Fire-and-forget request/response: sends the question and resolves on
    /// the first response for its dialog, a timeout, or connection loss.
    /// Used for out-of-band flows like summary generation.
    pub async fn request(&self, question: UserQuestion) -> Result<ChatResponse, SessionError> {
        let (tx, rx) = oneshot::channel();
        let (reply, reply_rx) = oneshot::channel();
        self.command(SessionCommand::Send {
            question,
            callback: Some(tx),
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| SessionError::Closed)??;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Register a one-shot callback for a dialog already in flight.
    pub async fn register_callback(
        &self,
        dialog_id: DialogId,
    ) -> Result<oneshot::Receiver<Result<ChatResponse, SessionError>>, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::RegisterCallback { dialog_id, tx })
            .await?;
        Ok(rx)
    }

    /// Re-issue one errored dialog under a fresh dialog id.
    pub async fn retry_dialog(&self, dialog_id: DialogId) -> Result<DialogId, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCommand::RetryDialog { dialog_id, reply })
            .await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Retry every currently-eligible errored dialog. Each dialog is retried
    /// independently; failures are logged and skipped. Returns the new
    /// dialog ids that were issued.
    pub async fn retry_errored(&self) -> Result<Vec<DialogId>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCommand::RetryErrored { reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Read-only snapshot of one dialog.
    pub async fn dialog(&self, dialog_id: DialogId) -> Result<Option<Dialog>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCommand::GetDialog { dialog_id, reply })
            .await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Read-only snapshot of every dialog, in insertion order.
    pub async fn dialogs(&self) -> Result<Vec<Dialog>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCommand::ListDialogs { reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Start a new topic: rotates the conversation id and clears dialog
    /// history. Returns the new conversation id.
    pub async fn new_conversation(&self) -> Result<Uuid, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCommand::NewConversation { reply })
            .await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Stop the session actor.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::Shutdown).await
    }

    async fn command(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

/// Exclusive ownership of zero or one transport.
enum Link {
    Down,
    /// A connect attempt is scheduled; `attempts` counts failures so far.
    Waiting { attempts: u32, deadline: Instant },
    Up(TransportConnection),
}

enum Wake {
    Command(Option<SessionCommand>),
    Inbound(Option<String>),
    Attempt,
    Sweep,
}

struct SessionActor {
    commands: mpsc::Receiver<SessionCommand>,
    transport: Arc<dyn Transport>,
    registry: DialogRegistry,
    callbacks: CallbackTable,
    link: Link,
    pending_connect: Vec<oneshot::Sender<Result<(), SessionError>>>,
    conversation_id: Uuid,
    state_tx: watch::Sender<ConnectionState>,
    events: mpsc::Sender<SessionEvent>,
    settings: Settings,
}

impl SessionActor {
    async fn run(mut self) {
        tracing::info!(conversation_id = %self.conversation_id, "session actor started");

        let sweep = Duration::from_millis(self.settings.session.callback_sweep_ms.max(1));
        let mut sweep_timer = tokio::time::interval(sweep);
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = match &mut self.link {
                Link::Up(conn) => tokio::select! {
                    command = self.commands.recv() => Wake::Command(command),
                    frame = conn.inbound.recv() => Wake::Inbound(frame),
                    _ = sweep_timer.tick() => Wake::Sweep,
                },
                Link::Waiting { deadline, .. } => {
                    let deadline = *deadline;
                    tokio::select! {
                        command = self.commands.recv() => Wake::Command(command),
                        _ = tokio::time::sleep_until(deadline) => Wake::Attempt,
                        _ = sweep_timer.tick() => Wake::Sweep,
                    }
                }
                Link::Down => tokio::select! {
                    command = self.commands.recv() => Wake::Command(command),
                    _ = sweep_timer.tick() => Wake::Sweep,
                },
            };

            match wake {
                Wake::Command(None) => {
                    self.close("all session handles dropped");
                    break;
                }
                Wake::Command(Some(SessionCommand::Shutdown)) => {
                    self.close("shutdown requested");
                    break;
                }
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Inbound(Some(raw)) => self.handle_inbound(&raw),
                Wake::Inbound(None) => self.handle_link_drop(),
                Wake::Attempt => self.attempt_connect().await,
                Wake::Sweep => {
                    self.callbacks.expire(Instant::now());
                }
            }
        }

        tracing::info!("session actor stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { reply } => match self.link {
                Link::Up(_) => {
                    let _ = reply.send(Ok(()));
                }
                Link::Waiting { .. } => self.pending_connect.push(reply),
                Link::Down => {
                    self.pending_connect.push(reply);
                    self.link = Link::Waiting {
                        attempts: 0,
                        deadline: Instant::now(),
                    };
                    self.set_state(ConnectionState::Connecting);
                }
            },
            SessionCommand::Disconnect { reply } => {
                tracing::info!("disconnect requested");
                self.tear_down_link();
                self.set_state(ConnectionState::Disconnected);
                let _ = reply.send(());
            }
            SessionCommand::Send {
                question,
                callback,
                reply,
            } => {
                let result = self.send_question(question, callback).await;
                let _ = reply.send(result);
            }
            SessionCommand::RegisterCallback { dialog_id, tx } => {
                if matches!(self.link, Link::Up(_)) {
                    let ttl = self.callback_ttl();
                    self.callbacks.register(dialog_id, tx, ttl);
                } else {
                    let _ = tx.send(Err(SessionError::NotConnected));
                }
            }
            SessionCommand::RetryDialog { dialog_id, reply } => {
                let result = self.retry_dialog(dialog_id).await;
                let _ = reply.send(result);
            }
            SessionCommand::RetryErrored { reply } => {
                let retried = self.retry_errored().await;
                let _ = reply.send(retried);
            }
            SessionCommand::GetDialog { dialog_id, reply } => {
                let _ = reply.send(self.registry.get(&dialog_id).cloned());
            }
            SessionCommand::ListDialogs { reply } => {
                let _ = reply.send(self.registry.snapshot());
            }
            SessionCommand::NewConversation { reply } => {
                self.conversation_id = Uuid::new_v4();
                self.registry.clear();
                tracing::info!(conversation_id = %self.conversation_id, "started new conversation");
                let _ = reply.send(self.conversation_id);
            }
            // Handled in the run loop before dispatch.
            SessionCommand::Shutdown => {}
        }
    }

    async fn send_question(
        &mut self,
        question: UserQuestion,
        callback: Option<oneshot::Sender<Result<ChatResponse, SessionError>>>,
    ) -> Result<DialogId, SessionError> {
        if !matches!(self.link, Link::Up(_)) {
            if let Some(tx) = callback {
                let _ = tx.send(Err(SessionError::NotConnected));
            }
            return Err(SessionError::NotConnected);
        }

        let dialog = Dialog::new(self.conversation_id, question);
        let dialog_id = dialog.dialog_id;
        self.dispatch_request(dialog_id, self.conversation_id, &dialog.question)
            .await?;

        self.registry.insert(dialog);
        if let Some(tx) = callback {
            let ttl = self.callback_ttl();
            self.callbacks.register(dialog_id, tx, ttl);
        }
        self.emit(SessionEvent::DialogCreated { dialog_id });
        tracing::debug!(%dialog_id, "dialog sent");
        Ok(dialog_id)
    }

    async fn retry_dialog(&mut self, dialog_id: DialogId) -> Result<DialogId, SessionError> {
        let dialog = self
            .registry
            .get(&dialog_id)
            .ok_or(SessionError::DialogNotFound(dialog_id))?;
        if !dialog.is_retryable(self.settings.session.retry_by_default) {
            return Err(SessionError::NotRetryable(dialog_id));
        }
        if !matches!(self.link, Link::Up(_)) {
            // The dialog keeps its error state; nothing was re-sent.
            return Err(SessionError::NotConnected);
        }

        let question = dialog.question.clone();
        let conversation_id = dialog.conversation_id;
        let new_id = Uuid::new_v4();
        self.dispatch_request(new_id, conversation_id, &question)
            .await?;

        self.registry.supersede(&dialog_id, new_id);
        self.emit(SessionEvent::DialogCreated { dialog_id: new_id });
        tracing::info!(old = %dialog_id, new = %new_id, "dialog retried");
        Ok(new_id)
    }

    async fn retry_errored(&mut self) -> Vec<DialogId> {
        let candidates = self
            .registry
            .retryable_errors(self.settings.session.retry_by_default);
        let mut retried = Vec::with_capacity(candidates.len());
        for dialog_id in candidates {
            match self.retry_dialog(dialog_id).await {
                Ok(new_id) => retried.push(new_id),
                Err(e) => {
                    tracing::warn!(%dialog_id, error = %e, "failed to retry dialog")
                }
            }
        }
        retried
    }

    /// Serialize and write one request to the open link. A failed write
    /// means the writer task is gone, which is treated as a link drop.
    async fn dispatch_request(
        &mut self,
        dialog_id: DialogId,
        conversation_id: Uuid,
        question: &UserQuestion,
    ) -> Result<(), SessionError> {
        let request = ChatRequest {
            dialog_id,
            conversation_id,
            user_id: self.settings.session.user_id.clone(),
            message: UserPrompt {
                payload: question.payload.clone(),
            },
            user_profile: question.user_profile.clone(),
            overrides: question.overrides.clone(),
        };
        let text = serde_json::to_string(&request).map_err(SessionError::Encode)?;

        let Link::Up(conn) = &self.link else {
            return Err(SessionError::NotConnected);
        };
        if conn.outbound.send(text).await.is_err() {
            tracing::warn!("outbound channel closed mid-send");
            self.handle_link_drop();
            return Err(SessionError::NotConnected);
        }
        Ok(())
    }

    fn handle_inbound(&mut self, raw: &str) {
        let marker = self.settings.session.completion_marker;
        if let Some((dialog_id, kind)) =
            router::route(raw, marker, &mut self.registry, &mut self.callbacks)
        {
            self.emit(SessionEvent::DialogUpdated { dialog_id, kind });
        }
    }

    /// The link dropped without an explicit disconnect: fail what was in
    /// flight, then re-enter the connect loop if the budget allows.
    fn handle_link_drop(&mut self) {
        tracing::warn!("connection dropped");
        self.tear_down_link();

        if self.settings.connection.max_reconnect_attempts > 0 {
            let delay = backoff_delay(self.settings.connection.backoff_base_ms, 1);
            tracing::info!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");
            self.link = Link::Waiting {
                attempts: 0,
                deadline: Instant::now() + delay,
            };
            self.set_state(ConnectionState::Connecting);
        } else {
            self.set_state(ConnectionState::Disconnected);
            self.emit(SessionEvent::ConnectionLost { attempts: 0 });
        }
    }

    async fn attempt_connect(&mut self) {
        let Link::Waiting { attempts, .. } = self.link else {
            return;
        };

        match self
            .transport
            .connect(&self.settings.connection.endpoint)
            .await
        {
            Ok(conn) => {
                // A successful open resets the retry counter: the next drop
                // starts from a full budget again.
                self.link = Link::Up(conn);
                self.set_state(ConnectionState::Open);
                tracing::info!("connected");
                for reply in self.pending_connect.drain(..) {
                    let _ = reply.send(Ok(()));
                }
            }
            Err(e) => {
                let attempts = attempts + 1;
                let budget = self.settings.connection.max_reconnect_attempts;
                tracing::warn!(attempt = attempts, budget, error = %e, "connection attempt failed");

                if attempts >= budget {
                    self.link = Link::Down;
                    self.set_state(ConnectionState::Disconnected);
                    for reply in self.pending_connect.drain(..) {
                        let _ = reply.send(Err(SessionError::ConnectionLost));
                    }
                    self.emit(SessionEvent::ConnectionLost { attempts });
                } else {
                    let delay = backoff_delay(self.settings.connection.backoff_base_ms, attempts);
                    self.link = Link::Waiting {
                        attempts,
                        deadline: Instant::now() + delay,
                    };
                }
            }
        }
    }

    /// Drop the transport and fail everything that was waiting on it:
    /// pending callbacks fire with connection-lost, in-flight dialogs get a
    /// synthetic retryable error so they can be replayed later.
    fn tear_down_link(&mut self) {
        self.link = Link::Down;
        self.callbacks.fail_all(|| SessionError::ConnectionLost);
        for reply in self.pending_connect.drain(..) {
            let _ = reply.send(Err(SessionError::ConnectionLost));
        }
        for dialog_id in self.registry.mark_connection_lost() {
            self.emit(SessionEvent::DialogUpdated {
                dialog_id,
                kind: MessageKind::Error,
            });
        }
    }

    fn close(&mut self, reason: &str) {
        tracing::info!(reason, "closing session");
        self.link = Link::Down;
        self.callbacks.fail_all(|| SessionError::Closed);
        for reply in self.pending_connect.drain(..) {
            let _ = reply.send(Err(SessionError::Closed));
        }
        self.set_state(ConnectionState::Closed);
    }

    fn callback_ttl(&self) -> Duration {
        Duration::from_millis(self.settings.session.callback_timeout_ms)
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }

    fn emit(&self, event: SessionEvent) {
        // A slow or absent UI consumer must never stall routing.
        let _ = self.events.try_send(event);
    }
}
