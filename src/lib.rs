//! Dialogus - actor-based dialog session manager for streaming chat clients
//!
//! This library manages the conversation lifecycle of a chat frontend talking
//! to a session manager backend over a persistent duplex connection: it
//! correlates asynchronous responses to in-flight requests by dialog id,
//! distinguishes intermediate, final and error responses, reconnects with
//! bounded backoff, retries failed dialogs, and serializes text-to-speech
//! playback.
//!
//! A session is an explicit object owned by the caller:
//!
//! ```no_run
//! use dialogus::session::{SessionHandle, UserQuestion, WebSocketTransport};
//! use dialogus::Settings;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::new()?;
//! let (session, _events) = SessionHandle::spawn(settings, Arc::new(WebSocketTransport));
//! session.connect().await?;
//! let dialog_id = session.send(UserQuestion::text("hello")).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod session;
pub mod speech;
pub mod utils;

pub use config::{
    BackendConfig, ConnectionConfig, LoggingConfig, SessionConfig, Settings, SpeechConfig,
};
pub use error::{BackendError, SessionError, SpeechError};
pub use protocol::{
    Answer, ChatRequest, ChatResponse, CompletionMarker, DialogError, DialogId, PayloadItem,
    UserProfile,
};
pub use session::{
    ConnectionState, Dialog, MessageKind, SessionEvent, SessionHandle, Transport,
    TransportConnection, UserQuestion, WebSocketTransport,
};
pub use speech::{SpeakerRole, Synthesizer, TtsQueueHandle, Utterance};
