//! Error taxonomy for the session manager and its satellite clients.

use crate::protocol::DialogId;
use thiserror::Error;

/// Errors surfaced by the session manager itself. Dialog-level backend
/// failures are not here: those arrive as [`crate::protocol::DialogError`]
/// payloads and are recorded on the dialog they belong to.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A single transport open attempt failed.
    #[error("failed to open connection: {0}")]
    Connect(String),

    /// The connection dropped, or the reconnect budget ran out. Terminal
    /// until the caller explicitly reconnects.
    #[error("connection lost")]
    ConnectionLost,

    /// Attempted to send while no connection is open.
    #[error("not connected")]
    NotConnected,

    #[error("unknown dialog {0}")]
    DialogNotFound(DialogId),

    /// The dialog's error is not marked retryable.
    #[error("dialog {0} is not retryable")]
    NotRetryable(DialogId),

    /// A one-shot callback registration expired before a response arrived.
    #[error("timed out waiting for a response")]
    Timeout,

    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// The session actor is gone; no further operations are possible.
    #[error("session closed")]
    Closed,
}

/// Errors from the speech subsystem (token fetch and TTS playback).
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("failed to fetch speech token: {0}")]
    TokenFetch(String),

    #[error("speech queue closed")]
    QueueClosed,
}

/// Errors from the auxiliary backend HTTP API.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(String),

    #[error("backend returned status {0}")]
    Status(u16),
}
