//! Transport Abstraction and WebSocket Implementation
//!
//! Information Hiding:
//! - The socket library is hidden behind the `Transport` trait; the session
//!   actor only ever sees a pair of string channels
//! - Pump tasks own the socket halves; dropping the channel pair tears the
//!   connection down

use crate::error::SessionError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

const FRAME_BUFFER: usize = 64;

/// A live duplex message stream. `inbound` yielding `None` means the peer
/// (or the pump task) closed the connection.
#[derive(Debug)]
pub struct TransportConnection {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

/// Opens message-stream connections. Implemented over WebSocket in
/// production and over plain channels in tests.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, endpoint: &str) -> Result<TransportConnection, SessionError>;
}

/// WebSocket transport. Each open generates a fresh client-side
/// `connection_id` and passes it as a query parameter.
#[derive(Debug, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, endpoint: &str) -> Result<TransportConnection, SessionError> {
        let connection_id = Uuid::new_v4();
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        let url = format!("{endpoint}{separator}connection_id={connection_id}");

        let (stream, _) = connect_async(&url)
            .await
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        tracing::info!(%connection_id, "websocket open");

        let (mut ws_tx, mut ws_rx) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(FRAME_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(FRAME_BUFFER);

        // Writer: forwards outbound frames, sends a close frame when the
        // session drops its sender.
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if ws_tx.send(Message::Text(text)).await.is_err() {
                    tracing::debug!("websocket send failed, stopping writer");
                    return;
                }
            }
            let _ = ws_tx.send(Message::Close(None)).await;
        });

        // Reader: forwards text frames, ends on close or error. Dropping
        // `inbound_tx` is how the session learns the connection is gone.
        tokio::spawn(async move {
            while let Some(frame) = ws_rx.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("server closed the connection");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
        });

        Ok(TransportConnection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Linear backoff: attempt n (1-based) waits n * base.
pub(crate) fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(u64::from(attempt.max(1))))
}
