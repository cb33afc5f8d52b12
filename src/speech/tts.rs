//! TTS Queue - Strictly Ordered Playback
//!
//! Utterances play in enqueue order, one at a time. The drain actor awaits
//! each utterance's playback completion before dequeuing the next, so
//! concurrent producers can never interleave audio.

use crate::error::SpeechError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerRole {
    Agent,
    Customer,
}

#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub role: SpeakerRole,
}

/// Speaks one utterance. `speak` must resolve only once playback has
/// completed, not when synthesis was merely submitted; the queue's ordering
/// guarantee depends on it. Voice selection per role is an implementation
/// concern.
#[async_trait]
pub trait Synthesizer: Send + Sync + 'static {
    async fn speak(&self, utterance: &Utterance) -> Result<(), SpeechError>;
}

/// Cloneable handle to the TTS drain actor.
#[derive(Clone)]
pub struct TtsQueueHandle {
    sender: mpsc::Sender<Utterance>,
}

impl TtsQueueHandle {
    pub fn spawn(synthesizer: Arc<dyn Synthesizer>, buffer_size: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        tokio::spawn(tts_actor(receiver, synthesizer));
        Self { sender }
    }

    /// Queue an utterance for playback. Ordering is by enqueue order only;
    /// completion of this call does not mean playback started.
    pub async fn enqueue(
        &self,
        text: impl Into<String>,
        role: SpeakerRole,
    ) -> Result<(), SpeechError> {
        self.sender
            .send(Utterance {
                text: text.into(),
                role,
            })
            .await
            .map_err(|_| SpeechError::QueueClosed)
    }
}

async fn tts_actor(mut receiver: mpsc::Receiver<Utterance>, synthesizer: Arc<dyn Synthesizer>) {
    tracing::debug!("tts queue started");
    while let Some(utterance) = receiver.recv().await {
        // One failed utterance never blocks the rest of the queue.
        if let Err(e) = synthesizer.speak(&utterance).await {
            tracing::warn!(error = %e, "utterance failed, continuing with the queue");
        }
    }
    tracing::debug!("tts queue closed");
}
