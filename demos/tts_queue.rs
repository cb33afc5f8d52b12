//! Shows the TTS queue's ordering guarantee: several tasks enqueue
//! concurrently, playback still happens one utterance at a time in
//! enqueue order.
//!
//!     cargo run --example tts_queue

use async_trait::async_trait;
use dialogus::speech::{SpeakerRole, Synthesizer, TtsQueueHandle, Utterance};
use dialogus::SpeechError;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Stand-in for a real speech engine: prints the utterance and sleeps for
/// its simulated playback duration.
struct ConsoleSynthesizer;

#[async_trait]
impl Synthesizer for ConsoleSynthesizer {
    async fn speak(&self, utterance: &Utterance) -> Result<(), SpeechError> {
        let voice = match utterance.role {
            SpeakerRole::Agent => "agent",
            SpeakerRole::Customer => "customer",
        };
        println!("[{voice}] ▶ {}", utterance.text);
        sleep(Duration::from_millis(300)).await;
        println!("[{voice}] ■ done");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let queue = TtsQueueHandle::spawn(Arc::new(ConsoleSynthesizer), 16);

    queue
        .enqueue("Welcome! How can I help you today?", SpeakerRole::Agent)
        .await?;
    queue
        .enqueue("I am looking for running shoes.", SpeakerRole::Customer)
        .await?;

    // Even racing producers cannot interleave audio.
    let mut tasks = Vec::new();
    for i in 1..=3 {
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            queue
                .enqueue(format!("Streamed sentence number {i}."), SpeakerRole::Agent)
                .await
        }));
    }
    for task in tasks {
        task.await??;
    }

    // Give the drain actor time to finish playback before exiting.
    sleep(Duration::from_secs(2)).await;
    Ok(())
}
