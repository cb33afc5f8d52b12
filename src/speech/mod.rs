//! Speech subsystem: serialized TTS playback and token management.
//! Synthesis itself lives behind the [`Synthesizer`] trait; this crate only
//! guarantees ordering and token freshness.

pub mod token;
pub mod tts;

pub use token::{SpeechToken, SpeechTokenClient};
pub use tts::{SpeakerRole, Synthesizer, TtsQueueHandle, Utterance};
