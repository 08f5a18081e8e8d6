//! Text-to-speech collaborator.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::{ElevenLabsClient, TtsConfig};
pub use error::{TtsError, TtsResult};
pub use types::Voice;

/// Converts text into audio bytes using a named voice.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Fails with [`TtsError::VoiceNotFound`] when no voice matches `voice_name`.
    async fn synthesize(&self, text: &str, voice_name: &str) -> TtsResult<Vec<u8>>;
}
