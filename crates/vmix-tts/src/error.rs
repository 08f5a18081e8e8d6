//! TTS client error types.

use thiserror::Error;

pub type TtsResult<T> = Result<T, TtsError>;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("TTS configuration error: {0}")]
    ConfigError(String),

    #[error("Voice '{0}' not found")]
    VoiceNotFound(String),

    #[error("Provider returned no audio for voice '{0}'")]
    EmptyAudio(String),

    #[error("TTS service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TtsError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TtsError::ServiceUnavailable(_) | TtsError::Network(_))
    }
}
