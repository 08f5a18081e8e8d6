//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("Voice generation failed for {voice}: {message}")]
    VoiceGeneration { voice: String, message: String },

    #[error("Invalid job: {0}")]
    InvalidJob(#[from] vmix_models::ModelError),

    #[error("Task {0} is already active")]
    TaskActive(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job aborted: {0}")]
    Aborted(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] vmix_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] vmix_storage::StorageError),

    #[error("TTS error: {0}")]
    Tts(#[from] vmix_tts::TtsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio::task::JoinError> for WorkerError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            Self::Aborted("job task panicked".to_string())
        } else {
            Self::Aborted("job task was cancelled".to_string())
        }
    }
}

impl WorkerError {
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn voice_generation(voice: impl Into<String>, message: impl Into<String>) -> Self {
        Self::VoiceGeneration {
            voice: voice.into(),
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether another attempt of the whole job may succeed.
    ///
    /// Provisioning and upload talk to remote hosts and are retried; bad
    /// input, cancellation and encoder failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Media(e) => matches!(e, vmix_media::MediaError::ProvisionFailed { .. }),
            Self::Storage(e) => e.is_retryable(),
            Self::Tts(e) => e.is_retryable(),
            _ => false,
        }
    }
}
