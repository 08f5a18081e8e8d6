//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while provisioning or running the encoder.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Failed to provision {binary}: {message}")]
    ProvisionFailed { binary: String, message: String },

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Combination {combination} failed: {message}")]
    CombineFailed { combination: String, message: String },

    #[error("Failed to recode audio {}: {message}", path.display())]
    AudioRecode { path: PathBuf, message: String },

    #[error("Overlay failed for {}: {message}", video.display())]
    OverlayFailed { video: PathBuf, message: String },

    #[error("{} combinations requested, limit is {limit}", count_label(.found))]
    TooManyCombinations { found: Option<usize>, limit: usize },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn count_label(found: &Option<usize>) -> String {
    found.map_or_else(|| "Too many".to_string(), |n| n.to_string())
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a provisioning failure error.
    pub fn provision_failed(binary: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProvisionFailed {
            binary: binary.into(),
            message: message.into(),
        }
    }

    /// Create a combination failure error.
    pub fn combine_failed(combination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CombineFailed {
            combination: combination.into(),
            message: message.into(),
        }
    }

    /// Create an audio recode error.
    pub fn audio_recode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::AudioRecode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an overlay failure error.
    pub fn overlay_failed(video: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::OverlayFailed {
            video: video.into(),
            message: message.into(),
        }
    }

    /// Errors that stop the run before any media work starts.
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            MediaError::UnsupportedPlatform(_) | MediaError::ProvisionFailed { .. }
        )
    }
}
