//! Validation errors for incoming job descriptions.

use thiserror::Error;

/// Result type for model validation.
pub type ModelResult<T> = Result<T, ModelError>;

/// Reasons a job description is rejected at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Invalid task name '{name}': {reason}")]
    InvalidTaskName { name: String, reason: String },

    #[error("Invalid block name '{name}': {reason}")]
    InvalidBlockName { name: String, reason: String },

    #[error("Invalid URL in block '{block}': {url}")]
    InvalidUrl { block: String, url: String },

    #[error("Invalid voice line in block '{block}': {reason}")]
    InvalidVoiceLine { block: String, reason: String },

    #[error("Job would produce {} video combinations, limit is {limit}", describe_count(.found))]
    TooManyCombinations { found: Option<usize>, limit: usize },
}

fn describe_count(found: &Option<usize>) -> String {
    match found {
        Some(n) => n.to_string(),
        None => "an unrepresentable number of".to_string(),
    }
}

impl ModelError {
    pub fn invalid_task_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTaskName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_block_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBlockName {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
