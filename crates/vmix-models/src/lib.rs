//! Shared data models for the vmix media pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job descriptions (video, audio and voice-line blocks) and their validation
//! - Job ids, statuses and records reported by the executor
//! - Pipeline results with per-item diagnostics

pub mod error;
pub mod job;
pub mod job_status;
pub mod result;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use job::{
    FlattenedLinks, JobDescription, JobId, VoiceLine, DEFAULT_MAX_COMBINATIONS, MAX_TASK_NAME_LEN,
};
pub use job_status::{JobRecord, JobStatus};
pub use result::{BlockFiles, FailureStage, ItemFailure, PipelineResult};
