//! Job status tracking for submitted jobs.
//!
//! Records live only in process memory for as long as the executor runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::result::PipelineResult;

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job accepted and waiting for a free slot
    #[default]
    Queued,
    /// Pipeline is running
    Started,
    /// Pipeline finished
    Success,
    /// Pipeline failed and will not be retried
    Failure,
    /// Pipeline failed with a retryable error and is waiting to run again
    Retry,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
            JobStatus::Retry => "retry",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of a job as seen by status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub task_name: String,
    pub status: JobStatus,
    /// Aggregate result, present once the job succeeded
    pub result: Option<PipelineResult>,
    /// Last error message, if any attempt failed
    pub error: Option<String>,
    /// Number of pipeline attempts started so far
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a queued record.
    pub fn new(job_id: JobId, task_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            task_name: task_name.into(),
            status: JobStatus::Queued,
            result: None,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark the start of a new attempt.
    pub fn start_attempt(&mut self) {
        let now = Utc::now();
        self.status = JobStatus::Started;
        self.attempts += 1;
        self.started_at.get_or_insert(now);
        self.updated_at = now;
    }

    /// Mark a failed attempt that will be retried.
    pub fn mark_retry(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Retry;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Mark the job as succeeded with its result.
    pub fn complete(&mut self, result: PipelineResult) {
        let now = Utc::now();
        self.status = JobStatus::Success;
        self.result = Some(result);
        self.error = None;
        self.updated_at = now;
        self.finished_at = Some(now);
    }

    /// Mark the job as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.status = JobStatus::Failure;
        self.error = Some(error.into());
        self.updated_at = now;
        self.finished_at = Some(now);
    }
}
