//! Structured job logging.

use tracing::{error, info, warn, Span};
use vmix_models::JobId;

/// Logs job lifecycle events with the job id, task and stage attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    task_name: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, task_name: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            task_name: task_name.to_string(),
        }
    }

    pub fn log_start(&self, attempt: u32) {
        info!(
            job_id = %self.job_id,
            task_name = %self.task_name,
            attempt,
            "Job started"
        );
    }

    /// Log the transition into a pipeline stage.
    pub fn log_stage(&self, stage: &str, message: &str) {
        info!(
            job_id = %self.job_id,
            task_name = %self.task_name,
            stage,
            "{}", message
        );
    }

    pub fn log_warning(&self, stage: &str, message: &str) {
        warn!(
            job_id = %self.job_id,
            task_name = %self.task_name,
            stage,
            "{}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            task_name = %self.task_name,
            "Job failed: {}", message
        );
    }

    pub fn log_completion(&self, uploaded: usize, failures: usize) {
        info!(
            job_id = %self.job_id,
            task_name = %self.task_name,
            uploaded,
            failures,
            "Job completed"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Span covering one job attempt.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            task_name = %self.task_name
        )
    }
}
