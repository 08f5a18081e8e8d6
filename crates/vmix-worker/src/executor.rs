//! In-process job executor: submission, status and retries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tracing::{info, Instrument};
use vmix_models::{JobDescription, JobId, JobRecord, JobStatus, PipelineResult};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::MediaPipeline;
use crate::retry::{retry_async, RetryConfig};

type RecordSender = Arc<watch::Sender<JobRecord>>;

/// Runs submitted jobs on background tasks, bounded by `max_concurrent_jobs`.
pub struct JobExecutor {
    pipeline: Arc<MediaPipeline>,
    retry: RetryConfig,
    max_concurrent_jobs: usize,
    max_combinations: usize,
    shutdown_timeout: Duration,
    job_retention: Duration,
    job_semaphore: Arc<Semaphore>,
    jobs: Arc<RwLock<HashMap<JobId, RecordSender>>>,
    /// Task names with a job that has not reached a terminal status
    active_tasks: Arc<Mutex<HashSet<String>>>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(pipeline: Arc<MediaPipeline>, config: &WorkerConfig) -> Self {
        let max_concurrent_jobs = config.max_concurrent_jobs.max(1);
        let (shutdown, _) = watch::channel(false);

        Self {
            pipeline,
            retry: RetryConfig::new(config.max_retries, config.retry_base_delay),
            max_concurrent_jobs,
            max_combinations: config.max_combinations,
            shutdown_timeout: config.shutdown_timeout,
            job_retention: config.job_retention,
            job_semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            active_tasks: Arc::new(Mutex::new(HashSet::new())),
            shutdown,
        }
    }

    /// Validate and enqueue a job, returning its id.
    ///
    /// A task name may only have one active job at a time, since it names
    /// the job's working storage.
    pub async fn submit(&self, job: JobDescription) -> WorkerResult<JobId> {
        job.validate()?;
        job.check_combination_limit(self.max_combinations)?;

        if *self.shutdown.borrow() {
            return Err(WorkerError::Cancelled);
        }

        if !self.active_tasks.lock().await.insert(job.task_name.clone()) {
            return Err(WorkerError::TaskActive(job.task_name));
        }

        let job_id = JobId::new();
        let (tx, _) = watch::channel(JobRecord::new(job_id.clone(), &job.task_name));
        let tx = Arc::new(tx);
        self.prune_finished().await;
        self.jobs.write().await.insert(job_id.clone(), Arc::clone(&tx));

        metrics::record_job_submitted();
        info!(job_id = %job_id, task_name = %job.task_name, items = job.item_count(), "Job queued");

        let ctx = Arc::new(JobContext {
            pipeline: Arc::clone(&self.pipeline),
            retry: self.retry.clone(),
            active_tasks: Arc::clone(&self.active_tasks),
            cancel: self.shutdown.subscribe(),
            record: tx,
        });
        let job = Arc::new(job);
        let semaphore = Arc::clone(&self.job_semaphore);
        let max_jobs = self.max_concurrent_jobs;
        let id = job_id.clone();

        tokio::spawn(async move {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    ctx.finish(&job.task_name, Err(WorkerError::Cancelled), 0.0).await;
                    return;
                }
            };
            metrics::set_active_jobs(max_jobs - semaphore.available_permits());

            let started = Instant::now();
            let body = {
                let ctx = Arc::clone(&ctx);
                let job = Arc::clone(&job);
                tokio::spawn(async move { ctx.run(&id, &job).await })
            };
            // A panic in the pipeline still has to publish a terminal record
            let outcome = body.await.unwrap_or_else(|e| Err(WorkerError::from(e)));
            ctx.finish(&job.task_name, outcome, started.elapsed().as_secs_f64())
                .await;

            drop(permit);
            metrics::set_active_jobs(max_jobs - semaphore.available_permits());
        });

        Ok(job_id)
    }

    /// Current record of a job.
    pub async fn status(&self, job_id: &JobId) -> Option<JobRecord> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|tx| tx.borrow().clone())
    }

    /// Wait until a job reaches a terminal status.
    pub async fn wait(&self, job_id: &JobId) -> WorkerResult<JobRecord> {
        let mut rx = self
            .jobs
            .read()
            .await
            .get(job_id)
            .map(|tx| tx.subscribe())
            .ok_or_else(|| WorkerError::JobNotFound(job_id.to_string()))?;

        let record = rx
            .wait_for(|record| record.is_terminal())
            .await
            .map_err(|_| WorkerError::JobNotFound(job_id.to_string()))?
            .clone();
        Ok(record)
    }

    /// Signal shutdown; running jobs are cancelled and new ones rejected.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal shutdown and wait for running jobs to settle.
    pub async fn shutdown_and_wait(&self) {
        self.shutdown();
        if tokio::time::timeout(self.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            info!("Shutdown timeout reached with jobs still running");
        }
    }

    /// Drop terminal records older than the retention window.
    async fn prune_finished(&self) {
        let now = Utc::now();
        let retention = self.job_retention;
        self.jobs.write().await.retain(|_, tx| {
            let record = tx.borrow();
            let expired = record.is_terminal()
                && record
                    .finished_at
                    .and_then(|at| (now - at).to_std().ok())
                    .is_some_and(|age| age >= retention);
            !expired
        });
    }

    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Everything a spawned job needs.
struct JobContext {
    pipeline: Arc<MediaPipeline>,
    retry: RetryConfig,
    active_tasks: Arc<Mutex<HashSet<String>>>,
    cancel: watch::Receiver<bool>,
    record: RecordSender,
}

impl JobContext {
    async fn run(&self, job_id: &JobId, job: &JobDescription) -> WorkerResult<PipelineResult> {
        if *self.cancel.borrow() {
            return Err(WorkerError::Cancelled);
        }

        let logger = JobLogger::new(job_id, &job.task_name);
        let logger = &logger;
        let pipeline = &*self.pipeline;
        let record = &*self.record;
        let cancel = &self.cancel;

        let outcome = retry_async(
            &self.retry,
            move |attempt| {
                record.send_modify(|r| r.start_attempt());
                logger.log_start(attempt);
                pipeline
                    .run(job_id, job, cancel.clone())
                    .instrument(logger.create_span())
            },
            WorkerError::is_retryable,
            move |attempt, error, delay| {
                record.send_modify(|r| r.mark_retry(error.to_string()));
                logger.log_warning(
                    "retry",
                    &format!("Attempt {} failed, retrying in {:?}: {}", attempt, delay, error),
                );
            },
        )
        .await;

        match &outcome {
            Ok(result) => logger.log_completion(result.uploaded_files.len(), result.failures.len()),
            Err(e) => logger.log_error(&e.to_string()),
        }
        outcome
    }

    /// Release the task name, then publish the terminal record.
    async fn finish(
        &self,
        task_name: &str,
        outcome: WorkerResult<PipelineResult>,
        duration_secs: f64,
    ) {
        self.active_tasks.lock().await.remove(task_name);

        let status = match outcome {
            Ok(result) => {
                self.record.send_modify(move |r| r.complete(result));
                JobStatus::Success
            }
            Err(e) => {
                self.record.send_modify(move |r| r.fail(e.to_string()));
                JobStatus::Failure
            }
        };
        metrics::record_job_finished(status.as_str(), duration_secs);
    }
}
