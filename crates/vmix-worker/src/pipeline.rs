//! Pipeline orchestrator: fetch, combine, overlay, upload, clean up.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::warn;
use vmix_media::fs_utils::remove_dir_if_exists;
use vmix_media::{
    enumerate, AudioOverlay, AudioPools, BinaryProvisioner, FfmpegRunner, MediaError,
    OverlayOutcome, VideoCombiner, FFMPEG,
};
use vmix_models::{BlockFiles, FailureStage, JobDescription, JobId, PipelineResult};
use vmix_storage::Uploader;
use vmix_tts::SpeechSynthesizer;

use crate::config::WorkerConfig;
use crate::download::{BoundedDownloader, Transport};
use crate::error::{WorkerError, WorkerResult};
use crate::layout::WorkspaceLayout;
use crate::logging::JobLogger;
use crate::metrics;
use crate::voices::VoiceGenerator;

/// Removes the task directory if the run is dropped before cleanup.
struct CleanupGuard {
    path: PathBuf,
    armed: bool,
}

impl CleanupGuard {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove working storage");
            }
        }
    }
}

/// Resolves once `rx` reports `true`; never if the sender goes away.
async fn cancelled(mut rx: watch::Receiver<bool>) {
    let sender_gone = rx.wait_for(|stop| *stop).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}

fn all_files(blocks: &BlockFiles) -> Vec<PathBuf> {
    blocks.values().flatten().cloned().collect()
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Runs one job end to end against injected collaborators.
pub struct MediaPipeline {
    config: WorkerConfig,
    provisioner: Arc<BinaryProvisioner>,
    transport: Arc<dyn Transport>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    uploader: Arc<dyn Uploader>,
}

impl MediaPipeline {
    pub fn new(
        config: WorkerConfig,
        provisioner: Arc<BinaryProvisioner>,
        transport: Arc<dyn Transport>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        Self {
            config,
            provisioner,
            transport,
            synthesizer,
            uploader,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run every stage for `job`.
    ///
    /// The task's working storage is removed before this returns, whatever
    /// the outcome, and also when the returned future is dropped early.
    pub async fn run(
        &self,
        job_id: &JobId,
        job: &JobDescription,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<PipelineResult> {
        let logger = JobLogger::new(job_id, &job.task_name);
        let layout = WorkspaceLayout::new(&self.config.work_dir, &job.task_name);
        let mut guard = CleanupGuard::new(layout.task_root());

        let stages = self.run_stages(&logger, job, &layout, cancel.clone());
        let outcome = tokio::select! {
            result = tokio::time::timeout(self.config.job_timeout, stages) => {
                result.unwrap_or_else(|_| Err(WorkerError::Timeout(self.config.job_timeout.as_secs())))
            }
            _ = cancelled(cancel) => Err(WorkerError::Cancelled),
        };

        logger.log_stage("cleanup", "Removing working storage");
        match remove_dir_if_exists(layout.task_root()).await {
            Ok(_) => guard.disarm(),
            Err(e) => logger.log_warning("cleanup", &format!("Cleanup failed: {}", e)),
        }

        match outcome {
            Err(WorkerError::Media(MediaError::Cancelled)) => Err(WorkerError::Cancelled),
            other => other,
        }
    }

    async fn run_stages(
        &self,
        logger: &JobLogger,
        job: &JobDescription,
        layout: &WorkspaceLayout,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<PipelineResult> {
        job.check_combination_limit(self.config.max_combinations)?;

        logger.log_stage("provision", "Ensuring encoder binary");
        let ffmpeg = self.provisioner.ensure(FFMPEG).await?;
        let runner = FfmpegRunner::new(ffmpeg)
            .with_timeout(self.config.ffmpeg_timeout)
            .with_cancel(cancel);

        tokio::fs::create_dir_all(layout.task_root()).await?;
        let mut result = PipelineResult::default();

        self.fetch(logger, job, layout, &mut result).await;

        if !self.combine(logger, layout, &runner, &mut result).await? {
            return Ok(result);
        }

        self.overlay(logger, layout, runner, &mut result).await?;

        logger.log_stage("upload", "Uploading finished videos");
        let done = layout.done_dir();
        tokio::fs::create_dir_all(&done).await?;
        result.uploaded_files = self.uploader.upload_all(&done, &job.task_name).await?;
        metrics::record_uploaded_files(result.uploaded_files.len());

        Ok(result)
    }

    /// Download videos and audios and generate voices concurrently.
    async fn fetch(
        &self,
        logger: &JobLogger,
        job: &JobDescription,
        layout: &WorkspaceLayout,
        result: &mut PipelineResult,
    ) {
        let links = job.flattened_links();
        logger.log_stage(
            "fetch",
            &format!(
                "Fetching {} videos, {} audios and {} voice lines",
                links.videos.len(),
                links.audios.len(),
                links.voices.len()
            ),
        );

        // Videos and audios share one limiter
        let downloader =
            BoundedDownloader::new(self.transport.clone(), self.config.max_download_parallel);
        let generator = VoiceGenerator::new(self.synthesizer.clone(), self.config.max_tts_parallel);

        let video_dir = layout.videos();
        let audio_dir = layout.audios();
        let voice_dir = layout.voices();
        let (videos, audios, voices) = tokio::join!(
            downloader.fetch_blocks(&job.video_blocks, &video_dir),
            downloader.fetch_blocks(&job.audio_blocks, &audio_dir),
            generator.generate_blocks(&job.voice_blocks, &voice_dir),
        );

        result.videos = videos.files;
        result.audios = audios.files;
        result.voices = voices.files;
        result.failures.extend(videos.failures);
        result.failures.extend(audios.failures);
        result.failures.extend(voices.failures);
    }

    /// Combine every cross-block combination. Returns whether anything was produced.
    async fn combine(
        &self,
        logger: &JobLogger,
        layout: &WorkspaceLayout,
        runner: &FfmpegRunner,
        result: &mut PipelineResult,
    ) -> WorkerResult<bool> {
        let combinations = enumerate(&result.videos, self.config.max_combinations)?;
        if combinations.is_empty() {
            logger.log_stage("combine", "Nothing to combine, skipping overlay and upload");
            return Ok(false);
        }

        logger.log_stage(
            "combine",
            &format!("Combining {} combinations", combinations.len()),
        );

        let combiner = VideoCombiner::new(runner.clone(), self.config.combine.clone());
        let combiner = &combiner;
        let combined_dir = layout.combined_dir();
        let combined_dir = &combined_dir;

        let outcomes: Vec<_> = stream::iter(combinations)
            .map(|combination| async move {
                let outcome = combiner.combine_into(&combination, combined_dir).await;
                (combination, outcome)
            })
            .buffered(self.config.max_ffmpeg_processes.max(1))
            .collect()
            .await;

        for (combination, outcome) in outcomes {
            match outcome {
                Ok(path) => {
                    metrics::record_combination(true);
                    result.combined_videos.push(path);
                }
                Err(MediaError::Cancelled) => return Err(WorkerError::Cancelled),
                Err(e) => {
                    metrics::record_combination(false);
                    result.record_failure(
                        FailureStage::Combine,
                        format!("{} ({})", combination.file_name(), combination.label()),
                        e.to_string(),
                    );
                }
            }
        }

        if result.combined_videos.is_empty() {
            logger.log_warning("combine", "Every combination failed, skipping overlay and upload");
            return Ok(false);
        }
        Ok(true)
    }

    /// Mix background and voice audio onto each combined video, one at a time.
    async fn overlay(
        &self,
        logger: &JobLogger,
        layout: &WorkspaceLayout,
        runner: FfmpegRunner,
        result: &mut PipelineResult,
    ) -> WorkerResult<()> {
        let pools = AudioPools::new(all_files(&result.audios), all_files(&result.voices));
        if !pools.is_usable() {
            logger.log_warning(
                "overlay",
                "No background or voice candidates, overlay produces no output",
            );
        }

        let overlay = AudioOverlay::new(
            runner,
            self.config.overlay.clone(),
            layout.tmp_audio_dir(),
            layout.done_dir(),
        );

        logger.log_stage(
            "overlay",
            &format!("Overlaying {} videos", result.combined_videos.len()),
        );
        for video in result.combined_videos.clone() {
            match overlay.overlay(&video, &pools).await {
                Ok(OverlayOutcome::Finished(path)) => {
                    metrics::record_overlay("finished");
                    result.finished_videos.push(path);
                }
                Ok(OverlayOutcome::Skipped { reason }) => {
                    metrics::record_overlay("skipped");
                    result.record_failure(FailureStage::OverlaySkipped, file_label(&video), reason);
                }
                Err(MediaError::Cancelled) => return Err(WorkerError::Cancelled),
                Err(e) => {
                    metrics::record_overlay("error");
                    logger.log_warning("overlay", &e.to_string());
                    result.record_failure(FailureStage::Overlay, file_label(&video), e.to_string());
                }
            }
        }
        Ok(())
    }
}
