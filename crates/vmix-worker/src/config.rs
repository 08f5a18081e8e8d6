//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use vmix_media::{CombineSettings, OverlaySettings, ProvisionConfig};
use vmix_models::DEFAULT_MAX_COMBINATIONS;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root of per-task working storage
    pub work_dir: PathBuf,
    /// Where the encoder comes from
    pub provision: ProvisionConfig,
    /// Maximum simultaneous transfers across all blocks of a job
    pub max_download_parallel: usize,
    /// Maximum simultaneous speech synthesis calls
    pub max_tts_parallel: usize,
    /// Maximum concurrent FFmpeg processes per job
    pub max_ffmpeg_processes: usize,
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Largest video combination product a job may request
    pub max_combinations: usize,
    /// Per-transfer timeout
    pub download_timeout: Duration,
    /// Per-invocation encoder timeout
    pub ffmpeg_timeout: Duration,
    /// Job timeout
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Retries for retryable job failures
    pub max_retries: u32,
    /// First retry delay, doubled per attempt
    pub retry_base_delay: Duration,
    /// How long finished job records stay queryable
    pub job_retention: Duration,
    pub combine: CombineSettings,
    pub overlay: OverlaySettings,
    /// Target of the local uploader when no bucket is configured
    pub upload_dir: PathBuf,
    /// Prometheus listener; metrics are not exported when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/vmix"),
            provision: ProvisionConfig::default(),
            max_download_parallel: 3,
            max_tts_parallel: 3,
            max_ffmpeg_processes: 1, // combinations run one at a time
            max_concurrent_jobs: 1,
            max_combinations: DEFAULT_MAX_COMBINATIONS,
            download_timeout: Duration::from_secs(300),
            ffmpeg_timeout: Duration::from_secs(1800),
            job_timeout: Duration::from_secs(3 * 3600),
            shutdown_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_base_delay: Duration::from_secs(2),
            job_retention: Duration::from_secs(3600),
            combine: CombineSettings::default(),
            overlay: OverlaySettings::default(),
            upload_dir: PathBuf::from("/tmp/vmix-uploads"),
            metrics_addr: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut combine = defaults.combine;
        if let Some(width) = env_parse("VMIX_VIDEO_WIDTH") {
            combine.width = width;
        }
        if let Some(height) = env_parse("VMIX_VIDEO_HEIGHT") {
            combine.height = height;
        }
        if let Some(fps) = env_parse("VMIX_VIDEO_FPS") {
            combine.fps = fps;
        }
        if let Ok(codec) = std::env::var("VMIX_VIDEO_CODEC") {
            combine.video_codec = codec;
        }

        let mut overlay = defaults.overlay;
        if let Some(gain) = env_parse("VMIX_BACKGROUND_GAIN") {
            overlay.background_gain = gain;
        }

        Self {
            work_dir: std::env::var("VMIX_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            provision: ProvisionConfig::from_env(),
            max_download_parallel: env_parse("WORKER_MAX_DOWNLOADS")
                .unwrap_or(defaults.max_download_parallel),
            max_tts_parallel: env_parse("WORKER_MAX_TTS").unwrap_or(defaults.max_tts_parallel),
            max_ffmpeg_processes: env_parse("WORKER_MAX_FFMPEG")
                .unwrap_or(defaults.max_ffmpeg_processes),
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS")
                .unwrap_or(defaults.max_concurrent_jobs),
            max_combinations: env_parse("WORKER_MAX_COMBINATIONS")
                .unwrap_or(defaults.max_combinations),
            download_timeout: env_parse("WORKER_DOWNLOAD_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            ffmpeg_timeout: env_parse("WORKER_FFMPEG_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            job_timeout: env_parse("WORKER_JOB_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            max_retries: env_parse("WORKER_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_base_delay: env_parse("WORKER_RETRY_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
            job_retention: env_parse("WORKER_JOB_RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_retention),
            combine,
            overlay,
            upload_dir: std::env::var("VMIX_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            metrics_addr: env_parse("METRICS_ADDR"),
        }
    }
}
