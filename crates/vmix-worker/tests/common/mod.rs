//! Fakes shared by the worker integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use vmix_media::{BinaryProvisioner, ProvisionConfig};
use vmix_models::{JobDescription, VoiceLine};
use vmix_storage::{LocalUploader, StorageError, StorageResult, Uploader};
use vmix_tts::{SpeechSynthesizer, TtsError, TtsResult};
use vmix_worker::{MediaPipeline, Transport, WorkerConfig, WorkerError, WorkerResult};

/// Shell script standing in for ffmpeg.
///
/// Arguments containing `corrupt` fail, arguments containing `slow` hang,
/// `-i <file>` alone reports a 10 second duration, anything else creates
/// its last argument.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let log = dir.join("ffmpeg.log");
    let script = format!(
        r#"#!/bin/sh
echo "$*" >> "{log}"
for arg in "$@"; do
  case "$arg" in
    *corrupt*) echo "$arg: Invalid data found when processing input" >&2; exit 1 ;;
    *slow*) exec sleep 5 ;;
  esac
done
if [ "$#" -eq 2 ] && [ "$1" = "-i" ]; then
  echo "  Duration: 00:00:10.00, start: 0.000000, bitrate: 128 kb/s" >&2
  exit 1
fi
for arg in "$@"; do last="$arg"; done
echo "progress=end" >&2
: > "$last"
exit 0
"#,
        log = log.display()
    );

    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join("ffmpeg");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Writes the URL into the destination; URLs containing `missing` 404.
#[derive(Default)]
pub struct FixtureTransport {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn fetch(&self, url: &str, dest: &Path) -> WorkerResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.contains("missing") {
            return Err(WorkerError::download(url, "HTTP 404 Not Found"));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, url.as_bytes()).await?;
        Ok(url.len() as u64)
    }
}

/// Tracks how many fetches are in flight at once.
pub struct PeakTransport {
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
    hold: Duration,
}

impl PeakTransport {
    pub fn new(hold: Duration) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            hold,
        }
    }
}

#[async_trait]
impl Transport for PeakTransport {
    async fn fetch(&self, url: &str, dest: &Path) -> WorkerResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        FixtureTransport::default().fetch(url, dest).await
    }
}

/// Panics on every fetch.
pub struct PanickingTransport;

#[async_trait]
impl Transport for PanickingTransport {
    async fn fetch(&self, url: &str, _dest: &Path) -> WorkerResult<u64> {
        panic!("transport exploded on {url}");
    }
}

/// Speaks every voice except `Ghost`.
pub struct EchoSynthesizer;

#[async_trait]
impl SpeechSynthesizer for EchoSynthesizer {
    async fn synthesize(&self, text: &str, voice_name: &str) -> TtsResult<Vec<u8>> {
        if voice_name == "Ghost" {
            return Err(TtsError::VoiceNotFound(voice_name.to_string()));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Delegates to a local uploader and counts calls.
pub struct CountingUploader {
    inner: LocalUploader,
    pub calls: AtomicUsize,
}

impl CountingUploader {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalUploader::new(root, "video_generator"),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Uploader for CountingUploader {
    async fn upload_all(&self, local_folder: &Path, project: &str) -> StorageResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.upload_all(local_folder, project).await
    }
}

/// Fails the first `failures` calls with a retryable error.
pub struct FlakyUploader {
    failures: usize,
    pub calls: AtomicUsize,
}

impl FlakyUploader {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Uploader for FlakyUploader {
    async fn upload_all(&self, local_folder: &Path, _project: &str) -> StorageResult<Vec<String>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(StorageError::upload_failed("combo_001.mp4", "connection reset"));
        }
        Ok(vmix_media::fs_utils::list_files(local_folder)
            .await
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect())
    }
}

/// Scratch directories plus a config pointing into them.
pub struct Harness {
    pub dir: TempDir,
    pub config: WorkerConfig,
}

impl Harness {
    #[cfg(unix)]
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let bin_dir = dir.path().join("bin");
        fake_ffmpeg(&bin_dir);

        let config = WorkerConfig {
            work_dir: dir.path().join("work"),
            provision: ProvisionConfig {
                bin_dir,
                ..Default::default()
            },
            ffmpeg_timeout: Duration::from_secs(10),
            job_timeout: Duration::from_secs(30),
            retry_base_delay: Duration::from_millis(10),
            upload_dir: dir.path().join("remote"),
            ..Default::default()
        };
        Self { dir, config }
    }

    pub fn remote(&self) -> PathBuf {
        self.config.upload_dir.clone()
    }

    pub fn task_dir(&self, task: &str) -> PathBuf {
        self.config.work_dir.join(task)
    }

    pub fn pipeline(&self, uploader: Arc<dyn Uploader>) -> MediaPipeline {
        self.pipeline_with(Arc::new(FixtureTransport::default()), uploader)
    }

    pub fn pipeline_with(
        &self,
        transport: Arc<dyn Transport>,
        uploader: Arc<dyn Uploader>,
    ) -> MediaPipeline {
        let provisioner = BinaryProvisioner::new(self.config.provision.clone()).unwrap();
        MediaPipeline::new(
            self.config.clone(),
            Arc::new(provisioner),
            transport,
            Arc::new(EchoSynthesizer),
            uploader,
        )
    }
}

/// Eight video blocks of 300 clips each; the product overflows `usize`.
pub fn oversized_job(task: &str) -> JobDescription {
    let urls: Vec<String> = (0..300)
        .map(|i| format!("https://cdn.test/clips/{i}.mp4"))
        .collect();
    (0..8).fold(JobDescription::new(task), |job, b| {
        job.with_video_block(format!("block{b}"), urls.clone())
    })
}

/// Two video blocks, one audio block and one voice block.
pub fn sample_job(task: &str) -> JobDescription {
    JobDescription::new(task)
        .with_video_block(
            "intro",
            ["https://cdn.test/intro/a.mp4", "https://cdn.test/intro/b.mp4"],
        )
        .with_video_block("outro", ["https://cdn.test/outro/x.mp4"])
        .with_audio_block("music", ["https://cdn.test/music/bg.mp3"])
        .with_voice_block("lines", vec![VoiceLine::new("Welcome back", "Rachel")])
}
