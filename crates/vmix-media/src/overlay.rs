//! Background and voice audio overlay onto combined videos.
//!
//! Each video gets one background and one voice track picked at random from
//! shared pools. Both picks are recoded to a common intermediate format
//! first; a pick that cannot be recoded means the video is skipped rather
//! than failed. The background is looped enough times to cover the video.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe;

/// Audio mixing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlaySettings {
    /// Gain applied to the background track
    pub background_gain: f32,
    /// Codec of the mixed output audio
    pub audio_codec: String,
    pub sample_rate: u32,
    pub channels: u32,
    /// Codec of the recoded intermediate tracks
    pub recode_codec: String,
    /// File extension of the recoded intermediate tracks
    pub recode_extension: String,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            background_gain: 0.2,
            audio_codec: "aac".to_string(),
            sample_rate: 44_100,
            channels: 2,
            recode_codec: "mp3".to_string(),
            recode_extension: "mp3".to_string(),
        }
    }
}

impl OverlaySettings {
    pub fn filter_graph(&self) -> String {
        format!(
            "[1:a]volume={}[a1];[a1][2:a]amix=inputs=2:duration=first[aout]",
            self.background_gain
        )
    }
}

/// Times the background input must loop to cover the video.
///
/// A zero or unknown background duration yields 1.
pub fn loop_count(video_secs: f64, background_secs: f64) -> u32 {
    let usable = |secs: f64| secs.is_finite() && secs > 0.0;
    if !usable(video_secs) || !usable(background_secs) {
        return 1;
    }
    let whole = (video_secs / background_secs).floor();
    if whole >= u32::MAX as f64 {
        return u32::MAX;
    }
    whole as u32 + 1
}

/// Read-only candidate tracks shared by every video of a run.
#[derive(Debug, Clone, Default)]
pub struct AudioPools {
    pub backgrounds: Vec<PathBuf>,
    pub voices: Vec<PathBuf>,
}

impl AudioPools {
    pub fn new(backgrounds: Vec<PathBuf>, voices: Vec<PathBuf>) -> Self {
        Self {
            backgrounds,
            voices,
        }
    }

    /// Whether both pools have at least one candidate.
    pub fn is_usable(&self) -> bool {
        !self.backgrounds.is_empty() && !self.voices.is_empty()
    }

    /// Pick one background and one voice, independently and with replacement.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(PathBuf, PathBuf)> {
        let background = self.backgrounds.choose(rng)?;
        let voice = self.voices.choose(rng)?;
        Some((background.clone(), voice.clone()))
    }
}

/// Result of overlaying one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayOutcome {
    Finished(PathBuf),
    Skipped { reason: String },
}

/// Mixes background and voice audio onto videos.
#[derive(Debug, Clone)]
pub struct AudioOverlay {
    runner: FfmpegRunner,
    settings: OverlaySettings,
    /// Scratch directory for recoded tracks
    tmp_dir: PathBuf,
    /// Directory receiving finished videos
    output_dir: PathBuf,
}

impl AudioOverlay {
    pub fn new(
        runner: FfmpegRunner,
        settings: OverlaySettings,
        tmp_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            settings,
            tmp_dir: tmp_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Overlay randomly picked tracks onto `video`.
    pub async fn overlay(&self, video: &Path, pools: &AudioPools) -> MediaResult<OverlayOutcome> {
        // ThreadRng must not live across an await
        let picked = {
            let mut rng = rand::rng();
            pools.pick(&mut rng)
        };

        match picked {
            Some((background, voice)) => self.overlay_with(video, &background, &voice).await,
            None => Ok(OverlayOutcome::Skipped {
                reason: "no background or voice candidates".to_string(),
            }),
        }
    }

    /// Overlay the given tracks onto `video`.
    pub async fn overlay_with(
        &self,
        video: &Path,
        background: &Path,
        voice: &Path,
    ) -> MediaResult<OverlayOutcome> {
        let video_name = video
            .file_name()
            .ok_or_else(|| MediaError::FileNotFound(video.to_path_buf()))?;
        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        tokio::fs::create_dir_all(&self.tmp_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let recoded_background = match self.recode(background, &format!("bg_{}", stem)).await {
            Ok(path) => path,
            Err(MediaError::Cancelled) => return Err(MediaError::Cancelled),
            Err(e) => return Ok(self.skip(video, e)),
        };
        let recoded_voice = match self.recode(voice, &format!("voice_{}", stem)).await {
            Ok(path) => path,
            Err(MediaError::Cancelled) => return Err(MediaError::Cancelled),
            Err(e) => {
                let _ = tokio::fs::remove_file(&recoded_background).await;
                return Ok(self.skip(video, e));
            }
        };

        let output = self.output_dir.join(video_name);
        let result = self
            .mix(video, &recoded_background, &recoded_voice, &output)
            .await;

        let _ = tokio::fs::remove_file(&recoded_background).await;
        let _ = tokio::fs::remove_file(&recoded_voice).await;

        match result {
            Ok(()) => {
                info!(video = %video.display(), output = %output.display(), "Overlay finished");
                Ok(OverlayOutcome::Finished(output))
            }
            Err(MediaError::Cancelled) => Err(MediaError::Cancelled),
            Err(e) => {
                let _ = tokio::fs::remove_file(&output).await;
                Err(MediaError::overlay_failed(video, e.to_string()))
            }
        }
    }

    /// Recode a track to the intermediate format under `tmp_dir`.
    pub async fn recode(&self, source: &Path, prefix: &str) -> MediaResult<PathBuf> {
        let source_stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "track".to_string());
        let target = self.tmp_dir.join(format!(
            "{}_{}.{}",
            prefix, source_stem, self.settings.recode_extension
        ));

        let cmd = FfmpegCommand::new(&target)
            .input(source)
            .audio_sample_rate(self.settings.sample_rate)
            .audio_channels(self.settings.channels)
            .audio_codec(&self.settings.recode_codec);

        match self.runner.run(&cmd).await {
            Ok(()) => Ok(target),
            Err(MediaError::Cancelled) => Err(MediaError::Cancelled),
            Err(e) => {
                let _ = tokio::fs::remove_file(&target).await;
                Err(MediaError::audio_recode(source, e.to_string()))
            }
        }
    }

    /// Build the single mixing invocation.
    pub fn build_command(
        &self,
        video: &Path,
        background: &Path,
        voice: &Path,
        loops: u32,
        output: &Path,
    ) -> FfmpegCommand {
        FfmpegCommand::new(output)
            .input(video)
            .looped_input(background, loops)
            .input(voice)
            .filter_complex(self.settings.filter_graph())
            .map("0:v")
            .map("[aout]")
            .video_codec("copy")
            .audio_codec(&self.settings.audio_codec)
            .audio_sample_rate(self.settings.sample_rate)
            .audio_channels(self.settings.channels)
            .shortest()
    }

    async fn mix(
        &self,
        video: &Path,
        background: &Path,
        voice: &Path,
        output: &Path,
    ) -> MediaResult<()> {
        let video_secs = probe::media_duration(&self.runner, video).await?;
        let background_secs = probe::media_duration(&self.runner, background).await?;
        let loops = loop_count(video_secs, background_secs);
        debug!(
            video = %video.display(),
            video_secs,
            background_secs,
            loops,
            "Mixing audio"
        );

        let cmd = self.build_command(video, background, voice, loops, output);
        self.runner
            .run_with_progress(&cmd, move |progress| {
                debug!(percent = progress.percentage(video_secs), "Overlay progress");
            })
            .await
    }

    fn skip(&self, video: &Path, error: MediaError) -> OverlayOutcome {
        warn!(video = %video.display(), error = %error, "Skipping video, audio could not be recoded");
        OverlayOutcome::Skipped {
            reason: error.to_string(),
        }
    }
}
