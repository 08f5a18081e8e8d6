//! Scale-and-concatenate of one combination into a raw combined video.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::combination::{self, Combination};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Normalization applied to every input clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Pixel aspect ratio passed to `setsar`
    pub sar: String,
    pub video_codec: String,
    pub overwrite: bool,
}

impl Default for CombineSettings {
    fn default() -> Self {
        Self {
            width: 270,
            height: 480,
            fps: 10,
            sar: "1".to_string(),
            video_codec: "libx264".to_string(),
            overwrite: true,
        }
    }
}

impl CombineSettings {
    /// Filter graph that normalizes `inputs` streams and concatenates them.
    pub fn filter_graph(&self, inputs: usize) -> String {
        let mut graph = String::new();
        for i in 0..inputs {
            graph.push_str(&format!(
                "[{i}:v]scale={w}:{h},fps={fps},setsar={sar}[v{i}];",
                w = self.width,
                h = self.height,
                fps = self.fps,
                sar = self.sar,
            ));
        }
        for i in 0..inputs {
            graph.push_str(&format!("[v{i}]"));
        }
        graph.push_str(&format!("concat=n={inputs}:v=1:a=0[outv]"));
        graph
    }
}

/// Runs one encoder invocation per combination.
#[derive(Debug, Clone)]
pub struct VideoCombiner {
    runner: FfmpegRunner,
    settings: CombineSettings,
}

impl VideoCombiner {
    pub fn new(runner: FfmpegRunner, settings: CombineSettings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> &CombineSettings {
        &self.settings
    }

    /// Build the concat command for a combination.
    pub fn build_command(&self, combination: &Combination, output: &Path) -> FfmpegCommand {
        let cmd = combination
            .files
            .iter()
            .fold(FfmpegCommand::new(output), |cmd, file| cmd.input(file));

        cmd.filter_complex(self.settings.filter_graph(combination.len()))
            .map("[outv]")
            .video_codec(&self.settings.video_codec)
            .overwrite(self.settings.overwrite)
    }

    /// Combine into `output`.
    pub async fn combine(&self, combination: &Combination, output: &Path) -> MediaResult<PathBuf> {
        if combination.is_empty() {
            return Err(MediaError::combine_failed(
                combination.file_name(),
                "combination has no inputs",
            ));
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cmd = self.build_command(combination, output);
        debug!(
            combination = %combination.file_name(),
            label = %combination.label(),
            "Combining {} clips",
            combination.len()
        );

        match self.runner.run(&cmd).await {
            Ok(()) => {
                info!(
                    combination = %combination.file_name(),
                    label = %combination.label(),
                    "Combined video written"
                );
                Ok(output.to_path_buf())
            }
            Err(MediaError::Cancelled) => Err(MediaError::Cancelled),
            Err(e) => {
                warn!(
                    combination = %combination.file_name(),
                    label = %combination.label(),
                    error = %e,
                    "Combination failed"
                );
                let _ = tokio::fs::remove_file(output).await;
                Err(MediaError::combine_failed(combination.file_name(), e.to_string()))
            }
        }
    }

    /// Combine into `dir/<combination file name>`.
    pub async fn combine_into(&self, combination: &Combination, dir: &Path) -> MediaResult<PathBuf> {
        self.combine(combination, &combination::output_path(dir, combination))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combination::enumerate;
    use std::collections::BTreeMap;

    #[test]
    fn test_filter_graph_for_three_inputs() {
        let graph = CombineSettings::default().filter_graph(3);
        assert_eq!(
            graph,
            "[0:v]scale=270:480,fps=10,setsar=1[v0];\
             [1:v]scale=270:480,fps=10,setsar=1[v1];\
             [2:v]scale=270:480,fps=10,setsar=1[v2];\
             [v0][v1][v2]concat=n=3:v=1:a=0[outv]"
        );
    }

    #[test]
    fn test_build_command() {
        let mut blocks = BTreeMap::new();
        blocks.insert("b1".to_string(), vec![PathBuf::from("/w/video/b1/a.mp4")]);
        blocks.insert("b2".to_string(), vec![PathBuf::from("/w/video/b2/x.mp4")]);
        let combo = &enumerate(&blocks, 10).unwrap()[0];

        let combiner = VideoCombiner::new(FfmpegRunner::new("ffmpeg"), CombineSettings::default());
        let args = combiner
            .build_command(combo, Path::new("/w/raw/combo_001.mp4"))
            .build_args();

        let tail: Vec<&str> = args.iter().map(String::as_str).skip(5).collect();
        assert_eq!(
            tail,
            vec![
                "-i",
                "/w/video/b1/a.mp4",
                "-i",
                "/w/video/b2/x.mp4",
                "-filter_complex",
                "[0:v]scale=270:480,fps=10,setsar=1[v0];[1:v]scale=270:480,fps=10,setsar=1[v1];[v0][v1]concat=n=2:v=1:a=0[outv]",
                "-map",
                "[outv]",
                "-c:v",
                "libx264",
                "/w/raw/combo_001.mp4",
            ]
        );
        assert_eq!(args[0], "-y");
    }
}
