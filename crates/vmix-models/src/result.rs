//! Aggregate output of one pipeline run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Local files per block name.
pub type BlockFiles = BTreeMap<String, Vec<PathBuf>>;

/// Stage in which an individual item was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Download,
    Voice,
    Combine,
    OverlaySkipped,
    Overlay,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Download => "download",
            FailureStage::Voice => "voice",
            FailureStage::Combine => "combine",
            FailureStage::OverlaySkipped => "overlay_skipped",
            FailureStage::Overlay => "overlay",
        }
    }
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One item that did not make it through its stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub stage: FailureStage,
    /// URL, voice line, combination label or file name
    pub item: String,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(stage: FailureStage, item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage,
            item: item.into(),
            reason: reason.into(),
        }
    }
}

/// Everything a run produced.
///
/// Paths refer to working storage and are no longer on disk once the run
/// returns; they are kept for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub videos: BlockFiles,
    pub audios: BlockFiles,
    pub voices: BlockFiles,
    pub combined_videos: Vec<PathBuf>,
    #[serde(default)]
    pub finished_videos: Vec<PathBuf>,
    /// Remote names of uploaded files
    pub uploaded_files: Vec<String>,
    #[serde(default)]
    pub failures: Vec<ItemFailure>,
}

impl PipelineResult {
    pub fn record_failure(
        &mut self,
        stage: FailureStage,
        item: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.failures.push(ItemFailure::new(stage, item, reason));
    }

    /// Failures recorded for one stage.
    pub fn failures_in(&self, stage: FailureStage) -> impl Iterator<Item = &ItemFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_filtered_by_stage() {
        let mut result = PipelineResult::default();
        result.record_failure(FailureStage::Download, "https://a/b.mp4", "404");
        result.record_failure(FailureStage::OverlaySkipped, "combo_002.mp4", "bad audio");
        result.record_failure(FailureStage::Download, "https://a/c.mp4", "timeout");

        assert_eq!(result.failures_in(FailureStage::Download).count(), 2);
        assert_eq!(result.failures_in(FailureStage::Overlay).count(), 0);
    }

    #[test]
    fn test_result_json_shape() {
        let mut result = PipelineResult::default();
        result
            .videos
            .insert("block1".into(), vec![PathBuf::from("/w/t/video/block1/a.mp4")]);
        result.uploaded_files.push("combo_001.mp4".into());
        result.record_failure(FailureStage::Combine, "a_x", "exit 1");

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["videos"]["block1"][0], "/w/t/video/block1/a.mp4");
        assert_eq!(value["uploaded_files"][0], "combo_001.mp4");
        assert_eq!(value["failures"][0]["stage"], "combine");
    }
}
