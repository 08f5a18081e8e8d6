//! Job descriptions accepted by the pipeline.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};

/// Maximum length of a task name (it becomes a directory name).
pub const MAX_TASK_NAME_LEN: usize = 128;

/// Default ceiling on the number of video combinations one job may request.
pub const DEFAULT_MAX_COMBINATIONS: usize = 1000;

/// Unique identifier for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One line of text to be spoken by a named voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VoiceLine {
    /// Text to synthesize
    pub text: String,
    /// Display name of the voice (matched case-insensitively)
    pub voice: String,
}

impl VoiceLine {
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
        }
    }
}

/// A batch composition job.
///
/// Block maps are ordered by name, which is also the order used when
/// enumerating video combinations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobDescription {
    /// Task name, used as the root of all working paths
    pub task_name: String,

    /// Video URLs grouped by block name
    #[serde(default)]
    pub video_blocks: BTreeMap<String, Vec<String>>,

    /// Background audio URLs grouped by block name
    #[serde(default)]
    pub audio_blocks: BTreeMap<String, Vec<String>>,

    /// Voice lines grouped by block name
    #[serde(default)]
    pub voice_blocks: BTreeMap<String, Vec<VoiceLine>>,

    /// Passthrough metadata that the pipeline does not interpret
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Flat view over all links of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenedLinks {
    pub videos: Vec<String>,
    pub audios: Vec<String>,
    pub voices: Vec<VoiceLine>,
}

impl JobDescription {
    /// Create an empty job for a task.
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            video_blocks: BTreeMap::new(),
            audio_blocks: BTreeMap::new(),
            voice_blocks: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Add a video block.
    pub fn with_video_block<I, S>(mut self, name: impl Into<String>, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.video_blocks
            .insert(name.into(), urls.into_iter().map(Into::into).collect());
        self
    }

    /// Add an audio block.
    pub fn with_audio_block<I, S>(mut self, name: impl Into<String>, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audio_blocks
            .insert(name.into(), urls.into_iter().map(Into::into).collect());
        self
    }

    /// Add a voice block.
    pub fn with_voice_block(mut self, name: impl Into<String>, lines: Vec<VoiceLine>) -> Self {
        self.voice_blocks.insert(name.into(), lines);
        self
    }

    /// Collect every link of the job into three flat lists, in block order.
    pub fn flattened_links(&self) -> FlattenedLinks {
        FlattenedLinks {
            videos: self.video_blocks.values().flatten().cloned().collect(),
            audios: self.audio_blocks.values().flatten().cloned().collect(),
            voices: self.voice_blocks.values().flatten().cloned().collect(),
        }
    }

    /// Number of video combinations the job requests, `None` on overflow.
    ///
    /// Every block contributes its URL count; downloads can only shrink it.
    pub fn combination_count(&self) -> Option<usize> {
        if self.video_blocks.is_empty() || self.video_blocks.values().any(Vec::is_empty) {
            return Some(0);
        }
        self.video_blocks
            .values()
            .try_fold(1usize, |acc, urls| acc.checked_mul(urls.len()))
    }

    /// Refuse jobs whose combination product exceeds `limit`.
    pub fn check_combination_limit(&self, limit: usize) -> ModelResult<()> {
        match self.combination_count() {
            Some(n) if n <= limit => Ok(()),
            found => Err(ModelError::TooManyCombinations { found, limit }),
        }
    }

    /// Total number of items across all blocks.
    pub fn item_count(&self) -> usize {
        self.video_blocks.values().map(Vec::len).sum::<usize>()
            + self.audio_blocks.values().map(Vec::len).sum::<usize>()
            + self.voice_blocks.values().map(Vec::len).sum::<usize>()
    }

    /// Validate the job before it reaches the pipeline.
    pub fn validate(&self) -> ModelResult<()> {
        validate_task_name(&self.task_name)?;

        for (block, urls) in self.video_blocks.iter().chain(self.audio_blocks.iter()) {
            validate_block_name(block)?;
            for raw in urls {
                if !is_http_url(raw) {
                    return Err(ModelError::InvalidUrl {
                        block: block.clone(),
                        url: raw.clone(),
                    });
                }
            }
        }

        for (block, lines) in &self.voice_blocks {
            validate_block_name(block)?;
            for line in lines {
                if line.text.trim().is_empty() {
                    return Err(ModelError::InvalidVoiceLine {
                        block: block.clone(),
                        reason: "text is empty".to_string(),
                    });
                }
                if line.voice.trim().is_empty() {
                    return Err(ModelError::InvalidVoiceLine {
                        block: block.clone(),
                        reason: "voice name is empty".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

fn validate_task_name(name: &str) -> ModelResult<()> {
    if name.is_empty() {
        return Err(ModelError::invalid_task_name(name, "must not be empty"));
    }
    if name.len() > MAX_TASK_NAME_LEN {
        return Err(ModelError::invalid_task_name(
            name,
            format!("longer than {} characters", MAX_TASK_NAME_LEN),
        ));
    }
    if !is_path_safe(name) {
        return Err(ModelError::invalid_task_name(
            name,
            "only ASCII letters, digits, '.', '_' and '-' are allowed",
        ));
    }
    Ok(())
}

fn validate_block_name(name: &str) -> ModelResult<()> {
    if name.is_empty() {
        return Err(ModelError::invalid_block_name(name, "must not be empty"));
    }
    if !is_path_safe(name) {
        return Err(ModelError::invalid_block_name(
            name,
            "only ASCII letters, digits, '.', '_' and '-' are allowed",
        ));
    }
    Ok(())
}

/// Names become directory components, so `.`/`..` and separators are refused.
fn is_path_safe(name: &str) -> bool {
    name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
        .unwrap_or(false)
}
