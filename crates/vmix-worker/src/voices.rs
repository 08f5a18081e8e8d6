//! Voice-line generation stage.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use vmix_models::{FailureStage, ItemFailure, VoiceLine};
use vmix_tts::SpeechSynthesizer;

use crate::download::StageReport;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// File name for a synthesized line: `tts_<voice>_<YYYYmmdd_HHMMSS>_<4 hex>.mp3`.
pub fn voice_file_name(voice: &str) -> String {
    let voice: String = voice
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "tts_{}_{}_{}.mp3",
        voice,
        Utc::now().format("%Y%m%d_%H%M%S"),
        &suffix[..4]
    )
}

/// Fresh names tried before giving up on a directory.
const NAME_ATTEMPTS: usize = 16;

/// Write `bytes` to a file in `dir` that did not exist before.
///
/// Names come from `next_name`; one that is already taken is skipped.
pub async fn write_unique(
    dir: &Path,
    bytes: &[u8],
    mut next_name: impl FnMut() -> String,
) -> WorkerResult<PathBuf> {
    for _ in 0..NAME_ATTEMPTS {
        let path = dir.join(next_name());
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes).await?;
        file.flush().await?;
        return Ok(path);
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free file name in {}", dir.display()),
    )
    .into())
}

/// Synthesizes voice lines with bounded concurrency.
#[derive(Clone)]
pub struct VoiceGenerator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    limiter: Arc<Semaphore>,
}

impl VoiceGenerator {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, max_parallel: usize) -> Self {
        Self {
            synthesizer,
            limiter: Arc::new(Semaphore::new(max_parallel.max(1))),
        }
    }

    /// Generate every line of every block into `dest_root/<block>/`.
    pub async fn generate_blocks(
        &self,
        blocks: &BTreeMap<String, Vec<VoiceLine>>,
        dest_root: &Path,
    ) -> StageReport {
        let jobs = blocks.iter().flat_map(|(block, lines)| {
            let dir = dest_root.join(block);
            lines
                .iter()
                .map(move |line| (block.as_str(), line, dir.clone()))
        });

        let results = join_all(jobs.map(|(block, line, dir)| async move {
            (block, line, self.generate_one(line, &dir).await)
        }))
        .await;

        let mut report = StageReport::default();
        for block in blocks.keys() {
            report.files.insert(block.clone(), Vec::new());
        }
        for (block, line, result) in results {
            match result {
                Ok(path) => {
                    if let Some(files) = report.files.get_mut(block) {
                        files.push(path);
                    }
                }
                Err(e) => {
                    warn!(block, voice = %line.voice, error = %e, "Voice line failed, dropping item");
                    report.failures.push(ItemFailure::new(
                        FailureStage::Voice,
                        format!("{}: {}", line.voice, line.text),
                        e.to_string(),
                    ));
                }
            }
        }

        info!(
            files = report.file_count(),
            failed = report.failures.len(),
            "Voice generation settled"
        );
        report
    }

    async fn generate_one(&self, line: &VoiceLine, dir: &Path) -> WorkerResult<PathBuf> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| WorkerError::voice_generation(&line.voice, "limiter closed"))?;

        let result = self.synthesize_to(line, dir).await;
        metrics::record_voice(result.is_ok());
        result
    }

    async fn synthesize_to(&self, line: &VoiceLine, dir: &Path) -> WorkerResult<PathBuf> {
        let audio = self
            .synthesizer
            .synthesize(&line.text, &line.voice)
            .await
            .map_err(|e| WorkerError::voice_generation(&line.voice, e.to_string()))?;

        if audio.is_empty() {
            return Err(WorkerError::voice_generation(&line.voice, "empty audio"));
        }

        tokio::fs::create_dir_all(dir).await?;
        let path = write_unique(dir, &audio, || voice_file_name(&line.voice)).await?;

        debug!(voice = %line.voice, bytes = audio.len(), path = %path.display(), "Voice line written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use vmix_tts::{TtsError, TtsResult};

    struct ScriptedVoices;

    #[async_trait]
    impl SpeechSynthesizer for ScriptedVoices {
        async fn synthesize(&self, text: &str, voice_name: &str) -> TtsResult<Vec<u8>> {
            match voice_name {
                "Ghost" => Err(TtsError::VoiceNotFound(voice_name.to_string())),
                "Silent" => Ok(Vec::new()),
                _ => Ok(text.as_bytes().to_vec()),
            }
        }
    }

    #[test]
    fn test_voice_file_name_shape() {
        let name = voice_file_name("Rachel Green");
        assert!(name.starts_with("tts_rachel_green_"));
        assert!(name.ends_with(".mp3"));
        // tts_ + voice + _ + 8 date + _ + 6 time + _ + 4 hex + .mp3
        let tail = name.trim_start_matches("tts_rachel_green_").trim_end_matches(".mp3");
        let parts: Vec<_> = tail.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_taken_names_are_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let mut names = ["same.mp3", "same.mp3", "other.mp3"].into_iter();

        let first = write_unique(dir.path(), b"one", || names.next().unwrap().to_string())
            .await
            .unwrap();
        let second = write_unique(dir.path(), b"two", || names.next().unwrap().to_string())
            .await
            .unwrap();

        assert_eq!(first, dir.path().join("same.mp3"));
        assert_eq!(second, dir.path().join("other.mp3"));
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_gives_up_when_every_name_is_taken() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("taken.mp3"), b"keep").unwrap();

        let err = write_unique(dir.path(), b"new", || "taken.mp3".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Io(_)));
        assert_eq!(std::fs::read(dir.path().join("taken.mp3")).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_same_voice_lines_get_distinct_files() {
        let dir = TempDir::new().unwrap();
        let generator = VoiceGenerator::new(Arc::new(ScriptedVoices), 3);

        let lines: Vec<_> = (0..20)
            .map(|i| VoiceLine::new(format!("line {i}"), "Rachel"))
            .collect();
        let mut blocks = BTreeMap::new();
        blocks.insert("lines".to_string(), lines);

        let report = generator.generate_blocks(&blocks, dir.path()).await;

        let mut files = report.files["lines"].clone();
        assert_eq!(files.len(), 20);
        files.sort();
        files.dedup();
        assert_eq!(files.len(), 20);
        assert_eq!(std::fs::read_dir(dir.path().join("lines")).unwrap().count(), 20);
    }

    #[tokio::test]
    async fn test_failed_and_empty_lines_are_dropped() {
        let dir = TempDir::new().unwrap();
        let generator = VoiceGenerator::new(Arc::new(ScriptedVoices), 3);

        let mut blocks = BTreeMap::new();
        blocks.insert(
            "greetings".to_string(),
            vec![
                VoiceLine::new("Hello there", "Rachel"),
                VoiceLine::new("Boo", "Ghost"),
                VoiceLine::new("...", "Silent"),
            ],
        );
        blocks.insert("empty".to_string(), Vec::new());

        let report = generator.generate_blocks(&blocks, dir.path()).await;

        let files = &report.files["greetings"];
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with(dir.path().join("greetings")));
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"Hello there");
        assert!(report.files["empty"].is_empty());

        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.stage == FailureStage::Voice));
    }
}
