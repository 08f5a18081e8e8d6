//! Per-task working storage layout.

use std::path::{Path, PathBuf};

/// Directories owned by one task under the work root.
///
/// ```text
/// <work_dir>/<task>/
///   video/<block>/
///   audio/<block>/
///   voice/<block>/
///   combined_movies_raw/
///   done/
///   tmp_audio/
/// ```
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(work_dir: impl AsRef<Path>, task_name: &str) -> Self {
        Self {
            root: work_dir.as_ref().join(task_name),
        }
    }

    /// Everything the task writes lives below this directory.
    pub fn task_root(&self) -> &Path {
        &self.root
    }

    pub fn videos(&self) -> PathBuf {
        self.root.join("video")
    }

    pub fn audios(&self) -> PathBuf {
        self.root.join("audio")
    }

    pub fn voices(&self) -> PathBuf {
        self.root.join("voice")
    }

    pub fn combined_dir(&self) -> PathBuf {
        self.root.join("combined_movies_raw")
    }

    pub fn done_dir(&self) -> PathBuf {
        self.root.join("done")
    }

    pub fn tmp_audio_dir(&self) -> PathBuf {
        self.root.join("tmp_audio")
    }
}
