//! Upload of a finished-video folder to remote storage.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::client::{content_type_for, R2Client, R2Config};
use crate::error::{StorageError, StorageResult};

/// Pushes every file of a local folder into a project folder.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload all regular files of `local_folder` under `project`.
    ///
    /// Returns the uploaded file names, sorted.
    async fn upload_all(&self, local_folder: &Path, project: &str) -> StorageResult<Vec<String>>;
}

/// Regular files of a folder sorted by name, or `FolderNotFound`.
async fn folder_files(local_folder: &Path) -> StorageResult<Vec<PathBuf>> {
    if !tokio::fs::metadata(local_folder)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return Err(StorageError::FolderNotFound(local_folder.to_path_buf()));
    }

    let mut entries = tokio::fs::read_dir(local_folder).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Object key for a file: `<prefix>/<project>/<file name>`.
pub fn object_key(prefix: &str, project: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}/{}", project, file_name)
    } else {
        format!("{}/{}/{}", prefix, project, file_name)
    }
}

/// Uploads into an R2 bucket.
#[derive(Clone)]
pub struct R2Uploader {
    client: R2Client,
    key_prefix: String,
}

impl R2Uploader {
    pub fn new(config: &R2Config) -> Self {
        Self {
            client: R2Client::new(config),
            key_prefix: config.key_prefix.clone(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(&R2Config::from_env()?))
    }
}

#[async_trait]
impl Uploader for R2Uploader {
    async fn upload_all(&self, local_folder: &Path, project: &str) -> StorageResult<Vec<String>> {
        let files = folder_files(local_folder).await?;
        let mut uploaded = Vec::with_capacity(files.len());

        for file in files {
            let name = file_name_of(&file);
            let key = object_key(&self.key_prefix, project, &name);
            self.client
                .upload_file(&file, &key, content_type_for(&file))
                .await?;
            uploaded.push(name);
        }

        info!(
            bucket = self.client.bucket(),
            project,
            count = uploaded.len(),
            "Uploaded project files"
        );
        Ok(uploaded)
    }
}

/// Copies into a directory tree; for development without cloud credentials.
#[derive(Debug, Clone)]
pub struct LocalUploader {
    root: PathBuf,
    key_prefix: String,
}

impl LocalUploader {
    pub fn new(root: impl Into<PathBuf>, key_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            key_prefix: key_prefix.into(),
        }
    }
}

#[async_trait]
impl Uploader for LocalUploader {
    async fn upload_all(&self, local_folder: &Path, project: &str) -> StorageResult<Vec<String>> {
        let files = folder_files(local_folder).await?;
        let mut uploaded = Vec::with_capacity(files.len());

        for file in files {
            let name = file_name_of(&file);
            let target = self.root.join(object_key(&self.key_prefix, project, &name));
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if let Err(e) = tokio::fs::copy(&file, &target).await {
                warn!(file = %file.display(), error = %e, "Local upload failed");
                return Err(StorageError::upload_failed(name, e.to_string()));
            }
            uploaded.push(name);
        }

        info!(root = %self.root.display(), project, count = uploaded.len(), "Copied project files");
        Ok(uploaded)
    }
}
