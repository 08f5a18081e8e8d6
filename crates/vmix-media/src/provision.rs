//! Local provisioning of the encoder binary.
//!
//! On first use the platform's static release archive is downloaded, the
//! single executable member is extracted into the bin directory and marked
//! executable. Later calls return the existing path without touching the
//! network. Concurrent callers are serialized by an async mutex.

use futures::StreamExt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

pub const DEFAULT_LINUX_ARCHIVE_URL: &str =
    "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-amd64-static.tar.xz";
pub const DEFAULT_WINDOWS_ARCHIVE_URL: &str =
    "https://www.gyan.dev/ffmpeg/builds/ffmpeg-release-essentials.zip";

/// Supported host platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    TarXz,
}

impl Platform {
    /// Detect the host platform.
    pub fn detect() -> MediaResult<Self> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> MediaResult<Self> {
        match os {
            "linux" => Ok(Platform::Linux),
            "windows" => Ok(Platform::Windows),
            other => Err(MediaError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// File name of the executable on this platform.
    pub fn executable_name(&self, name: &str) -> String {
        match self {
            Platform::Linux => name.to_string(),
            Platform::Windows => format!("{}.exe", name),
        }
    }

    /// Suffix identifying the executable inside the release archive.
    fn member_suffix(&self, name: &str) -> String {
        match self {
            Platform::Linux => format!("/{}", name),
            Platform::Windows => format!("bin/{}.exe", name),
        }
    }

    fn archive_kind(&self) -> ArchiveKind {
        match self {
            Platform::Linux => ArchiveKind::TarXz,
            Platform::Windows => ArchiveKind::Zip,
        }
    }
}

/// Where binaries live and where they come from.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// Directory holding provisioned binaries
    pub bin_dir: PathBuf,
    /// Release archive for Linux (tar.xz)
    pub linux_archive_url: String,
    /// Release archive for Windows (zip)
    pub windows_archive_url: String,
    /// Use a binary found on PATH instead of downloading
    pub use_system_binary: bool,
    /// Timeout for the archive download
    pub download_timeout: Duration,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            bin_dir: PathBuf::from("/tmp/vmix-bin"),
            linux_archive_url: DEFAULT_LINUX_ARCHIVE_URL.to_string(),
            windows_archive_url: DEFAULT_WINDOWS_ARCHIVE_URL.to_string(),
            use_system_binary: false,
            download_timeout: Duration::from_secs(600),
        }
    }
}

impl ProvisionConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bin_dir: std::env::var("VMIX_BIN_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.bin_dir),
            linux_archive_url: std::env::var("FFMPEG_LINUX_ARCHIVE_URL")
                .unwrap_or(defaults.linux_archive_url),
            windows_archive_url: std::env::var("FFMPEG_WINDOWS_ARCHIVE_URL")
                .unwrap_or(defaults.windows_archive_url),
            use_system_binary: std::env::var("VMIX_USE_SYSTEM_FFMPEG")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.use_system_binary),
            download_timeout: std::env::var("FFMPEG_DOWNLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
        }
    }

    fn archive_url(&self, platform: Platform) -> &str {
        match platform {
            Platform::Linux => &self.linux_archive_url,
            Platform::Windows => &self.windows_archive_url,
        }
    }
}

/// Ensures executables are present in the bin directory.
pub struct BinaryProvisioner {
    config: ProvisionConfig,
    /// Fixed platform; detected per call when unset
    platform: Option<Platform>,
    http: reqwest::Client,
    lock: Mutex<()>,
}

impl BinaryProvisioner {
    /// Create a provisioner for the host platform.
    pub fn new(config: ProvisionConfig) -> MediaResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.download_timeout)
            .build()?;

        Ok(Self {
            config,
            platform: None,
            http,
            lock: Mutex::new(()),
        })
    }

    /// Pin the platform instead of detecting it.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Canonical local path of an executable.
    pub fn binary_path(&self, name: &str) -> PathBuf {
        let file_name = match self.platform {
            Some(platform) => platform.executable_name(name),
            None => format!("{}{}", name, std::env::consts::EXE_SUFFIX),
        };
        self.config.bin_dir.join(file_name)
    }

    /// Return the local path of `name`, downloading it on first use.
    pub async fn ensure(&self, name: &str) -> MediaResult<PathBuf> {
        let target = self.binary_path(name);
        if target.is_file() {
            debug!(binary = name, path = %target.display(), "Binary already provisioned");
            return Ok(target);
        }

        let _guard = self.lock.lock().await;

        // Another caller may have finished while we waited
        if target.is_file() {
            return Ok(target);
        }

        if self.config.use_system_binary {
            if let Ok(path) = which::which(name) {
                info!(binary = name, path = %path.display(), "Using binary from PATH");
                return Ok(path);
            }
            warn!(binary = name, "Binary not found on PATH, downloading release");
        }

        let platform = match self.platform {
            Some(platform) => platform,
            None => Platform::detect()?,
        };

        let result = self.provision(name, platform, &target).await;
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("vmix_provision_total", "status" => status).increment(1);

        result.map(|_| target)
    }

    async fn provision(&self, name: &str, platform: Platform, target: &Path) -> MediaResult<()> {
        let url = self.config.archive_url(platform);
        info!(binary = name, url, "Provisioning binary from release archive");

        tokio::fs::create_dir_all(&self.config.bin_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(".provision-")
            .tempdir_in(&self.config.bin_dir)?;
        let archive_path = scratch.path().join("archive");

        self.download_archive(name, url, &archive_path).await?;

        let kind = platform.archive_kind();
        let suffix = platform.member_suffix(name);
        let binary = name.to_string();
        let target_path = target.to_path_buf();

        tokio::task::spawn_blocking(move || {
            extract_member(kind, &archive_path, &suffix, &target_path, &binary)
        })
        .await
        .map_err(|e| MediaError::provision_failed(name, format!("extraction task failed: {}", e)))??;

        info!(binary = name, path = %target.display(), "Binary provisioned");
        Ok(())
    }

    async fn download_archive(&self, name: &str, url: &str, dest: &Path) -> MediaResult<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| MediaError::provision_failed(name, format!("archive unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::provision_failed(
                name,
                format!("archive download returned HTTP {}", status),
            ));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                MediaError::provision_failed(name, format!("archive download interrupted: {}", e))
            })?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }
}

/// Extract the member ending with `suffix` to `target`.
fn extract_member(
    kind: ArchiveKind,
    archive_path: &Path,
    suffix: &str,
    target: &Path,
    binary: &str,
) -> MediaResult<()> {
    let staging = target.with_extension("part");

    let found = match kind {
        ArchiveKind::Zip => extract_from_zip(archive_path, suffix, &staging, binary)?,
        ArchiveKind::TarXz => extract_from_tar_xz(archive_path, suffix, &staging)?,
    };

    if !found {
        let _ = std::fs::remove_file(&staging);
        return Err(MediaError::provision_failed(
            binary,
            format!("no archive member ending with '{}'", suffix),
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o755))?;
    }

    std::fs::rename(&staging, target)?;
    Ok(())
}

fn extract_from_zip(
    archive_path: &Path,
    suffix: &str,
    out: &Path,
    binary: &str,
) -> MediaResult<bool> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| MediaError::provision_failed(binary, format!("unreadable zip archive: {}", e)))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| {
            MediaError::provision_failed(binary, format!("unreadable zip entry: {}", e))
        })?;
        if !entry.is_file() {
            continue;
        }

        let normalized = entry.name().replace('\\', "/").to_lowercase();
        if normalized.ends_with(suffix) {
            let mut output = File::create(out)?;
            std::io::copy(&mut entry, &mut output)?;
            return Ok(true);
        }
    }

    Ok(false)
}

fn extract_from_tar_xz(archive_path: &Path, suffix: &str, out: &Path) -> MediaResult<bool> {
    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(xz2::read::XzDecoder::new(BufReader::new(file)));

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = entry.path()?.to_string_lossy().replace('\\', "/");
        if name.ends_with(suffix) {
            let mut output = File::create(out)?;
            std::io::copy(&mut entry, &mut output)?;
            return Ok(true);
        }
    }

    Ok(false)
}
