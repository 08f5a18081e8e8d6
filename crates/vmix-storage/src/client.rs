//! S3-compatible bucket access for finished videos.

use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Default root folder for uploaded projects.
pub const DEFAULT_KEY_PREFIX: &str = "video_generator";

/// Bucket connection settings.
#[derive(Debug, Clone)]
pub struct R2Config {
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Signing region, `auto` unless the provider needs a real one
    pub region: String,
    /// Root folder every project is uploaded under
    pub key_prefix: String,
}

fn required(name: &str) -> StorageResult<String> {
    std::env::var(name).map_err(|_| StorageError::config_error(format!("{name} must be set")))
}

impl R2Config {
    /// Read `R2_*` variables. `R2_REGION` and `UPLOAD_KEY_PREFIX` are optional.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".into()),
            key_prefix: std::env::var("UPLOAD_KEY_PREFIX")
                .unwrap_or_else(|_| DEFAULT_KEY_PREFIX.into()),
        })
    }
}

/// Thin wrapper over the S3 client bound to one bucket.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
}

impl R2Client {
    pub fn new(config: &R2Config) -> Self {
        let static_keys = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vmix-static",
        );

        let s3_conf = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url.as_str())
            .region(Region::new(config.region.clone()))
            .credentials_provider(static_keys)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_conf),
            bucket: config.bucket_name.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Stream one local file into `key`.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!(file = %path.display(), key, "Putting object");

        let upload_err = |e: String| StorageError::upload_failed(key, e);
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| upload_err(e.to_string()))?;

        self.client
            .put_object()
            .bucket(self.bucket.as_str())
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| upload_err(e.to_string()))?;

        info!(bucket = %self.bucket, key, "Object stored");
        Ok(())
    }
}

/// Content type from a file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "m4a" | "aac" => "audio/aac",
        "wav" => "audio/wav",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
