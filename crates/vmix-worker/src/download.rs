//! Concurrency-bounded downloads of URL blocks.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use futures::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use vmix_models::{BlockFiles, FailureStage, ItemFailure};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Write buffer for streamed bodies.
const CHUNK_BUFFER: usize = 64 * 1024;

/// Moves one remote resource to a local file.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `url` into `dest`, returning the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> WorkerResult<u64>;
}

/// Streams HTTP(S) bodies to disk.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `timeout` bounds each whole transfer.
    pub fn new(timeout: Duration) -> WorkerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn stream_to(&self, url: &str, part: &Path) -> WorkerResult<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WorkerError::download(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::download(url, format!("HTTP {}", status)));
        }

        let file = tokio::fs::File::create(part).await?;
        let mut writer = BufWriter::with_capacity(CHUNK_BUFFER, file);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let data = chunk.map_err(|e| WorkerError::download(url, e.to_string()))?;
            writer.write_all(&data).await?;
            written += data.len() as u64;
        }
        writer.flush().await?;

        Ok(written)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str, dest: &Path) -> WorkerResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut part = dest.as_os_str().to_owned();
        part.push(".part");
        let part = PathBuf::from(part);

        match self.stream_to(url, &part).await {
            Ok(bytes) => {
                tokio::fs::rename(&part, dest).await?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}

/// Files fetched per block, plus the items that were dropped.
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    pub files: BlockFiles,
    pub failures: Vec<ItemFailure>,
}

impl StageReport {
    /// Total number of files produced.
    pub fn file_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

/// Local file name for a URL: its last path segment, or `file`.
pub fn file_name_for_url(url: &str) -> String {
    let segment = reqwest::Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
    });

    match segment {
        Some(name) if !name.is_empty() && name != "." && name != ".." => name,
        _ => "file".to_string(),
    }
}

/// Distinct file names for the URLs of one block, in order.
fn unique_names(urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .map(|url| {
            let base = file_name_for_url(url);
            let mut name = base.clone();
            let mut n = 1;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", n, base);
                n += 1;
            }
            name
        })
        .collect()
}

/// Downloads every URL of every block through one shared limiter.
#[derive(Clone)]
pub struct BoundedDownloader {
    transport: Arc<dyn Transport>,
    limiter: Arc<Semaphore>,
}

impl BoundedDownloader {
    pub fn new(transport: Arc<dyn Transport>, max_parallel: usize) -> Self {
        Self {
            transport,
            limiter: Arc::new(Semaphore::new(max_parallel.max(1))),
        }
    }

    /// Fetch all blocks into `dest_root/<block>/`.
    ///
    /// Returns once every transfer has settled. Failed transfers are logged
    /// and left out of their block; an all-failed block maps to an empty list.
    pub async fn fetch_blocks(
        &self,
        blocks: &BTreeMap<String, Vec<String>>,
        dest_root: &Path,
    ) -> StageReport {
        let per_block = join_all(
            blocks
                .iter()
                .map(|(block, urls)| self.fetch_block(block, urls, dest_root.join(block))),
        )
        .await;

        let mut report = StageReport::default();
        for (block, files, failures) in per_block {
            report.files.insert(block, files);
            report.failures.extend(failures);
        }

        info!(
            blocks = report.files.len(),
            files = report.file_count(),
            failed = report.failures.len(),
            "Downloads settled"
        );
        report
    }

    async fn fetch_block(
        &self,
        block: &str,
        urls: &[String],
        dir: PathBuf,
    ) -> (String, Vec<PathBuf>, Vec<ItemFailure>) {
        let names = unique_names(urls);
        let results = join_all(
            urls.iter()
                .zip(names)
                .map(|(url, name)| self.fetch_one(block, url, dir.join(name))),
        )
        .await;

        let mut files = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (url, result) in urls.iter().zip(results) {
            match result {
                Ok(path) => files.push(path),
                Err(e) => failures.push(ItemFailure::new(
                    FailureStage::Download,
                    url.clone(),
                    e.to_string(),
                )),
            }
        }
        (block.to_string(), files, failures)
    }

    async fn fetch_one(&self, block: &str, url: &str, dest: PathBuf) -> WorkerResult<PathBuf> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| WorkerError::download(url, "download limiter closed"))?;

        let started = Instant::now();
        match self.transport.fetch(url, &dest).await {
            Ok(bytes) => {
                metrics::record_download(true, started.elapsed().as_secs_f64());
                debug!(block, url, bytes, path = %dest.display(), "Downloaded");
                Ok(dest)
            }
            Err(e) => {
                metrics::record_download(false, 0.0);
                warn!(block, url, error = %e, "Download failed, dropping item");
                Err(e)
            }
        }
    }
}
