//! Worker binary: runs one job description file through the pipeline.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vmix_media::BinaryProvisioner;
use vmix_models::{JobDescription, JobStatus};
use vmix_storage::{LocalUploader, R2Uploader, Uploader, DEFAULT_KEY_PREFIX};
use vmix_tts::{ElevenLabsClient, SpeechSynthesizer, TtsConfig};
use vmix_worker::metrics::init_metrics;
use vmix_worker::{HttpTransport, JobExecutor, MediaPipeline, WorkerConfig};

fn init_tracing() -> anyhow::Result<()> {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vmix_worker=info".parse()?)
        .add_directive("vmix_media=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
    Ok(())
}

fn build_synthesizer(job: &JobDescription) -> anyhow::Result<Arc<dyn SpeechSynthesizer>> {
    match ElevenLabsClient::from_env() {
        Ok(client) => Ok(Arc::new(client)),
        Err(e) if job.voice_blocks.is_empty() => {
            warn!("TTS not configured ({}), job has no voice blocks", e);
            Ok(Arc::new(ElevenLabsClient::new(TtsConfig::default())?))
        }
        Err(e) => Err(e).context("job has voice blocks but TTS is not configured"),
    }
}

fn build_uploader(config: &WorkerConfig) -> Arc<dyn Uploader> {
    match R2Uploader::from_env() {
        Ok(uploader) => Arc::new(uploader),
        Err(e) => {
            warn!(
                "R2 not configured ({}), copying results into {}",
                e,
                config.upload_dir.display()
            );
            Arc::new(LocalUploader::new(&config.upload_dir, DEFAULT_KEY_PREFIX))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    let job_path = std::env::args()
        .nth(1)
        .context("usage: vmix-worker <job.json>")?;

    info!("Starting vmix-worker");
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        init_metrics(addr)?;
        info!("Serving metrics on {}", addr);
    }

    let raw = tokio::fs::read_to_string(&job_path)
        .await
        .with_context(|| format!("reading {}", job_path))?;
    let job: JobDescription =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", job_path))?;

    let provisioner = Arc::new(BinaryProvisioner::new(config.provision.clone())?);
    let transport = Arc::new(HttpTransport::new(config.download_timeout)?);
    let synthesizer = build_synthesizer(&job)?;
    let uploader = build_uploader(&config);

    let pipeline = Arc::new(MediaPipeline::new(
        config.clone(),
        provisioner,
        transport,
        synthesizer,
        uploader,
    ));
    let executor = JobExecutor::new(pipeline, &config);

    let job_id = executor.submit(job).await?;
    let record = tokio::select! {
        record = executor.wait(&job_id) => record?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            executor.shutdown_and_wait().await;
            executor.wait(&job_id).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&record)?);

    if record.status != JobStatus::Success {
        std::process::exit(1);
    }
    Ok(())
}
