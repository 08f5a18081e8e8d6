//! ElevenLabs-compatible HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{TtsError, TtsResult};
use crate::types::{SpeechRequest, Voice, VoicesResponse};
use crate::SpeechSynthesizer;

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";
pub const DEFAULT_OUTPUT_FORMAT: &str = "mp3_44100_128";

/// Upper bound on a single backoff sleep.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Delay before retry number `attempt + 1`, doubling from `base` and capped.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_RETRY_DELAY)
}

/// Configuration for the TTS client.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// API key sent as `xi-api-key`
    pub api_key: String,
    /// Base URL of the provider
    pub base_url: String,
    pub model_id: String,
    pub output_format: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
    /// First retry delay, doubled on every attempt
    pub retry_base_delay: Duration,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl TtsConfig {
    /// Create config from environment variables.
    pub fn from_env() -> TtsResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            api_key: std::env::var("ELEVEN_LABS_API_KEY")
                .map_err(|_| TtsError::ConfigError("ELEVEN_LABS_API_KEY not set".to_string()))?,
            base_url: std::env::var("ELEVEN_LABS_BASE_URL").unwrap_or(defaults.base_url),
            model_id: std::env::var("ELEVEN_LABS_MODEL_ID").unwrap_or(defaults.model_id),
            output_format: std::env::var("ELEVEN_LABS_OUTPUT_FORMAT")
                .unwrap_or(defaults.output_format),
            timeout: std::env::var("ELEVEN_LABS_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("ELEVEN_LABS_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: defaults.retry_base_delay,
        })
    }
}

/// Client for an ElevenLabs-compatible text-to-speech API.
pub struct ElevenLabsClient {
    http: Client,
    config: TtsConfig,
    /// Voice list, fetched once per client
    voices: OnceCell<Vec<Voice>>,
}

impl ElevenLabsClient {
    /// Create a new client.
    pub fn new(config: TtsConfig) -> TtsResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(TtsError::Network)?;

        Ok(Self {
            http,
            config,
            voices: OnceCell::new(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> TtsResult<Self> {
        Self::new(TtsConfig::from_env()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// All voices available to the account, legacy voices included.
    pub async fn list_voices(&self) -> TtsResult<&[Voice]> {
        let voices = self
            .voices
            .get_or_try_init(|| async {
                let url = self.url("/v1/voices");
                debug!("Fetching voice list from {}", url);

                let response = self
                    .with_retry(|| async {
                        let response = self
                            .http
                            .get(&url)
                            .query(&[("show_legacy", "true")])
                            .header("xi-api-key", &self.config.api_key)
                            .send()
                            .await?;
                        check_status(response).await
                    })
                    .await?;

                let body: VoicesResponse = response.json().await?;
                info!(count = body.voices.len(), "Loaded TTS voices");
                Ok::<_, TtsError>(body.voices)
            })
            .await?;

        Ok(voices.as_slice())
    }

    /// Voice id for a display name, compared case-insensitively.
    pub async fn voice_id_by_name(&self, name: &str) -> TtsResult<Option<String>> {
        let wanted = name.to_lowercase();
        Ok(self
            .list_voices()
            .await?
            .iter()
            .find(|v| v.name.to_lowercase() == wanted)
            .map(|v| v.voice_id.clone()))
    }

    async fn convert(&self, text: &str, voice_id: &str) -> TtsResult<Vec<u8>> {
        let url = self.url(&format!(
            "/v1/text-to-speech/{}",
            urlencoding::encode(voice_id)
        ));
        let request = SpeechRequest {
            text,
            model_id: &self.config.model_id,
        };

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .post(&url)
                    .query(&[("output_format", self.config.output_format.as_str())])
                    .header("xi-api-key", &self.config.api_key)
                    .json(&request)
                    .send()
                    .await?;
                check_status(response).await
            })
            .await?;

        Ok(response.bytes().await?.to_vec())
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> TtsResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = TtsResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    warn!(
                        "TTS request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Map non-success responses onto errors.
async fn check_status(response: Response) -> TtsResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(TtsError::ServiceUnavailable(format!("{}: {}", status, body)))
    } else {
        Err(TtsError::RequestFailed {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str, voice_name: &str) -> TtsResult<Vec<u8>> {
        let voice_id = self
            .voice_id_by_name(voice_name)
            .await?
            .ok_or_else(|| TtsError::VoiceNotFound(voice_name.to_string()))?;

        let audio = self.convert(text, &voice_id).await?;
        if audio.is_empty() {
            return Err(TtsError::EmptyAudio(voice_name.to_string()));
        }

        debug!(voice = voice_name, bytes = audio.len(), "Synthesized speech");
        Ok(audio)
    }
}
