//! Job worker for the vmix media pipeline.
//!
//! Downloads video and audio blocks, generates voice lines, combines one clip
//! per video block into every possible video, overlays background and voice
//! audio, and uploads the results.

pub mod config;
pub mod download;
pub mod error;
pub mod executor;
pub mod layout;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod voices;

pub use config::WorkerConfig;
pub use download::{BoundedDownloader, HttpTransport, StageReport, Transport};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use layout::WorkspaceLayout;
pub use logging::JobLogger;
pub use pipeline::MediaPipeline;
pub use retry::RetryConfig;
pub use voices::VoiceGenerator;
