//! FFmpeg plumbing for the vmix pipeline.
//!
//! This crate provides:
//! - Provisioning of a static FFmpeg build per platform
//! - Multi-input FFmpeg command building and a runner with timeout,
//!   cancellation and `-progress pipe:2` parsing
//! - Duration probing from `ffmpeg -i` output
//! - Combination enumeration, scale+concat combining and audio overlay

pub mod combination;
pub mod combine;
pub mod command;
pub mod error;
pub mod fs_utils;
pub mod overlay;
pub mod probe;
pub mod progress;
pub mod provision;

pub use combination::{combination_count, enumerate, Combination, VideoBlocks};
pub use combine::{CombineSettings, VideoCombiner};
pub use command::{CapturedOutput, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use overlay::{loop_count, AudioOverlay, AudioPools, OverlayOutcome, OverlaySettings};
pub use probe::{media_duration, parse_duration};
pub use progress::FfmpegProgress;
pub use provision::{BinaryProvisioner, Platform, ProvisionConfig};

/// Name of the encoder executable.
pub const FFMPEG: &str = "ffmpeg";
