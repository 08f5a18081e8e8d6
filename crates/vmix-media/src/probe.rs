//! Media duration from the encoder's informational output.

use regex::Regex;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

use crate::command::FfmpegRunner;
use crate::error::{MediaError, MediaResult};

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d+):(\d+):(\d+(?:\.\d+)?)").expect("invalid duration regex")
});

/// Parse the `Duration: HH:MM:SS.xx` field from `ffmpeg -i` output.
///
/// Returns 0.0 when the field is absent or unparseable.
pub fn parse_duration(output: &str) -> f64 {
    let Some(caps) = DURATION_RE.captures(output) else {
        return 0.0;
    };

    let hours: f64 = caps[1].parse().unwrap_or(0.0);
    let minutes: f64 = caps[2].parse().unwrap_or(0.0);
    let seconds: f64 = caps[3].parse().unwrap_or(0.0);

    hours * 3600.0 + minutes * 60.0 + seconds
}

/// Query the duration of a media file in seconds.
pub async fn media_duration(runner: &FfmpegRunner, path: impl AsRef<Path>) -> MediaResult<f64> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let output = runner.run_capture([OsStr::new("-i"), path.as_os_str()]).await?;
    let duration = parse_duration(&output.stderr);
    debug!(path = %path.display(), duration, "Probed media duration");

    Ok(duration)
}
