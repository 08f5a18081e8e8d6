//! Encoder invocations: argument building and supervised execution.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Number of stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
struct FfmpegInput {
    /// Arguments placed right before this input's `-i`
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for multi-input FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<FfmpegInput>,
    output: PathBuf,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".into(),
        }
    }

    /// Add an input file.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with_args(Vec::<String>::new(), path)
    }

    /// Add an input file preceded by per-input options.
    pub fn input_with_args<I, S>(mut self, args: I, path: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(FfmpegInput {
            args: args.into_iter().map(Into::into).collect(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    /// Add an input that is looped `loops` times.
    pub fn looped_input(self, path: impl AsRef<Path>, loops: u32) -> Self {
        self.input_with_args(["-stream_loop".to_string(), loops.to_string()], path)
    }

    /// Append one argument after all inputs.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Append several output arguments in order.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream or filter label into the output.
    pub fn map(self, stream: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(stream)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set audio sample rate.
    pub fn audio_sample_rate(self, hz: u32) -> Self {
        self.output_arg("-ar").output_arg(hz.to_string())
    }

    /// Set audio channel count.
    pub fn audio_channels(self, channels: u32) -> Self {
        self.output_arg("-ac").output_arg(channels.to_string())
    }

    /// Stop at the end of the shortest mapped stream.
    pub fn shortest(self) -> Self {
        self.output_arg("-shortest")
    }

    /// Allow or refuse overwriting the output.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// `-v` level, `error` by default.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Input paths in order.
    pub fn input_paths(&self) -> impl Iterator<Item = &Path> {
        self.inputs.iter().map(|i| i.path.as_path())
    }

    /// Output path.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Full argument vector, binary excluded.
    ///
    /// Progress is always requested on stderr so the runner can follow it.
    pub fn build_args(&self) -> Vec<String> {
        let global: &[&str] = if self.overwrite { &["-y"] } else { &[] };
        let mut args: Vec<String> = global.iter().map(|s| s.to_string()).collect();
        args.extend(["-v", self.log_level.as_str(), "-progress", "pipe:2"].map(String::from));

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.extend(["-i".into(), input.path.display().to_string()]);
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.display().to_string());
        args
    }
}

/// Output of an informational invocation.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runner for FFmpeg commands with progress tracking, timeout and cancellation.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    /// Absolute path of the encoder binary
    binary: PathBuf,
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Per-invocation timeout
    timeout: Option<Duration>,
}

enum WaitOutcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

impl FfmpegRunner {
    /// Create a runner for the binary at `binary`.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cancel_rx: None,
            timeout: None,
        }
    }

    /// Kill the child once `cancel_rx` flips to true.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run to completion, ignoring progress.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run to completion, reporting each progress block to `progress_callback`.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        progress_callback: F,
    ) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        if self.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", self.binary.display(), args.join(" "));
        let started = Instant::now();

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stderr not captured", None, None))?;
        let stderr_handle = tokio::spawn(drain_stderr(BufReader::new(stderr), progress_callback));

        let outcome = self.wait_for_completion(&mut child).await;
        let stderr_tail = stderr_handle.await.unwrap_or_default();

        let result = match outcome {
            WaitOutcome::Exited(status) => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(MediaError::ffmpeg_failed(
                        format!("FFmpeg exited with {}", describe_exit(&status)),
                        Some(stderr_tail).filter(|s| !s.is_empty()),
                        status.code(),
                    ))
                }
            }
            WaitOutcome::TimedOut => Err(MediaError::Timeout(
                self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
            )),
            WaitOutcome::Cancelled => Err(MediaError::Cancelled),
        };

        metrics::histogram!(
            "vmix_ffmpeg_duration_seconds",
            "status" => if result.is_ok() { "success" } else { "error" }
        )
        .record(started.elapsed().as_secs_f64());

        result
    }

    /// Run the binary with raw arguments and capture its output.
    ///
    /// A non-zero exit is not an error here; `ffmpeg -i <file>` without an
    /// output always exits non-zero after printing the stream info.
    pub async fn run_capture<I, S>(&self, args: I) -> MediaResult<CapturedOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, output)
                .await
                .map_err(|_| MediaError::Timeout(timeout.as_secs()))??,
            None => output.await?,
        };

        Ok(CapturedOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Wait for exit. Hitting the deadline or a cancel kills the child.
    async fn wait_for_completion(&self, child: &mut Child) -> WaitOutcome {
        let mut cancel_rx = self.cancel_rx.clone();
        let timeout = self.timeout;

        let cancelled = async {
            match cancel_rx.as_mut() {
                Some(rx) => loop {
                    if *rx.borrow_and_update() {
                        break;
                    }
                    if rx.changed().await.is_err() {
                        // Sender gone, cancellation can no longer happen
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };

        let deadline = async {
            match timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            status = child.wait() => WaitOutcome::Exited(status),
            _ = deadline => WaitOutcome::TimedOut,
            _ = cancelled => WaitOutcome::Cancelled,
        };

        match &outcome {
            WaitOutcome::TimedOut => {
                warn!(
                    timeout_secs = timeout.map(|t| t.as_secs()).unwrap_or_default(),
                    "Encoder ran past its deadline, killing"
                );
                let _ = child.kill().await;
            }
            WaitOutcome::Cancelled => {
                info!("Encoder run cancelled, killing");
                let _ = child.kill().await;
            }
            WaitOutcome::Exited(_) => {}
        }

        outcome
    }
}

/// Read encoder stderr to the end.
///
/// Progress blocks go to `on_progress`, every other line is kept in a
/// bounded tail that is returned joined. Bytes that are not UTF-8 are
/// replaced rather than ending the read, so the pipe stays drained.
async fn drain_stderr<R, F>(mut reader: R, on_progress: F) -> String
where
    R: AsyncBufRead + Unpin,
    F: Fn(FfmpegProgress),
{
    let mut progress = FfmpegProgress::default();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let decoded = String::from_utf8_lossy(&buf);
        let line = decoded.trim_end_matches(['\n', '\r']);

        if let Some(snapshot) = progress.apply_line(line) {
            on_progress(snapshot);
            continue;
        }
        if is_progress_key_line(line) {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_string());
    }

    Vec::from(tail).join("\n")
}

/// `key=value` lines emitted by `-progress` that carry no diagnostic value.
fn is_progress_key_line(line: &str) -> bool {
    match line.trim().split_once('=') {
        Some((key, _)) => {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        None => false,
    }
}

fn describe_exit(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_input_argument_order() {
        let cmd = FfmpegCommand::new("out.mp4")
            .input("video.mp4")
            .looped_input("bg.mp3", 4)
            .input("voice.mp3")
            .map("0:v")
            .shortest();

        let args = cmd.build_args();
        assert_eq!(
            &args[..5],
            &["-y", "-v", "error", "-progress", "pipe:2"].map(String::from)
        );
        assert_eq!(
            &args[5..],
            &[
                "-i", "video.mp4", "-stream_loop", "4", "-i", "bg.mp3", "-i", "voice.mp3",
                "-map", "0:v", "-shortest", "out.mp4",
            ]
            .map(String::from)
        );
    }

    #[test]
    fn test_overwrite_can_be_disabled() {
        let args = FfmpegCommand::new("o.mp4")
            .input("i.mp4")
            .overwrite(false)
            .build_args();
        assert!(!args.contains(&"-y".to_string()));
    }

    #[test]
    fn test_input_paths() {
        let cmd = FfmpegCommand::new("o.mp4").input("a.mp4").input("b.mp4");
        let inputs: Vec<_> = cmd.input_paths().collect();
        assert_eq!(inputs, vec![Path::new("a.mp4"), Path::new("b.mp4")]);
        assert_eq!(cmd.output_path(), Path::new("o.mp4"));
    }

    #[tokio::test]
    async fn test_stderr_survives_invalid_utf8() {
        let raw: &[u8] = b"frame=12\nprogress=continue\n\xff\xfe bad bytes\r\nError opening input\nprogress=end\n";
        let snapshots = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = snapshots.clone();

        let tail = drain_stderr(raw, move |p| seen.lock().unwrap().push(p.is_complete)).await;

        assert_eq!(*snapshots.lock().unwrap(), vec![false, true]);
        let lines: Vec<_> = tail.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" bad bytes"));
        assert!(lines[0].contains('\u{FFFD}'));
        assert_eq!(lines[1], "Error opening input");
    }

    #[test]
    fn test_progress_key_lines_are_filtered() {
        assert!(is_progress_key_line("stream_0_0_q=-1.0"));
        assert!(is_progress_key_line("bitrate=N/A"));
        assert!(!is_progress_key_line("Error opening input file x.mp3."));
        assert!(!is_progress_key_line("[mp3 @ 0x55] Header missing"));
    }
}
