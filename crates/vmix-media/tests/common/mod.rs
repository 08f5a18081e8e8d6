//! Fake encoder used by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Write a shell script that behaves like ffmpeg for the pipeline's needs.
///
/// - any argument containing `corrupt` makes it fail like a bad input
/// - any argument containing `slow` makes it hang for a while
/// - `-i <file>` alone prints a 10 second duration and exits 1
/// - anything else creates the last argument (the output file)
///
/// Every invocation is appended to `ffmpeg.log` next to the script.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let log = dir.join("ffmpeg.log");
    let script = format!(
        r#"#!/bin/sh
echo "$*" >> "{log}"
for arg in "$@"; do
  case "$arg" in
    *corrupt*) echo "$arg: Invalid data found when processing input" >&2; exit 1 ;;
    *slow*) exec sleep 5 ;;
  esac
done
if [ "$#" -eq 2 ] && [ "$1" = "-i" ]; then
  echo "  Duration: 00:00:10.00, start: 0.000000, bitrate: 128 kb/s" >&2
  echo "At least one output file must be specified" >&2
  exit 1
fi
for arg in "$@"; do last="$arg"; done
echo "out_time_us=10000000" >&2
echo "progress=end" >&2
: > "$last"
exit 0
"#,
        log = log.display()
    );

    let path = dir.join("ffmpeg");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Command lines the fake encoder has seen so far.
pub fn invocations(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("ffmpeg.log"))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Create an empty media file.
pub fn touch(path: &Path) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"").unwrap();
    path.to_path_buf()
}
