//! Combining and overlay against the fake encoder.
#![cfg(unix)]

mod common;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use common::{fake_ffmpeg, invocations, touch};
use tempfile::TempDir;
use tokio::sync::watch;
use vmix_media::{
    enumerate, media_duration, AudioOverlay, AudioPools, CombineSettings, FfmpegCommand,
    FfmpegRunner, MediaError, OverlayOutcome, OverlaySettings, VideoCombiner,
};

#[tokio::test]
async fn test_runner_reports_stderr_on_failure() {
    let dir = TempDir::new().unwrap();
    let runner = FfmpegRunner::new(fake_ffmpeg(dir.path()));

    let cmd = FfmpegCommand::new(dir.path().join("out.mp4")).input(dir.path().join("corrupt.mp4"));
    let err = runner.run(&cmd).await.unwrap_err();

    match err {
        MediaError::FfmpegFailed {
            stderr, exit_code, ..
        } => {
            assert_eq!(exit_code, Some(1));
            assert!(stderr.unwrap().contains("Invalid data found"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_runner_timeout_kills_process() {
    let dir = TempDir::new().unwrap();
    let runner = FfmpegRunner::new(fake_ffmpeg(dir.path())).with_timeout(Duration::from_millis(200));

    let cmd = FfmpegCommand::new(dir.path().join("out.mp4")).input(dir.path().join("slow.mp4"));
    let started = std::time::Instant::now();
    let err = runner.run(&cmd).await.unwrap_err();

    assert!(matches!(err, MediaError::Timeout(_)));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_runner_cancellation() {
    let dir = TempDir::new().unwrap();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let runner = FfmpegRunner::new(fake_ffmpeg(dir.path())).with_cancel(cancel_rx);

    let cmd = FfmpegCommand::new(dir.path().join("out.mp4")).input(dir.path().join("slow.mp4"));
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_tx.send(true).unwrap();
    };
    let (result, _) = tokio::join!(runner.run(&cmd), cancel);

    assert!(matches!(result, Err(MediaError::Cancelled)));
}

#[tokio::test]
async fn test_media_duration_from_info_output() {
    let dir = TempDir::new().unwrap();
    let runner = FfmpegRunner::new(fake_ffmpeg(dir.path()));
    let clip = touch(&dir.path().join("clip.mp4"));

    assert_eq!(media_duration(&runner, &clip).await.unwrap(), 10.0);
    assert!(matches!(
        media_duration(&runner, dir.path().join("missing.mp4")).await,
        Err(MediaError::FileNotFound(_))
    ));
}

#[tokio::test]
async fn test_combine_writes_each_combination() {
    let dir = TempDir::new().unwrap();
    let runner = FfmpegRunner::new(fake_ffmpeg(dir.path()));
    let combiner = VideoCombiner::new(runner, CombineSettings::default());

    let mut blocks = BTreeMap::new();
    blocks.insert(
        "block1".to_string(),
        vec![touch(&dir.path().join("video/block1/a.mp4"))],
    );
    blocks.insert(
        "block2".to_string(),
        vec![
            touch(&dir.path().join("video/block2/x.mp4")),
            touch(&dir.path().join("video/block2/corrupt.mp4")),
        ],
    );

    let raw_dir = dir.path().join("combined_movies_raw");
    let combos = enumerate(&blocks, 10).unwrap();
    assert_eq!(combos.len(), 2);

    let first = combiner.combine_into(&combos[0], &raw_dir).await.unwrap();
    assert_eq!(first, raw_dir.join("combo_001.mp4"));
    assert!(first.exists());

    let second = combiner.combine_into(&combos[1], &raw_dir).await;
    assert!(matches!(second, Err(MediaError::CombineFailed { .. })));
    assert!(!raw_dir.join("combo_002.mp4").exists());

    let concat = invocations(dir.path())
        .into_iter()
        .find(|line| line.contains("concat=n=2"))
        .unwrap();
    assert!(concat.contains("-map [outv] -c:v libx264"));
}

#[tokio::test]
async fn test_corrupt_background_skips_only_that_video() {
    let dir = TempDir::new().unwrap();
    let runner = FfmpegRunner::new(fake_ffmpeg(dir.path()));
    let overlay = AudioOverlay::new(
        runner,
        OverlaySettings::default(),
        dir.path().join("tmp_audio"),
        dir.path().join("done"),
    );

    let video_a = touch(&dir.path().join("combined_movies_raw/combo_001.mp4"));
    let video_b = touch(&dir.path().join("combined_movies_raw/combo_002.mp4"));
    let bad_bg = touch(&dir.path().join("audio/a1/corrupt_bg.mp3"));
    let good_bg = touch(&dir.path().join("audio/a1/calm.mp3"));
    let voice = touch(&dir.path().join("voice/v1/tts_sarah.mp3"));

    let skipped = overlay.overlay_with(&video_a, &bad_bg, &voice).await.unwrap();
    assert!(matches!(skipped, OverlayOutcome::Skipped { .. }));

    let finished = overlay.overlay_with(&video_b, &good_bg, &voice).await.unwrap();
    assert_eq!(
        finished,
        OverlayOutcome::Finished(dir.path().join("done/combo_002.mp4"))
    );

    let done: Vec<PathBuf> = std::fs::read_dir(dir.path().join("done"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(done, vec![dir.path().join("done/combo_002.mp4")]);

    // 10s video over 10s background loops twice
    let mix = invocations(dir.path())
        .into_iter()
        .find(|line| line.contains("amix"))
        .unwrap();
    assert!(mix.contains("-stream_loop 2"));
    assert!(mix.contains("-c:v copy -c:a aac -ar 44100 -ac 2 -shortest"));

    // Recoded intermediates are cleaned up
    assert_eq!(
        std::fs::read_dir(dir.path().join("tmp_audio")).unwrap().count(),
        0
    );
}

#[tokio::test]
async fn test_empty_pool_skips() {
    let dir = TempDir::new().unwrap();
    let overlay = AudioOverlay::new(
        FfmpegRunner::new(fake_ffmpeg(dir.path())),
        OverlaySettings::default(),
        dir.path().join("tmp_audio"),
        dir.path().join("done"),
    );
    let video = touch(&dir.path().join("combo_001.mp4"));

    let pools = AudioPools::new(Vec::new(), vec![touch(&dir.path().join("v.mp3"))]);
    let outcome = overlay.overlay(&video, &pools).await.unwrap();
    assert!(matches!(outcome, OverlayOutcome::Skipped { .. }));
}
