//! Prometheus metrics for the worker.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::error::{WorkerError, WorkerResult};

/// Install the recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    // Job metrics
    pub const JOBS_SUBMITTED_TOTAL: &str = "vmix_jobs_submitted_total";
    pub const JOBS_FINISHED_TOTAL: &str = "vmix_jobs_finished_total";
    pub const JOBS_ACTIVE: &str = "vmix_jobs_active";
    pub const JOB_DURATION_SECONDS: &str = "vmix_job_duration_seconds";

    // Stage metrics
    pub const DOWNLOADS_TOTAL: &str = "vmix_downloads_total";
    pub const DOWNLOAD_DURATION_SECONDS: &str = "vmix_download_duration_seconds";
    pub const VOICES_TOTAL: &str = "vmix_voices_total";
    pub const COMBINATIONS_TOTAL: &str = "vmix_combinations_total";
    pub const OVERLAYS_TOTAL: &str = "vmix_overlays_total";
    pub const UPLOADED_FILES_TOTAL: &str = "vmix_uploaded_files_total";
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "error"
    }
}

/// Record job submitted.
pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

/// Record a job reaching a terminal status.
pub fn record_job_finished(status: &str, duration_secs: f64) {
    let labels = [("status", status.to_string())];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Update active jobs gauge.
pub fn set_active_jobs(count: usize) {
    gauge!(names::JOBS_ACTIVE).set(count as f64);
}

/// Record one transfer.
pub fn record_download(ok: bool, duration_secs: f64) {
    counter!(names::DOWNLOADS_TOTAL, "status" => outcome(ok)).increment(1);
    if ok {
        histogram!(names::DOWNLOAD_DURATION_SECONDS).record(duration_secs);
    }
}

/// Record one voice line.
pub fn record_voice(ok: bool) {
    counter!(names::VOICES_TOTAL, "status" => outcome(ok)).increment(1);
}

/// Record one combination.
pub fn record_combination(ok: bool) {
    counter!(names::COMBINATIONS_TOTAL, "status" => outcome(ok)).increment(1);
}

/// Record one overlay; `status` is `finished`, `skipped` or `error`.
pub fn record_overlay(status: &'static str) {
    counter!(names::OVERLAYS_TOTAL, "status" => status).increment(1);
}

/// Record uploaded files.
pub fn record_uploaded_files(count: usize) {
    counter!(names::UPLOADED_FILES_TOTAL).increment(count as u64);
}
