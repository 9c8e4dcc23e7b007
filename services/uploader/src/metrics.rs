//! Prometheus metrics for upload runs
//!
//! The scheduler emits per-attempt metrics (`uploader_attempts_total`,
//! `uploader_attempt_duration_seconds`, `uploader_credentials_exhausted_total`);
//! this module adds per-file metrics and renders everything to a textfile for
//! node_exporter's textfile collector, since a batch CLI has no scrape endpoint.
//!
//! - `uploader_tasks_total` (counter): label `outcome`
//! - `uploader_bytes_uploaded_total` (counter)

use std::path::Path;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Attempt durations range from sub-second failures to hour-long uploads.
const ATTEMPT_DURATION_BUCKETS: &[f64] = &[
    0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        metrics_exporter_prometheus::Matcher::Full("uploader_attempt_duration_seconds".to_string()),
        ATTEMPT_DURATION_BUCKETS,
    )
}

/// Build a recorder with histogram buckets for attempt durations.
#[cfg(test)]
fn build_recorder() -> Result<metrics_exporter_prometheus::PrometheusRecorder, BuildError> {
    Ok(builder()?.build_recorder())
}

/// Install the recorder globally and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record one finished file with its outcome label.
pub fn record_task(outcome: &str) {
    metrics::counter!("uploader_tasks_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_bytes_uploaded(bytes: u64) {
    metrics::counter!("uploader_bytes_uploaded_total").increment(bytes);
}

/// Write the rendered exposition text atomically (temp file + rename).
pub fn write_textfile(handle: &PrometheusHandle, path: &Path) -> std::io::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, handle.render())?;
    std::fs::rename(&tmp, path)
}
