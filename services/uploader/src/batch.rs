//! Batch upload driver
//!
//! Walks the input directory, turns every regular file into a transfer task
//! whose destination mirrors the file's parent directory, and runs the
//! rotation scheduler on each file in turn with one shared credential pool.
//!
//! A fatal failure is recorded against its file and the batch moves on. Every
//! other failure (pool exhausted, tool unavailable, cancelled, configuration)
//! would repeat for the remaining files, so the batch stops and the rest are
//! reported as skipped.

use std::path::{Component, Path, PathBuf};

use rotation::{Completed, CredentialPool, Scheduler};
use tracing::{Instrument, info, info_span, warn};
use transfer::TransferTask;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::metrics;

/// One file found under the input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: PathBuf,
    /// Path relative to the input directory.
    pub relative: PathBuf,
    pub size: u64,
}

impl UploadFile {
    pub fn task(&self) -> TransferTask {
        TransferTask::new(self.path.clone(), destination_for(&self.relative)).with_size(self.size)
    }
}

/// Remote destination for a relative file path: its parent directory with
/// `/` separators, or `/` for files at the top level.
pub fn destination_for(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .parent()
        .into_iter()
        .flat_map(|p| p.components())
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        "/".to_string()
    } else {
        parts.join("/")
    }
}

/// Collect every regular file under `input_dir`, sorted by path.
pub fn collect_files(input_dir: &Path) -> Result<Vec<UploadFile>> {
    if !input_dir.is_dir() {
        return Err(Error::InputNotFound(input_dir.display().to_string()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Walk(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry
            .metadata()
            .map_err(|e| Error::Walk(e.to_string()))?
            .len();
        let relative = entry
            .path()
            .strip_prefix(input_dir)
            .map_err(|e| Error::Walk(e.to_string()))?
            .to_path_buf();
        files.push(UploadFile {
            path: entry.path().to_path_buf(),
            relative,
            size,
        });
    }
    Ok(files)
}

/// Result for one file.
#[derive(Debug)]
pub struct FileOutcome {
    pub file: UploadFile,
    pub result: rotation::Result<Completed>,
}

/// Everything that happened in a batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
    /// Files never attempted because an earlier failure stopped the batch.
    pub skipped: Vec<UploadFile>,
}

impl BatchReport {
    pub fn total_files(&self) -> usize {
        self.outcomes.len() + self.skipped.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.file.size)
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&UploadFile, &rotation::Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.file, e)))
    }

    /// The error that stopped the batch, if any.
    pub fn stopped_by(&self) -> Option<&rotation::Error> {
        self.failures().map(|(_, e)| e).find(|e| e.stops_batch())
    }

    /// Process exit code: 0 when every file was uploaded, else the code of
    /// the error that stopped the batch, else the code of the first failure.
    pub fn exit_code(&self) -> i32 {
        if let Some(err) = self.stopped_by() {
            return err.exit_code();
        }
        self.failures()
            .map(|(_, e)| e.exit_code())
            .next()
            .unwrap_or(0)
    }

    /// Log the final summary.
    pub fn log_summary(&self) {
        let total = self.total_files();
        let succeeded = self.succeeded();
        if succeeded == total {
            info!(
                succeeded,
                total,
                bytes = self.uploaded_bytes(),
                "upload completed: {succeeded}/{total} files uploaded"
            );
            return;
        }

        warn!(
            succeeded,
            total,
            bytes = self.uploaded_bytes(),
            "upload completed: {succeeded}/{total} files uploaded"
        );
        for (file, err) in self.failures() {
            warn!(
                file = %file.relative.display(),
                kind = err.kind(),
                error = %err,
                hint = err.hint(),
                "file failed"
            );
        }
        if let Some(err) = self.stopped_by() {
            for file in &self.skipped {
                warn!(
                    file = %file.relative.display(),
                    reason = err.kind(),
                    "file skipped"
                );
            }
        }
    }
}

/// Upload `files` one after another through `scheduler`.
pub async fn run_batch(
    scheduler: &Scheduler,
    pool: &mut CredentialPool,
    files: Vec<UploadFile>,
) -> BatchReport {
    let total = files.len();
    let total_bytes: u64 = files.iter().map(|f| f.size).sum();
    let mut uploaded_bytes = 0u64;
    let mut report = BatchReport::default();
    let mut files = files.into_iter();

    for (index, file) in files.by_ref().enumerate() {
        let task = file.task();
        let progress = format!("{}/{}", index + 1, total);
        let span = info_span!(
            "file",
            file = %file.relative.display(),
            progress = %progress,
            batch_uploaded_bytes = uploaded_bytes,
            batch_total_bytes = total_bytes
        );
        info!(
            parent: &span,
            destination = %task.destination,
            size = file.size,
            "uploading file"
        );

        let result = scheduler.run(&task, pool).instrument(span).await;
        match &result {
            Ok(done) => {
                uploaded_bytes += file.size;
                metrics::record_task("success");
                metrics::record_bytes_uploaded(file.size);
                info!(
                    file = %file.relative.display(),
                    credential = %done.credential,
                    attempts = done.attempts,
                    batch_uploaded_bytes = uploaded_bytes,
                    batch_total_bytes = total_bytes,
                    batch_percent = batch_percent(uploaded_bytes, total_bytes),
                    "file uploaded"
                );
            }
            Err(err) => {
                metrics::record_task(err.kind());
                warn!(file = %file.relative.display(), error = %err, "file failed");
            }
        }

        let stop = result.as_ref().err().is_some_and(|e| e.stops_batch());
        report.outcomes.push(FileOutcome { file, result });
        if stop {
            break;
        }
    }

    report.skipped.extend(files);
    report
}

/// Share of the batch's bytes uploaded so far; an all-empty batch counts as done.
fn batch_percent(uploaded: u64, total: u64) -> u64 {
    if total == 0 {
        100
    } else {
        (uploaded.saturating_mul(100) / total).min(100)
    }
}
