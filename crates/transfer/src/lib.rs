//! External transfer tool abstraction
//!
//! Defines the `Transfer` trait that decouples the rotation scheduler from the
//! tool that actually moves bytes. `RcloneTransfer` shells out to rclone with a
//! per-credential config; tests substitute scripted implementations.
//!
//! The trait reports raw results only (exit code and captured output). Deciding
//! whether a non-zero exit means quota exhaustion, a transient hiccup, or a
//! broken setup is the scheduler's job, driven by a configurable table.

pub mod process;
pub mod progress;
pub mod rclone;

pub use process::{run_and_capture, run_and_observe};
pub use progress::{TransferProgress, parse_stats_line};
pub use rclone::{RcloneOptions, RcloneTransfer, render_config};

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use credentials::Credential;

/// One requested unit of work: copy `source` into `destination` on the remote.
///
/// `destination` is a path relative to the remote root (`/` for the root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub source: PathBuf,
    pub destination: String,
    /// Source size in bytes, used to turn reported percentages into bytes.
    pub size: u64,
}

impl TransferTask {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            size: 0,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }
}

impl fmt::Display for TransferTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.display(), self.destination)
    }
}

/// Raw result of one external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr text.
    pub output: String,
    pub duration: Duration,
}

impl AttemptOutput {
    pub fn new(exit_code: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
            duration: Duration::ZERO,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last non-empty output line, truncated to 200 chars.
    pub fn summary(&self) -> String {
        let last_line = self
            .output
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
            .trim();

        if last_line.chars().nth(200).is_none() {
            last_line.to_string()
        } else {
            let truncated: String = last_line.chars().take(197).collect();
            format!("{truncated}...")
        }
    }
}

/// Errors raised before the tool produced an exit status.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The executable could not be started (missing binary, permissions).
    #[error("failed to spawn {binary}: {reason}")]
    Spawn { binary: String, reason: String },

    /// Per-credential tool configuration could not be prepared.
    #[error("failed to prepare tool config: {0}")]
    Config(String),

    #[error("I/O error while running tool: {0}")]
    Io(String),
}

/// Result alias for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;

/// Abstraction over the external tool that performs one transfer attempt.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transfer>`). Dropping the returned future must terminate any
/// process it started; the scheduler relies on that for cancellation.
pub trait Transfer: Send + Sync {
    /// Identifier for logging (e.g. "rclone").
    fn id(&self) -> &str;

    /// Run the tool once for `task` authorized by `credential`, blocking until
    /// it exits.
    fn attempt<'a>(
        &'a self,
        task: &'a TransferTask,
        credential: &'a Credential,
    ) -> Pin<Box<dyn Future<Output = Result<AttemptOutput>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_zero_exit() {
        assert!(AttemptOutput::new(Some(0), "").success());
        assert!(!AttemptOutput::new(Some(1), "").success());
        assert!(!AttemptOutput::new(None, "").success());
    }

    #[test]
    fn summary_empty() {
        assert_eq!(AttemptOutput::new(Some(0), "").summary(), "");
    }

    #[test]
    fn summary_takes_last_non_empty_line() {
        let out = AttemptOutput::new(Some(7), "Transferred: 0 B\nFatal error: quota\n\n  \n");
        assert_eq!(out.summary(), "Fatal error: quota");
    }

    #[test]
    fn summary_truncates_long_lines() {
        let long = "x".repeat(300);
        let summary = AttemptOutput::new(Some(1), long).summary();
        assert_eq!(summary.chars().count(), 200);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn task_display_shows_both_ends() {
        let task = TransferTask::new("/data/a.bin", "backups");
        assert_eq!(task.to_string(), "/data/a.bin -> backups");
    }

    #[test]
    fn spawn_error_names_binary() {
        let err = TransferError::Spawn {
            binary: "rclone".into(),
            reason: "No such file or directory".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to spawn rclone: No such file or directory"
        );
    }
}
