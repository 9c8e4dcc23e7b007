//! Error types for rotation runs
//!
//! Every variant is a terminal outcome of `Scheduler::run`. Quota exhaustion
//! and transient failures are resolved inside the scheduler and never surface
//! here on their own.

use crate::pool::PoolCounts;

/// Terminal failure of a rotation run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Precondition violation (empty pool, invalid classification table).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every credential was tried for this task and none succeeded.
    #[error("pool exhausted: tried {attempted:?}; {counts}")]
    PoolExhausted {
        attempted: Vec<String>,
        counts: PoolCounts,
    },

    /// The tool ran and failed in a way that is neither quota nor transient.
    #[error("fatal failure with credential {credential} (exit code {exit_code:?}): {detail}")]
    Fatal {
        credential: String,
        exit_code: Option<i32>,
        detail: String,
    },

    /// The tool could not be run at all (missing binary, unwritable config).
    #[error("transfer tool unavailable with credential {credential}: {source}")]
    ToolUnavailable {
        credential: String,
        #[source]
        source: transfer::TransferError,
    },

    /// Interrupted or timed out; the in-flight attempt was terminated.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Short label for metrics and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::PoolExhausted { .. } => "pool_exhausted",
            Error::Fatal { .. } => "fatal",
            Error::ToolUnavailable { .. } => "tool_unavailable",
            Error::Cancelled => "cancelled",
        }
    }

    /// Process exit code for a run ending in this error.
    ///
    /// Codes follow sysexits(3) so scripts can tell "add credentials"
    /// (75, EX_TEMPFAIL) from "fix the install" (69/70) and "fix the
    /// configuration" (78, EX_CONFIG).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Configuration(_) => 78,
            Error::PoolExhausted { .. } => 75,
            Error::Fatal { .. } => 70,
            Error::ToolUnavailable { .. } => 69,
            Error::Cancelled => 130,
        }
    }

    /// Remediation hint shown next to the error in the final report.
    pub fn hint(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "fix the configuration or add credential files",
            Error::PoolExhausted { .. } => "all credentials hit their quota; add credentials or retry later",
            Error::Fatal { .. } => "the transfer failed for a non-quota reason; check the input and tool output",
            Error::ToolUnavailable { .. } => "the transfer tool could not be run; check the installation",
            Error::Cancelled => "the run was interrupted",
        }
    }

    /// Whether a batch should stop processing further tasks after this error.
    ///
    /// A fatal failure on one task is specific to that task; every other
    /// outcome would repeat for the remaining tasks.
    pub fn stops_batch(&self) -> bool {
        !matches!(self, Error::Fatal { .. })
    }
}

/// Result alias for rotation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn exhausted() -> Error {
        Error::PoolExhausted {
            attempted: vec!["a".into(), "b".into()],
            counts: PoolCounts {
                total: 2,
                available: 0,
                exhausted: 2,
            },
        }
    }

    #[test]
    fn exit_codes_distinguish_remediation() {
        let codes = [
            Error::Configuration("empty".into()).exit_code(),
            exhausted().exit_code(),
            Error::Fatal {
                credential: "a".into(),
                exit_code: Some(1),
                detail: "bad flag".into(),
            }
            .exit_code(),
            Error::Cancelled.exit_code(),
        ];
        let mut unique = codes.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), codes.len(), "codes: {codes:?}");
        assert!(codes.iter().all(|c| *c != 0));
    }

    #[test]
    fn pool_exhausted_display_lists_attempts_and_counts() {
        let msg = exhausted().to_string();
        assert!(msg.contains("\"a\""), "got: {msg}");
        assert!(msg.contains("total=2"), "got: {msg}");
    }

    #[test]
    fn only_fatal_lets_batch_continue() {
        assert!(
            !Error::Fatal {
                credential: "a".into(),
                exit_code: Some(3),
                detail: "directory not found".into(),
            }
            .stops_batch()
        );
        assert!(exhausted().stops_batch());
        assert!(Error::Cancelled.stops_batch());
        assert!(Error::Configuration("empty".into()).stops_batch());
    }

    #[test]
    fn tool_unavailable_keeps_source() {
        let err = Error::ToolUnavailable {
            credential: "a".into(),
            source: transfer::TransferError::Spawn {
                binary: "rclone".into(),
                reason: "not found".into(),
            },
        };
        assert_eq!(err.kind(), "tool_unavailable");
        assert!(std::error::Error::source(&err).is_some());
    }
}
