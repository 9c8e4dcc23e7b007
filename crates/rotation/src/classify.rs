//! Attempt classification
//!
//! Different transfer tools report quota exhaustion differently, so the mapping
//! from (exit code, output) to an `AttemptResult` is a table loaded from
//! configuration. The defaults target rclone's Google Drive backend run with
//! `--drive-stop-on-upload-limit`; verify them against the installed rclone.
//!
//! Precedence, first match wins:
//! 1. exit code 0 → Success
//! 2. killed by signal → FatalFailure
//! 3. quota pattern in output → QuotaExceeded
//! 4. quota exit code → QuotaExceeded
//! 5. transient pattern in output → TransientFailure
//! 6. transient exit code → TransientFailure
//! 7. anything else → FatalFailure
//!
//! Pattern matching is case-insensitive substring search.

use serde::Deserialize;
use transfer::AttemptOutput;

use crate::error::{Error, Result};

/// Outcome of one attempt with one credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    Success,
    /// Credential-specific limit reached, rotate to the next credential
    QuotaExceeded,
    /// Retryable on the same credential (network hiccup, backend 5xx)
    TransientFailure,
    /// Not retryable, stop the run
    FatalFailure,
}

impl AttemptResult {
    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            AttemptResult::Success => "success",
            AttemptResult::QuotaExceeded => "quota_exceeded",
            AttemptResult::TransientFailure => "transient_failure",
            AttemptResult::FatalFailure => "fatal_failure",
        }
    }
}

/// A classified attempt together with the rule that decided it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub result: AttemptResult,
    /// Human-readable rule, e.g. `pattern "userRateLimitExceeded"` or `exit code 5`.
    pub matched: Option<String>,
}

impl Classification {
    fn new(result: AttemptResult, matched: Option<String>) -> Self {
        Self { result, matched }
    }
}

/// Exit-code and output-pattern table deciding quota vs transient vs fatal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassificationTable {
    pub quota_exit_codes: Vec<i32>,
    pub quota_patterns: Vec<String>,
    pub transient_exit_codes: Vec<i32>,
    pub transient_patterns: Vec<String>,
}

impl Default for ClassificationTable {
    /// rclone defaults: exit 8 is `--max-transfer` reached, exit 5 is rclone's
    /// "temporary error". `userRateLimitExceeded` is the Drive 750 GB/day
    /// upload cap surfaced by `--drive-stop-on-upload-limit`.
    fn default() -> Self {
        Self {
            quota_exit_codes: vec![8],
            quota_patterns: [
                "userRateLimitExceeded",
                "upload limit exceeded",
                "dailyLimitExceeded",
                "quotaExceeded",
                "storageQuotaExceeded",
                "max transfer limit reached",
            ]
            .map(String::from)
            .to_vec(),
            transient_exit_codes: vec![5],
            transient_patterns: [
                "rateLimitExceeded",
                "connection reset by peer",
                "i/o timeout",
                "TLS handshake timeout",
                "502 Bad Gateway",
                "503 Service Unavailable",
                "internal error encountered",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl ClassificationTable {
    /// Reject tables that could misclassify every attempt.
    pub fn validate(&self) -> Result<()> {
        for code in self.quota_exit_codes.iter().chain(&self.transient_exit_codes) {
            if *code == 0 {
                return Err(Error::Configuration(
                    "exit code 0 always means success and cannot be classified".into(),
                ));
            }
        }
        if let Some(code) = self
            .quota_exit_codes
            .iter()
            .find(|c| self.transient_exit_codes.contains(c))
        {
            return Err(Error::Configuration(format!(
                "exit code {code} is listed as both quota and transient"
            )));
        }
        let empty_pattern = self
            .quota_patterns
            .iter()
            .chain(&self.transient_patterns)
            .any(|p| p.trim().is_empty());
        if empty_pattern {
            return Err(Error::Configuration(
                "classification patterns must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Classify one attempt's output.
    pub fn classify(&self, attempt: &AttemptOutput) -> Classification {
        let code = match attempt.exit_code {
            Some(0) => return Classification::new(AttemptResult::Success, None),
            Some(code) => code,
            None => {
                return Classification::new(
                    AttemptResult::FatalFailure,
                    Some("terminated by signal".into()),
                );
            }
        };

        let lower = attempt.output.to_lowercase();

        if let Some(pattern) = find_pattern(&self.quota_patterns, &lower) {
            return Classification::new(AttemptResult::QuotaExceeded, Some(pattern));
        }
        if self.quota_exit_codes.contains(&code) {
            return Classification::new(
                AttemptResult::QuotaExceeded,
                Some(format!("exit code {code}")),
            );
        }
        if let Some(pattern) = find_pattern(&self.transient_patterns, &lower) {
            return Classification::new(AttemptResult::TransientFailure, Some(pattern));
        }
        if self.transient_exit_codes.contains(&code) {
            return Classification::new(
                AttemptResult::TransientFailure,
                Some(format!("exit code {code}")),
            );
        }
        Classification::new(AttemptResult::FatalFailure, None)
    }
}

fn find_pattern(patterns: &[String], lower_output: &str) -> Option<String> {
    patterns
        .iter()
        .find(|p| lower_output.contains(&p.to_lowercase()))
        .map(|p| format!("pattern {p:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(code: Option<i32>, output: &str) -> AttemptResult {
        ClassificationTable::default()
            .classify(&AttemptOutput::new(code, output))
            .result
    }

    #[test]
    fn zero_exit_is_success_even_with_error_text() {
        assert_eq!(
            classify(Some(0), "ERROR : retrying after userRateLimitExceeded"),
            AttemptResult::Success
        );
    }

    #[test]
    fn signal_is_fatal() {
        let c = ClassificationTable::default().classify(&AttemptOutput::new(None, ""));
        assert_eq!(c.result, AttemptResult::FatalFailure);
        assert_eq!(c.matched.as_deref(), Some("terminated by signal"));
    }

    #[test]
    fn upload_limit_message_is_quota() {
        let out = "Failed to copy: googleapi: Error 403: User rate limit exceeded., userRateLimitExceeded\nFatal error: upload limit exceeded";
        let c = ClassificationTable::default().classify(&AttemptOutput::new(Some(7), out));
        assert_eq!(c.result, AttemptResult::QuotaExceeded);
        assert_eq!(c.matched.as_deref(), Some("pattern \"userRateLimitExceeded\""));
    }

    #[test]
    fn quota_pattern_is_case_insensitive() {
        assert_eq!(
            classify(Some(7), "FATAL: USERRATELIMITEXCEEDED"),
            AttemptResult::QuotaExceeded
        );
    }

    #[test]
    fn quota_pattern_wins_over_transient_exit_code() {
        assert_eq!(
            classify(Some(5), "storageQuotaExceeded"),
            AttemptResult::QuotaExceeded
        );
    }

    #[test]
    fn max_transfer_exit_code_is_quota() {
        let c = ClassificationTable::default().classify(&AttemptOutput::new(Some(8), ""));
        assert_eq!(c.result, AttemptResult::QuotaExceeded);
        assert_eq!(c.matched.as_deref(), Some("exit code 8"));
    }

    #[test]
    fn plain_rate_limit_is_transient() {
        assert_eq!(
            classify(Some(1), "googleapi: Error 403: Rate Limit Exceeded, rateLimitExceeded"),
            AttemptResult::TransientFailure
        );
    }

    #[test]
    fn temporary_error_exit_code_is_transient() {
        assert_eq!(classify(Some(5), "something odd"), AttemptResult::TransientFailure);
    }

    #[test]
    fn network_reset_is_transient() {
        assert_eq!(
            classify(Some(1), "read tcp: connection reset by peer"),
            AttemptResult::TransientFailure
        );
    }

    #[test]
    fn unrecognized_failure_is_fatal() {
        assert_eq!(
            classify(Some(3), "directory not found"),
            AttemptResult::FatalFailure
        );
        assert_eq!(classify(Some(1), "unknown flag: --bogus"), AttemptResult::FatalFailure);
    }

    #[test]
    fn custom_table_replaces_defaults() {
        let table = ClassificationTable {
            quota_exit_codes: vec![42],
            quota_patterns: vec![],
            transient_exit_codes: vec![],
            transient_patterns: vec!["try again".into()],
        };
        let quota = table.classify(&AttemptOutput::new(Some(42), ""));
        assert_eq!(quota.result, AttemptResult::QuotaExceeded);
        let transient = table.classify(&AttemptOutput::new(Some(1), "please TRY AGAIN"));
        assert_eq!(transient.result, AttemptResult::TransientFailure);
        let fatal = table.classify(&AttemptOutput::new(Some(8), "userRateLimitExceeded"));
        assert_eq!(fatal.result, AttemptResult::FatalFailure);
    }

    #[test]
    fn default_table_is_valid() {
        ClassificationTable::default().validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_exit_code() {
        let table = ClassificationTable {
            quota_exit_codes: vec![0],
            ..Default::default()
        };
        assert!(matches!(table.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn validate_rejects_overlapping_codes() {
        let table = ClassificationTable {
            quota_exit_codes: vec![5],
            transient_exit_codes: vec![5],
            ..Default::default()
        };
        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains("exit code 5"), "got: {err}");
    }

    #[test]
    fn validate_rejects_empty_pattern() {
        let table = ClassificationTable {
            transient_patterns: vec!["  ".into()],
            ..Default::default()
        };
        assert!(table.validate().is_err());
    }

    #[test]
    fn deserializes_partial_table_with_defaults() {
        let table: ClassificationTable = toml::from_str("quota_exit_codes = [9]\n").unwrap();
        assert_eq!(table.quota_exit_codes, vec![9]);
        assert_eq!(
            table.transient_exit_codes,
            ClassificationTable::default().transient_exit_codes
        );
    }

    #[test]
    fn labels_are_snake_case() {
        assert_eq!(AttemptResult::QuotaExceeded.label(), "quota_exceeded");
        assert_eq!(AttemptResult::TransientFailure.label(), "transient_failure");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn quota_after_non_utf8_file_name_is_still_quota() {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(
            "printf 'Copying caf\\351.txt\\n' >&2; \
             echo 'Fatal error: googleapi: Error 403: userRateLimitExceeded' >&2; exit 7",
        );
        let out = transfer::run_and_capture(cmd, "sa-1").await.unwrap();
        assert_eq!(
            ClassificationTable::default().classify(&out).result,
            AttemptResult::QuotaExceeded,
            "output: {}",
            out.output
        );
    }
}
