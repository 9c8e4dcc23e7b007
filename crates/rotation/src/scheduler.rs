//! Rotation scheduler
//!
//! Runs one transfer task to completion against a credential pool. Attempts
//! are strictly sequential: one tool invocation in flight, awaited before the
//! next decision. The decision itself is the pure `next_step` function; `run`
//! executes the I/O it implies.
//!
//! Cancellation is observed while an attempt is in flight and while sleeping
//! between transient retries. A cancelled attempt's future is dropped, which
//! kills the child process.

use std::sync::Arc;
use std::time::Duration;

use credentials::Credential;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use transfer::{AttemptOutput, Transfer, TransferTask};

use crate::classify::{AttemptResult, ClassificationTable};
use crate::error::{Error, Result};
use crate::pool::CredentialPool;

/// Default number of invocations of one credential that may fail transiently
/// before the scheduler gives up on that credential for the current task.
pub const MAX_TRANSIENT_RETRIES: u32 = 3;

/// Bounded same-credential retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_transient_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_transient_retries: MAX_TRANSIENT_RETRIES,
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }
}

/// What the scheduler does after classifying an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The task is done.
    Finish,
    /// Move to the next credential; `exhausted` marks this one in the pool.
    Rotate { exhausted: bool },
    /// Invoke the same credential again after `delay`.
    Retry { delay: Duration },
    /// Stop the run without trying further credentials.
    Abort,
}

/// Decide the next step. Pure function: no I/O.
///
/// `transient_failures` counts transient failures of the current credential
/// including this attempt.
pub fn next_step(result: AttemptResult, transient_failures: u32, retry: &RetryPolicy) -> Step {
    match result {
        AttemptResult::Success => Step::Finish,
        AttemptResult::QuotaExceeded => Step::Rotate { exhausted: true },
        AttemptResult::TransientFailure if transient_failures < retry.max_transient_retries => {
            Step::Retry {
                delay: retry.backoff(transient_failures),
            }
        }
        AttemptResult::TransientFailure => Step::Rotate { exhausted: false },
        AttemptResult::FatalFailure => Step::Abort,
    }
}

/// A successful run.
#[derive(Debug, Clone)]
pub struct Completed {
    /// The credential whose attempt succeeded.
    pub credential: Credential,
    /// Tool invocations made for this task, the successful one included.
    pub attempts: u32,
    pub output: AttemptOutput,
}

/// Drives attempts for a task, rotating credentials on quota exhaustion.
pub struct Scheduler {
    transfer: Arc<dyn Transfer>,
    table: ClassificationTable,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(transfer: Arc<dyn Transfer>, table: ClassificationTable, retry: RetryPolicy) -> Self {
        Self {
            transfer,
            table,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `token` to cancel runs from outside (signal handler, deadline).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `task` until one credential succeeds or the pool is exhausted.
    ///
    /// - Empty pool → `Configuration`, no attempt made
    /// - Success → `Ok(Completed)`
    /// - Every available credential exhausted or given up on → `PoolExhausted`
    /// - Unclassified failure → `Fatal`, remaining credentials untouched
    /// - Tool could not run → `ToolUnavailable`
    /// - Cancellation → `Cancelled`, in-flight attempt terminated
    pub async fn run(&self, task: &TransferTask, pool: &mut CredentialPool) -> Result<Completed> {
        if pool.is_empty() {
            return Err(Error::Configuration("credential pool is empty".into()));
        }
        if self.retry.max_transient_retries == 0 {
            return Err(Error::Configuration(
                "max_transient_retries must be greater than 0".into(),
            ));
        }

        let pass = pool.pass();
        debug!(%task, candidates = pass.len(), "starting rotation pass");

        let mut attempted = Vec::with_capacity(pass.len());
        let mut attempts = 0u32;

        for credential in pass {
            attempted.push(credential.id.clone());
            let mut transient_failures = 0u32;

            loop {
                if self.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                attempts += 1;
                let output = self.invoke(task, &credential).await?;
                let classification = self.table.classify(&output);
                let result = classification.result;
                if result == AttemptResult::TransientFailure {
                    transient_failures += 1;
                }

                metrics::counter!("uploader_attempts_total", "result" => result.label())
                    .increment(1);
                metrics::histogram!("uploader_attempt_duration_seconds")
                    .record(output.duration.as_secs_f64());

                match next_step(result, transient_failures, &self.retry) {
                    Step::Finish => {
                        info!(
                            %task,
                            credential = %credential,
                            attempts,
                            duration_ms = output.duration.as_millis() as u64,
                            "transfer succeeded"
                        );
                        return Ok(Completed {
                            credential,
                            attempts,
                            output,
                        });
                    }
                    Step::Rotate { exhausted: true } => {
                        warn!(
                            %task,
                            credential = %credential,
                            exit_code = ?output.exit_code,
                            matched = classification.matched.as_deref().unwrap_or(""),
                            "quota exceeded, rotating credential"
                        );
                        pool.mark_exhausted(&credential.id);
                        metrics::counter!("uploader_credentials_exhausted_total").increment(1);
                        break;
                    }
                    Step::Rotate { exhausted: false } => {
                        warn!(
                            %task,
                            credential = %credential,
                            transient_failures,
                            "transient retries exhausted, rotating credential"
                        );
                        break;
                    }
                    Step::Retry { delay } => {
                        warn!(
                            %task,
                            credential = %credential,
                            exit_code = ?output.exit_code,
                            matched = classification.matched.as_deref().unwrap_or(""),
                            retry = transient_failures,
                            delay_ms = delay.as_millis() as u64,
                            "transient failure, retrying same credential"
                        );
                        self.sleep(delay).await?;
                    }
                    Step::Abort => {
                        let detail = output.summary();
                        error!(
                            %task,
                            credential = %credential,
                            exit_code = ?output.exit_code,
                            detail = %detail,
                            "fatal failure, stopping rotation"
                        );
                        return Err(Error::Fatal {
                            credential: credential.id.clone(),
                            exit_code: output.exit_code,
                            detail,
                        });
                    }
                }
            }
        }

        let counts = pool.counts();
        warn!(%task, attempted = ?attempted, %counts, "credential pool exhausted");
        Err(Error::PoolExhausted { attempted, counts })
    }

    /// One cancellable tool invocation.
    async fn invoke(&self, task: &TransferTask, credential: &Credential) -> Result<AttemptOutput> {
        debug!(tool = self.transfer.id(), %task, credential = %credential, "attempt started");
        let attempt = self.transfer.attempt(task, credential);
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!(%task, credential = %credential, "cancelled, terminating in-flight attempt");
                return Err(Error::Cancelled);
            }
            result = attempt => result,
        };
        result.map_err(|source| Error::ToolUnavailable {
            credential: credential.id.clone(),
            source,
        })
    }

    async fn sleep(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
