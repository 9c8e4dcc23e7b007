//! Credential rotation around a fallible external transfer tool
//!
//! Drives attempts for one transfer task across a pool of credentials:
//! 1. Pool yields the not-yet-exhausted credentials in selection-policy order
//! 2. Scheduler invokes the transfer tool with the first of them
//! 3. The classification table maps the exit status and output to a result
//! 4. Quota exhaustion marks the credential exhausted and rotates to the next
//! 5. Transient failures retry the same credential with backoff, up to a bound
//! 6. Anything unrecognized stops the run (fail-closed)
//!
//! The pool is an explicit value owned by the caller and passed by `&mut`, so
//! credentials exhausted during one task stay exhausted for the next task of
//! the same batch.

pub mod classify;
pub mod error;
pub mod pool;
pub mod scheduler;

pub use classify::{AttemptResult, Classification, ClassificationTable};
pub use error::{Error, Result};
pub use pool::{CredentialPool, CredentialStatus, PoolCounts, SelectionPolicy};
pub use scheduler::{
    Completed, MAX_TRANSIENT_RETRIES, RetryPolicy, Scheduler, Step, next_step,
};
