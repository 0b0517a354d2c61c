//! Activity-level error type.

use thiserror::Error;

/// Errors returned by an activity invocation.
///
/// The engine uses the variant to decide retry behaviour:
/// - `Retryable` — the invocation is re-attempted with exponential back-off.
/// - `Fatal`     — the owning group's outcome is immediately failed.
#[derive(Debug, Error, Clone)]
pub enum ActivityError {
    /// Transient failure; the dispatcher should re-try the call.
    #[error("retryable activity error: {0}")]
    Retryable(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal activity error: {0}")]
    Fatal(String),
}
