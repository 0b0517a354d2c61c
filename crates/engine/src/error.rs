//! Engine-level error types.

use thiserror::Error;

use activities::ActivityError;

/// Errors produced by the quorum engine (signal validation + group actions).
///
/// `Clone` is derived because a group's outcome is broadcast to every waiter
/// over a watch channel.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    // ------ Signal errors ------

    /// A signal named a key no group was ever seeded for.
    #[error("no group registered for key {key}")]
    UnknownGroupKey { key: u32 },

    /// A packet was rejected at the router boundary.
    #[error("invalid signal payload: {reason}")]
    InvalidPayload { reason: String },

    // ------ Action errors ------

    /// A group's upload action failed fatally.
    #[error("group {key} upload failed: {message}")]
    ActionFailed { key: u32, message: String },

    /// A group's upload action exhausted its retry budget.
    #[error("group {key} upload exceeded retry limit: {message}")]
    ActionRetryExhausted { key: u32, message: String },

    /// Race mode can no longer reach its target group count.
    #[error("quorum of groups unreachable: needed {needed}, completed {completed}")]
    QuorumIncomplete { needed: usize, completed: usize },

    // ------ Activity errors outside any group ------

    /// A coordinator-level activity call (e.g. universe generation) failed.
    #[error("activity error: {0}")]
    Activity(#[from] ActivityError),
}
