//! Core domain models for the quorum engine.
//!
//! These types are the source of truth for how a coordinator run is
//! configured and what it reports back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use activities::Packet;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Lifecycle of one coordinator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Generating the packet universe and seeding groups.
    Initializing,
    /// Groups seeded; signals are being accepted.
    AwaitingSignals,
    /// The bulk wait has resolved; finalizing the run.
    Completing,
    /// Terminal.
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Initializing => write!(f, "initializing"),
            Phase::AwaitingSignals => write!(f, "awaiting_signals"),
            Phase::Completing => write!(f, "completing"),
            Phase::Done => write!(f, "done"),
        }
    }
}

// ---------------------------------------------------------------------------
// CompletionMode
// ---------------------------------------------------------------------------

/// How the coordinator decides the run is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletionMode {
    /// Wait for every seeded group's upload to resolve.
    AllGroups,
    /// Race mode: finish once this many groups have uploaded successfully.
    FirstN { required: usize },
}

// ---------------------------------------------------------------------------
// SeedPolicy
// ---------------------------------------------------------------------------

/// What a freshly seeded group starts out holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedPolicy {
    /// The universe packets for a key become the group's initial batch;
    /// approvals only count toward quorum (counter-only groups).
    PreloadUniverse,
    /// The universe only establishes the set of valid keys; groups start
    /// empty and accumulate submitted packets (payload-bearing groups).
    KeysOnly,
}

// ---------------------------------------------------------------------------
// WaitOutcome
// ---------------------------------------------------------------------------

/// Result of a bulk wait with an optional deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every awaited group resolved.
    Completed,
    /// The deadline elapsed first. Nothing was cancelled; in-flight uploads
    /// keep running and can be awaited again.
    TimedOut,
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// End-to-end outcome of one coordinator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub workflow_id: Uuid,
    /// Groups whose upload action resolved successfully.
    pub completed_groups: usize,
    pub total_groups: usize,
    /// Whether the bulk wait hit its deadline before completion.
    pub timed_out: bool,
    pub finished_at: DateTime<Utc>,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.timed_out {
            write!(
                f,
                "timed out with {} of {} groups uploaded",
                self.completed_groups, self.total_groups
            )
        } else {
            write!(
                f,
                "uploaded {} of {} groups",
                self.completed_groups, self.total_groups
            )
        }
    }
}
