//! Shared data types crossing the engine/activity boundary.
//!
//! Defined here (in the activities crate) so both the engine and individual
//! activity implementations can import them without a circular dependency.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque unit of work, immutable once created.
///
/// Packets sharing a `group_key` belong to the same quorum group;
/// `sequence_id` is unique within that group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Identifies the quorum group this packet belongs to.
    pub group_key: u32,
    /// Unique within the group.
    pub sequence_id: u32,
    /// Opaque content carried to the upload activity.
    pub payload: String,
}

impl Packet {
    pub fn new(group_key: u32, sequence_id: u32, payload: impl Into<String>) -> Self {
        Self {
            group_key,
            sequence_id,
            payload: payload.into(),
        }
    }
}

/// Shared context passed to every activity invocation.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    /// ID of the coordinator run that issued the call.
    pub workflow_id: Uuid,
    /// ID of the individual invocation.
    pub invocation_id: Uuid,
}

impl ActivityContext {
    /// Fresh context for a new invocation within the given run.
    pub fn for_run(workflow_id: Uuid) -> Self {
        Self {
            workflow_id,
            invocation_id: Uuid::new_v4(),
        }
    }
}
