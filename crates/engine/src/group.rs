//! Per-key quorum state machine.
//!
//! A `QuorumGroup` counts arriving signals against a required threshold and
//! takes its fire transition exactly once, at the signal that makes
//! `received == required`. It is a pure synchronous state machine; the
//! collector owns the async side (dispatching the upload and resolving the
//! outcome).

use std::collections::BTreeSet;

use activities::Packet;

// ---------------------------------------------------------------------------
// GroupState
// ---------------------------------------------------------------------------

/// Lifecycle of a single group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupState {
    /// Quorum not yet reached.
    Pending,
    /// Quorum reached; the upload action has been dispatched.
    Triggered,
    /// The upload action completed successfully.
    Resolved,
    /// The upload action failed.
    Failed(String),
}

// ---------------------------------------------------------------------------
// Arrival
// ---------------------------------------------------------------------------

/// What applying one signal to a group did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// The signal was counted; quorum not (or no longer) the trigger point.
    Counted,
    /// This signal is the one that met the quorum; the caller must dispatch
    /// the group's action now.
    Fired,
    /// A packet with an already-seen sequence id; dropped without counting.
    Duplicate,
}

// ---------------------------------------------------------------------------
// QuorumGroup
// ---------------------------------------------------------------------------

/// Counts approvals/packets for one key against a required threshold.
///
/// Invariants: `received` is monotonically non-decreasing; for payload
/// groups `received` equals the number of distinct sequence ids recorded;
/// the fire transition is taken at most once, guarded by the equality
/// `received == required` while still `Pending`.
#[derive(Debug)]
pub struct QuorumGroup {
    key: u32,
    required: usize,
    received: usize,
    members: BTreeSet<u32>,
    items: Vec<Packet>,
    state: GroupState,
}

impl QuorumGroup {
    pub fn new(key: u32, required: usize) -> Self {
        Self {
            key,
            required,
            received: 0,
            members: BTreeSet::new(),
            items: Vec::new(),
            state: GroupState::Pending,
        }
    }

    /// Preload a packet into the group's batch without counting it toward
    /// quorum. Used when the universe packets themselves are the upload
    /// content and approvals merely gate it.
    pub fn seed_item(&mut self, packet: Packet) {
        self.items.push(packet);
    }

    /// Record a payload-free approval. Approvals are a raw count — repeated
    /// approvals from the same sender all count.
    pub fn record_approval(&mut self) -> Arrival {
        self.bump()
    }

    /// Record a payload-bearing packet. Packets are deduplicated by
    /// `sequence_id` so the count matches the distinct member set.
    pub fn record_item(&mut self, packet: Packet) -> Arrival {
        if !self.members.insert(packet.sequence_id) {
            return Arrival::Duplicate;
        }
        self.items.push(packet);
        self.bump()
    }

    fn bump(&mut self) -> Arrival {
        self.received += 1;
        if self.received == self.required && self.state == GroupState::Pending {
            self.state = GroupState::Triggered;
            Arrival::Fired
        } else {
            Arrival::Counted
        }
    }

    /// Current batch contents, cloned for dispatch.
    pub fn snapshot_batch(&self) -> Vec<Packet> {
        self.items.clone()
    }

    pub fn mark_resolved(&mut self) {
        self.state = GroupState::Resolved;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.state = GroupState::Failed(message.into());
    }

    pub fn key(&self) -> u32 {
        self.key
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn items(&self) -> &[Packet] {
        &self.items
    }

    pub fn state(&self) -> &GroupState {
        &self.state
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
