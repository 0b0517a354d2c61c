//! Signal router: the inbound boundary for external notifications.
//!
//! Routing is fire-and-forget — no caller ever blocks on delivery. Signals
//! for unknown keys are discarded with a warning rather than creating a
//! group, so garbled or malicious keys cannot grow the group map.

use std::sync::Arc;

use tracing::warn;

use activities::Packet;

use crate::collector::GroupCollector;
use crate::error::EngineError;

/// Cheap cloneable handle that dispatches typed external events to the
/// matching quorum group.
#[derive(Clone)]
pub struct SignalRouter {
    collector: Arc<GroupCollector>,
}

impl SignalRouter {
    pub(crate) fn new(collector: Arc<GroupCollector>) -> Self {
        Self { collector }
    }

    /// Deliver a payload-free approval for `group_key`.
    pub fn approve(&self, group_key: u32) {
        if let Err(err) = self.collector.deliver_approval(group_key) {
            warn!("discarding approval signal: {err}");
        }
    }

    /// Deliver a payload-bearing packet to its group.
    pub fn submit(&self, packet: Packet) {
        if let Err(err) = validate(&packet) {
            warn!("rejecting submit signal: {err}");
            return;
        }
        if let Err(err) = self.collector.deliver_item(packet) {
            warn!("discarding submit signal: {err}");
        }
    }
}

/// Boundary validation: malformed packets never reach group state.
fn validate(packet: &Packet) -> Result<(), EngineError> {
    if packet.payload.is_empty() {
        return Err(EngineError::InvalidPayload {
            reason: "empty payload".into(),
        });
    }
    if packet.sequence_id == 0 {
        return Err(EngineError::InvalidPayload {
            reason: "sequence id must be non-zero".into(),
        });
    }
    Ok(())
}
