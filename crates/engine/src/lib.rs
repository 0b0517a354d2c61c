//! `engine` crate — signal routing, per-group quorum state machines, and the
//! upload coordinator.

pub mod models;
pub mod error;
pub mod group;
pub mod collector;
pub mod router;
pub mod coordinator;

pub use models::{CompletionMode, Phase, RunSummary, SeedPolicy, WaitOutcome};
pub use error::EngineError;
pub use group::{Arrival, GroupState, QuorumGroup};
pub use collector::{ActionConfig, GroupCollector};
pub use router::SignalRouter;
pub use coordinator::{CoordinatorConfig, ResultsLog, UploadCoordinator};

#[cfg(test)]
mod coordinator_tests;
