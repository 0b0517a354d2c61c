//! The `UploadActivity` trait — the contract every activity backend must fulfil.

use async_trait::async_trait;

use crate::types::{ActivityContext, Packet};
use crate::ActivityError;

/// Receives intermediate results pushed by a long-running activity.
///
/// The coordinator implements this over its append-only results log; the
/// reporting activity only ever sees the narrow sink interface.
pub trait ResultSink: Send + Sync {
    fn push_result(&self, result: String);
}

/// The core activity trait.
///
/// Implementations run outside the coordinator's logical flow (on the tokio
/// executor) and may be slow; the engine bounds each call with a
/// start-to-close timeout and retries `Retryable` failures.
#[async_trait]
pub trait UploadActivity: Send + Sync {
    /// Produce the packet universe for one coordinator run.
    async fn generate_packets(
        &self,
        ctx: &ActivityContext,
    ) -> Result<Vec<Packet>, ActivityError>;

    /// Upload one group's accumulated batch after its quorum was reached.
    ///
    /// Returns a one-line summary of the upload, recorded in the
    /// coordinator's results log.
    async fn upload_batch(
        &self,
        group_key: u32,
        batch: Vec<Packet>,
        ctx: &ActivityContext,
    ) -> Result<String, ActivityError>;

    /// Invoke third-party services that report back asynchronously.
    ///
    /// Each intermediate result is pushed into `sink` as it arrives. The
    /// default implementation reports nothing.
    async fn invoke_services(
        &self,
        _sink: &dyn ResultSink,
        _ctx: &ActivityContext,
    ) -> Result<(), ActivityError> {
        Ok(())
    }
}
