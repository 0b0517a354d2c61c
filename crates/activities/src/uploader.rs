//! `SimulatedUploader` — a demo backend that fakes slow uploads and
//! third-party service calls, logging what a real implementation would do.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::traits::{ResultSink, UploadActivity};
use crate::types::{ActivityContext, Packet};
use crate::ActivityError;

/// Simulates an upload backend: each batch upload takes `upload_delay`, and
/// `invoke_services` pushes a fixed set of service results spaced by
/// `service_delay`.
pub struct SimulatedUploader {
    universe: Vec<Packet>,
    upload_delay: Duration,
    service_delay: Duration,
    service_results: Vec<String>,
}

impl SimulatedUploader {
    /// Backend over the default three-packet universe (one group per packet).
    pub fn new() -> Self {
        let universe = (1..=3)
            .map(|k| Packet::new(k, k, format!("content{k}")))
            .collect();
        Self::with_universe(universe)
    }

    /// Backend over a caller-supplied universe.
    pub fn with_universe(universe: Vec<Packet>) -> Self {
        Self {
            universe,
            upload_delay: Duration::from_secs(1),
            service_delay: Duration::from_secs(3),
            service_results: vec!["result1".into(), "result2".into(), "result3".into()],
        }
    }

    /// Shrink the simulated delays (handy for demos and tests).
    pub fn with_delays(mut self, upload: Duration, service: Duration) -> Self {
        self.upload_delay = upload;
        self.service_delay = service;
        self
    }
}

impl Default for SimulatedUploader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UploadActivity for SimulatedUploader {
    async fn generate_packets(
        &self,
        _ctx: &ActivityContext,
    ) -> Result<Vec<Packet>, ActivityError> {
        Ok(self.universe.clone())
    }

    async fn upload_batch(
        &self,
        group_key: u32,
        batch: Vec<Packet>,
        ctx: &ActivityContext,
    ) -> Result<String, ActivityError> {
        // simulate the upload itself
        tokio::time::sleep(self.upload_delay).await;

        for packet in &batch {
            info!(
                invocation = %ctx.invocation_id,
                "uploaded packet with type: {} and id: {}",
                packet.group_key, packet.sequence_id
            );
        }
        Ok(format!(
            "uploaded {} packets for group {}",
            batch.len(),
            group_key
        ))
    }

    async fn invoke_services(
        &self,
        sink: &dyn ResultSink,
        _ctx: &ActivityContext,
    ) -> Result<(), ActivityError> {
        // simulate spaced third-party service invocations
        for result in &self.service_results {
            tokio::time::sleep(self.service_delay).await;
            sink.push_result(result.clone());
        }
        Ok(())
    }
}
