//! Group collector: owns the key → group map, dispatches upload actions when
//! a group fires, and exposes the bulk wait primitives.
//!
//! Signal delivery (`deliver_approval`/`deliver_item`) is synchronous and
//! lock-brief — it never suspends, so it is safe to call from any task while
//! waiters are suspended elsewhere. Upload actions run on the tokio executor
//! (`tokio::spawn`), outside the coordinator's logical flow; their completion
//! is broadcast back through a per-group watch channel, which preserves the
//! required happens-before chain: quorum reached → action invoked → action
//! completed → outcome resolved.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use activities::{ActivityContext, ActivityError, Packet, ResultSink, UploadActivity};

use crate::error::EngineError;
use crate::group::{Arrival, GroupState, QuorumGroup};
use crate::models::WaitOutcome;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for upload-action dispatch.
#[derive(Debug, Clone)]
pub struct ActionConfig {
    /// Maximum number of times a retryable upload failure will be retried.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
    /// Budget for a single upload attempt (start-to-close).
    pub start_to_close: Duration,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            start_to_close: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal slot state
// ---------------------------------------------------------------------------

/// Broadcast value for one group's completion.
#[derive(Debug, Clone)]
enum GroupOutcome {
    Pending,
    Resolved(String),
    Failed(EngineError),
}

struct GroupSlot {
    group: QuorumGroup,
    /// Resolves waiters once the group's upload action finishes.
    outcome_tx: watch::Sender<GroupOutcome>,
    /// Tracks the number of accumulated batch items (for `wait_for_group`).
    items_tx: watch::Sender<usize>,
}

// ---------------------------------------------------------------------------
// GroupCollector
// ---------------------------------------------------------------------------

/// Manages the set of active quorum groups for one coordinator run.
pub struct GroupCollector {
    slots: Arc<Mutex<HashMap<u32, GroupSlot>>>,
    activity: Arc<dyn UploadActivity>,
    config: ActionConfig,
    workflow_id: Uuid,
    results: Arc<dyn ResultSink>,
}

impl GroupCollector {
    pub fn new(
        activity: Arc<dyn UploadActivity>,
        config: ActionConfig,
        workflow_id: Uuid,
        results: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            activity,
            config,
            workflow_id,
            results,
        }
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    /// Register a group for `key` with the given quorum, preloading `seeds`
    /// as its initial batch. Returns `false` (and changes nothing) if the
    /// key is already seeded. A quorum below 1 is clamped to 1 — the fire
    /// guard compares on equality, so a zero-quorum group could never fire.
    pub fn seed_group(&self, key: u32, required: usize, seeds: Vec<Packet>) -> bool {
        let mut slots = self.slots.lock().unwrap();
        if slots.contains_key(&key) {
            warn!("group {key} already seeded, ignoring");
            return false;
        }

        let mut group = QuorumGroup::new(key, required.max(1));
        for packet in seeds {
            group.seed_item(packet);
        }
        let (items_tx, _) = watch::channel(group.items().len());
        let (outcome_tx, _) = watch::channel(GroupOutcome::Pending);

        slots.insert(
            key,
            GroupSlot {
                group,
                outcome_tx,
                items_tx,
            },
        );
        true
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().unwrap().is_empty()
    }

    /// Keys of all seeded groups, in ascending order.
    pub fn keys(&self) -> Vec<u32> {
        let mut keys: Vec<u32> = self.slots.lock().unwrap().keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn group_state(&self, key: u32) -> Result<GroupState, EngineError> {
        let slots = self.slots.lock().unwrap();
        let slot = slots.get(&key).ok_or(EngineError::UnknownGroupKey { key })?;
        Ok(slot.group.state().clone())
    }

    pub fn received(&self, key: u32) -> Result<usize, EngineError> {
        let slots = self.slots.lock().unwrap();
        let slot = slots.get(&key).ok_or(EngineError::UnknownGroupKey { key })?;
        Ok(slot.group.received())
    }

    /// Number of groups whose upload action has resolved successfully.
    pub fn completed_count(&self) -> usize {
        let slots = self.slots.lock().unwrap();
        slots
            .values()
            .filter(|s| *s.group.state() == GroupState::Resolved)
            .count()
    }

    // -----------------------------------------------------------------------
    // Signal delivery (synchronous, never suspends)
    // -----------------------------------------------------------------------

    /// Apply a payload-free approval to the group for `key`.
    pub fn deliver_approval(&self, key: u32) -> Result<(), EngineError> {
        let fired = {
            let mut slots = self.slots.lock().unwrap();
            let slot = slots.get_mut(&key).ok_or(EngineError::UnknownGroupKey { key })?;
            let arrival = slot.group.record_approval();
            match arrival {
                Arrival::Fired => Some((slot.group.snapshot_batch(), slot.outcome_tx.clone())),
                _ => None,
            }
        };

        if let Some((batch, outcome_tx)) = fired {
            self.dispatch(key, batch, outcome_tx);
        }
        Ok(())
    }

    /// Apply a payload-bearing packet to the group for its key.
    pub fn deliver_item(&self, packet: Packet) -> Result<(), EngineError> {
        let key = packet.group_key;
        let fired = {
            let mut slots = self.slots.lock().unwrap();
            let slot = slots.get_mut(&key).ok_or(EngineError::UnknownGroupKey { key })?;
            let arrival = slot.group.record_item(packet);
            if arrival == Arrival::Duplicate {
                warn!("group {key}: dropping packet with duplicate sequence id");
                return Ok(());
            }
            slot.items_tx.send_replace(slot.group.items().len());
            match arrival {
                Arrival::Fired => Some((slot.group.snapshot_batch(), slot.outcome_tx.clone())),
                _ => None,
            }
        };

        if let Some((batch, outcome_tx)) = fired {
            self.dispatch(key, batch, outcome_tx);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Action dispatch
    // -----------------------------------------------------------------------

    /// Hand a fired group's batch to the upload activity on the executor.
    /// Called exactly once per group, guarded by the group's fire transition.
    fn dispatch(&self, key: u32, batch: Vec<Packet>, outcome_tx: watch::Sender<GroupOutcome>) {
        info!(
            "group {key} reached quorum, dispatching upload of {} packets",
            batch.len()
        );

        let activity = Arc::clone(&self.activity);
        let config = self.config.clone();
        let results = Arc::clone(&self.results);
        let slots = Arc::clone(&self.slots);
        let ctx = ActivityContext::for_run(self.workflow_id);

        tokio::spawn(async move {
            let outcome = run_action(activity.as_ref(), key, batch, &ctx, &config).await;

            let mut slots = slots.lock().unwrap();
            match outcome {
                Ok(summary) => {
                    info!("group {key} upload resolved: {summary}");
                    if let Some(slot) = slots.get_mut(&key) {
                        slot.group.mark_resolved();
                    }
                    results.push_result(summary.clone());
                    outcome_tx.send_replace(GroupOutcome::Resolved(summary));
                }
                Err(err) => {
                    error!("group {key} upload failed: {err}");
                    if let Some(slot) = slots.get_mut(&key) {
                        slot.group.mark_failed(err.to_string());
                    }
                    outcome_tx.send_replace(GroupOutcome::Failed(err));
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // Bulk waits
    // -----------------------------------------------------------------------

    /// Suspend until every seeded group's upload has resolved, the first
    /// group failure (fail-fast), or the deadline — whichever comes first.
    /// A timeout cancels nothing; the wait can be re-issued.
    pub async fn wait_all(
        &self,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome, EngineError> {
        let mut waits: FuturesUnordered<_> = self
            .outcome_subscriptions()
            .into_iter()
            .map(|(key, rx)| wait_resolved(key, rx))
            .collect();

        let drain = async move {
            while let Some(next) = waits.next().await {
                next?;
            }
            Ok(WaitOutcome::Completed)
        };

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, drain).await {
                Ok(result) => result,
                Err(_) => {
                    info!("wait_all deadline elapsed, leaving in-flight uploads running");
                    Ok(WaitOutcome::TimedOut)
                }
            },
            None => drain.await,
        }
    }

    /// Resolve with the first group to finish its upload. The remaining
    /// groups keep running to completion in the background. A failure
    /// surfaces only if the first finisher is the one that failed.
    pub async fn wait_any(&self) -> Result<(u32, String), EngineError> {
        let mut waits: FuturesUnordered<_> = self
            .outcome_subscriptions()
            .into_iter()
            .map(|(key, rx)| wait_resolved(key, rx))
            .collect();

        match waits.next().await {
            Some(first) => first,
            None => Err(EngineError::QuorumIncomplete {
                needed: 1,
                completed: 0,
            }),
        }
    }

    /// Race-mode fan-in: resolve once `needed` groups have uploaded
    /// successfully. Failed groups do not count; if too few groups remain
    /// for the target to be reachable the wait fails.
    pub async fn wait_first(&self, needed: usize) -> Result<Vec<u32>, EngineError> {
        let subscriptions = self.outcome_subscriptions();
        let total = subscriptions.len();
        if needed > total {
            return Err(EngineError::QuorumIncomplete {
                needed,
                completed: 0,
            });
        }

        let mut waits: FuturesUnordered<_> = subscriptions
            .into_iter()
            .map(|(key, rx)| wait_resolved(key, rx))
            .collect();

        let mut completed = Vec::new();
        let mut failures = 0usize;

        while let Some(next) = waits.next().await {
            match next {
                Ok((key, _)) => {
                    completed.push(key);
                    if completed.len() == needed {
                        return Ok(completed);
                    }
                }
                Err(err) => {
                    failures += 1;
                    warn!("group failed during race wait: {err}");
                    if total - failures < needed {
                        return Err(EngineError::QuorumIncomplete {
                            needed,
                            completed: completed.len(),
                        });
                    }
                }
            }
        }

        Err(EngineError::QuorumIncomplete {
            needed,
            completed: completed.len(),
        })
    }

    /// Best-effort collection: suspend until the group for `key` has
    /// accumulated `count` items or the deadline elapses, then return up to
    /// `count` of whatever is there. A timeout is not an error.
    pub async fn wait_for_group(
        &self,
        key: u32,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<Packet>, EngineError> {
        let mut rx = {
            let slots = self.slots.lock().unwrap();
            let slot = slots.get(&key).ok_or(EngineError::UnknownGroupKey { key })?;
            slot.items_tx.subscribe()
        };

        let reached = tokio::time::timeout(timeout, rx.wait_for(|n| *n >= count)).await;
        if reached.is_err() {
            info!("wait_for_group({key}) deadline elapsed, returning partial batch");
        }

        let items = {
            let slots = self.slots.lock().unwrap();
            let slot = slots.get(&key).ok_or(EngineError::UnknownGroupKey { key })?;
            slot.group.snapshot_batch()
        };
        Ok(items.into_iter().take(count).collect())
    }

    fn outcome_subscriptions(&self) -> Vec<(u32, watch::Receiver<GroupOutcome>)> {
        let slots = self.slots.lock().unwrap();
        slots
            .iter()
            .map(|(key, slot)| (*key, slot.outcome_tx.subscribe()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Internal: wait for one group's outcome broadcast.
// ---------------------------------------------------------------------------

async fn wait_resolved(
    key: u32,
    mut rx: watch::Receiver<GroupOutcome>,
) -> Result<(u32, String), EngineError> {
    loop {
        let current = rx.borrow_and_update().clone();
        match current {
            GroupOutcome::Resolved(summary) => return Ok((key, summary)),
            GroupOutcome::Failed(err) => return Err(err),
            GroupOutcome::Pending => {}
        }
        if rx.changed().await.is_err() {
            return Err(EngineError::ActionFailed {
                key,
                message: "collector dropped before the group resolved".into(),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Internal: run one upload action with timeout + bounded retry.
// ---------------------------------------------------------------------------

async fn run_action(
    activity: &dyn UploadActivity,
    key: u32,
    batch: Vec<Packet>,
    ctx: &ActivityContext,
    config: &ActionConfig,
) -> Result<String, EngineError> {
    let mut attempts = 0u32;

    loop {
        let attempt = tokio::time::timeout(
            config.start_to_close,
            activity.upload_batch(key, batch.clone(), ctx),
        )
        .await;

        let result = match attempt {
            Ok(inner) => inner,
            Err(_) => Err(ActivityError::Retryable(format!(
                "start-to-close timeout after {:?}",
                config.start_to_close
            ))),
        };

        match result {
            Ok(summary) => return Ok(summary),

            Err(ActivityError::Fatal(message)) => {
                return Err(EngineError::ActionFailed { key, message });
            }

            Err(ActivityError::Retryable(message)) => {
                attempts += 1;
                if attempts > config.max_retries {
                    return Err(EngineError::ActionRetryExhausted { key, message });
                }

                let delay = config.retry_base_delay * 2u32.pow(attempts.saturating_sub(1));

                warn!(
                    "group {} retryable upload error (attempt {}/{}), retrying in {:?}: {}",
                    key, attempts, config.max_retries, delay, message
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
