//! Upload coordinator: orchestrates one end-to-end run.
//!
//! `Initializing` — generate the packet universe and seed one quorum group
//! per distinct key. `AwaitingSignals` — the router feeds approvals and
//! packets in; groups fire their uploads independently. `Completing` — the
//! configured bulk wait has resolved. `Done` — terminal, a summary is
//! returned.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use activities::{ActivityContext, Packet, ResultSink, UploadActivity};

use crate::collector::{ActionConfig, GroupCollector};
use crate::error::EngineError;
use crate::models::{CompletionMode, Phase, RunSummary, SeedPolicy, WaitOutcome};
use crate::router::SignalRouter;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for one coordinator run.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Signals required before a group's upload fires.
    pub per_group_quorum: usize,
    /// How overall completion is decided.
    pub mode: CompletionMode,
    /// What seeded groups start out holding.
    pub seed_policy: SeedPolicy,
    /// Optional deadline for the bulk wait (all-groups mode only).
    pub wait_timeout: Option<Duration>,
    /// Upload dispatch tuning.
    pub action: ActionConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            per_group_quorum: 3,
            mode: CompletionMode::AllGroups,
            seed_policy: SeedPolicy::PreloadUniverse,
            wait_timeout: None,
            action: ActionConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// ResultsLog
// ---------------------------------------------------------------------------

/// Append-only log of action outputs — the coordinator's query surface.
///
/// Entries are never removed or reordered, so repeated snapshots only ever
/// grow and earlier entries keep their positions.
#[derive(Default)]
pub struct ResultsLog {
    entries: Mutex<Vec<String>>,
}

impl ResultsLog {
    /// Read-only snapshot of everything received so far, in delivery order.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

impl ResultSink for ResultsLog {
    fn push_result(&self, result: String) {
        self.entries.lock().unwrap().push(result);
    }
}

// ---------------------------------------------------------------------------
// UploadCoordinator
// ---------------------------------------------------------------------------

/// Process-scoped state for one workflow instance. Owns the collector and
/// every quorum group seeded for this run; groups are never shared across
/// instances.
pub struct UploadCoordinator {
    activity: Arc<dyn UploadActivity>,
    collector: Arc<GroupCollector>,
    config: CoordinatorConfig,
    workflow_id: Uuid,
    phase: Mutex<Phase>,
    results: Arc<ResultsLog>,
}

impl UploadCoordinator {
    pub fn new(activity: Arc<dyn UploadActivity>, config: CoordinatorConfig) -> Self {
        let workflow_id = Uuid::new_v4();
        let results = Arc::new(ResultsLog::default());
        let collector = Arc::new(GroupCollector::new(
            Arc::clone(&activity),
            config.action.clone(),
            workflow_id,
            Arc::clone(&results) as Arc<dyn ResultSink>,
        ));

        Self {
            activity,
            collector,
            config,
            workflow_id,
            phase: Mutex::new(Phase::Initializing),
            results,
        }
    }

    /// Handle for delivering external signals to this run.
    pub fn router(&self) -> SignalRouter {
        SignalRouter::new(Arc::clone(&self.collector))
    }

    /// Direct access to the group collector (bulk waits, introspection).
    pub fn collector(&self) -> &GroupCollector {
        &self.collector
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap()
    }

    /// Read-only snapshot of action outputs received so far. Append-only
    /// across calls; safe to call concurrently with signal delivery.
    pub fn collected_results(&self) -> Vec<String> {
        self.results.snapshot()
    }

    /// Inbound result signal: append an intermediate service result to the
    /// log (the payload-free reporting flow).
    pub fn push_result(&self, result: String) {
        self.results.push_result(result);
    }

    /// Invoke the reporting activity, wiring its intermediate results into
    /// this coordinator's log.
    pub async fn report_progress(&self) -> Result<(), EngineError> {
        let ctx = ActivityContext::for_run(self.workflow_id);
        self.activity
            .invoke_services(self.results.as_ref(), &ctx)
            .await?;
        Ok(())
    }

    /// Run the coordinator to completion.
    #[instrument(skip(self), fields(workflow_id = %self.workflow_id))]
    pub async fn run(&self) -> Result<RunSummary, EngineError> {
        self.set_phase(Phase::Initializing);

        // ------------------------------------------------------------------
        // Discover the packet universe and seed one group per distinct key.
        // ------------------------------------------------------------------
        let ctx = ActivityContext::for_run(self.workflow_id);
        let universe = self.activity.generate_packets(&ctx).await?;

        let mut by_key: BTreeMap<u32, Vec<Packet>> = BTreeMap::new();
        for packet in universe {
            by_key.entry(packet.group_key).or_default().push(packet);
        }

        let quorum = self.config.per_group_quorum.max(1);
        for (key, packets) in by_key {
            let seeds = match self.config.seed_policy {
                SeedPolicy::PreloadUniverse => packets,
                SeedPolicy::KeysOnly => Vec::new(),
            };
            self.collector.seed_group(key, quorum, seeds);
        }

        let total_groups = self.collector.len();
        info!(
            "seeded {} groups with per-group quorum {}",
            total_groups, quorum
        );

        // ------------------------------------------------------------------
        // Accept signals until the configured completion condition holds.
        // ------------------------------------------------------------------
        self.set_phase(Phase::AwaitingSignals);

        let timed_out = match self.config.mode {
            CompletionMode::AllGroups => {
                let outcome = self.collector.wait_all(self.config.wait_timeout).await?;
                outcome == WaitOutcome::TimedOut
            }
            CompletionMode::FirstN { required } => {
                let winners = self.collector.wait_first(required).await?;
                info!("race quorum met by groups {winners:?}");
                false
            }
        };

        // ------------------------------------------------------------------
        // Finalize.
        // ------------------------------------------------------------------
        self.set_phase(Phase::Completing);

        let summary = RunSummary {
            workflow_id: self.workflow_id,
            completed_groups: self.collector.completed_count(),
            total_groups,
            timed_out,
            finished_at: Utc::now(),
        };

        self.set_phase(Phase::Done);
        info!("coordinator finished: {summary}");
        Ok(summary)
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap() = phase;
    }
}
