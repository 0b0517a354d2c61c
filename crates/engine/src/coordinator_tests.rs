//! Integration tests for the quorum engine.
//!
//! These tests use `MockUploadActivity` so no real upload backend is
//! required. Collector-level tests drive `GroupCollector` directly;
//! coordinator-level tests spawn a full run and feed it signals through the
//! router, the way an external driver would.

use std::sync::Arc;
use std::time::Duration;

use activities::mock::MockUploadActivity;
use activities::{Packet, ResultSink, UploadActivity};
use uuid::Uuid;

use crate::collector::{ActionConfig, GroupCollector};
use crate::coordinator::{CoordinatorConfig, ResultsLog, UploadCoordinator};
use crate::error::EngineError;
use crate::group::GroupState;
use crate::models::{CompletionMode, Phase, SeedPolicy, WaitOutcome};

/// The canonical three-packet universe: one group per packet, like the
/// original generator (ids 1..=3, "content1".."content3").
fn three_packets() -> Vec<Packet> {
    (1..=3).map(|k| Packet::new(k, k, format!("content{k}"))).collect()
}

/// Dispatch tuning with delays small enough for tests.
fn test_action_config() -> ActionConfig {
    ActionConfig {
        max_retries: 3,
        retry_base_delay: Duration::from_millis(1),
        start_to_close: Duration::from_secs(1),
    }
}

/// Build a collector over the given mock with a fresh results log.
fn collector_over(mock: &Arc<MockUploadActivity>) -> (GroupCollector, Arc<ResultsLog>) {
    let results = Arc::new(ResultsLog::default());
    let collector = GroupCollector::new(
        Arc::clone(mock) as Arc<dyn UploadActivity>,
        test_action_config(),
        Uuid::new_v4(),
        Arc::clone(&results) as Arc<dyn ResultSink>,
    );
    (collector, results)
}

/// Seed one counter-only group per packet with the given quorum.
fn seed_counter_groups(collector: &GroupCollector, universe: &[Packet], quorum: usize) {
    for packet in universe {
        collector.seed_group(packet.group_key, quorum, vec![packet.clone()]);
    }
}

// ============================================================
// Quorum + firing order (collector level)
// ============================================================

#[tokio::test]
async fn out_of_order_approvals_fire_each_group_exactly_once() {
    let mock = Arc::new(MockUploadActivity::succeeding(three_packets()));
    let (collector, results) = collector_over(&mock);
    seed_counter_groups(&collector, &three_packets(), 3);

    // The documented interleaving: group 3 meets quorum on the 6th signal,
    // group 2 on the 7th, group 1 on the 9th.
    for key in [1, 2, 1, 2, 3, 3, 2, 3, 1] {
        collector.deliver_approval(key).expect("seeded group");
        // Let the fired upload start before the next signal lands.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let outcome = collector.wait_all(None).await.expect("all groups resolve");
    assert_eq!(outcome, WaitOutcome::Completed);

    assert_eq!(mock.call_count(), 3);
    assert_eq!(mock.uploaded_keys(), vec![3, 2, 1]);

    // Each batch is exactly the seeded packet for its key.
    for (key, batch) in mock.uploads.lock().unwrap().iter() {
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].group_key, *key);
    }

    // One summary line per completed upload.
    assert_eq!(results.snapshot().len(), 3);
    assert_eq!(collector.completed_count(), 3);
}

#[tokio::test]
async fn post_quorum_signals_are_bookkept_but_never_refire() {
    let mock = Arc::new(MockUploadActivity::succeeding(three_packets()));
    let (collector, _results) = collector_over(&mock);
    collector.seed_group(1, 2, vec![Packet::new(1, 1, "content1")]);

    for _ in 0..5 {
        collector.deliver_approval(1).expect("seeded group");
    }
    collector.wait_all(None).await.unwrap();

    assert_eq!(collector.received(1).unwrap(), 5);
    assert_eq!(mock.call_count(), 1);
}

// ============================================================
// Unknown keys and malformed payloads
// ============================================================

#[tokio::test]
async fn unknown_key_signals_never_create_groups() {
    let mock = Arc::new(MockUploadActivity::succeeding(three_packets()));
    let (collector, _results) = collector_over(&mock);
    seed_counter_groups(&collector, &three_packets(), 3);

    assert!(matches!(
        collector.deliver_approval(99),
        Err(EngineError::UnknownGroupKey { key: 99 })
    ));
    assert!(matches!(
        collector.deliver_item(Packet::new(42, 1, "stray")),
        Err(EngineError::UnknownGroupKey { key: 42 })
    ));

    // No group was created and no counter moved.
    assert_eq!(collector.keys(), vec![1, 2, 3]);
    for key in [1, 2, 3] {
        assert_eq!(collector.received(key).unwrap(), 0);
    }
}

#[tokio::test]
async fn router_discards_unknown_keys_and_malformed_packets() {
    let mock = Arc::new(MockUploadActivity::succeeding(three_packets()));
    let coord = Arc::new(UploadCoordinator::new(
        Arc::clone(&mock) as Arc<dyn UploadActivity>,
        CoordinatorConfig {
            per_group_quorum: 1,
            seed_policy: SeedPolicy::KeysOnly,
            ..CoordinatorConfig::default()
        },
    ));
    let router = coord.router();

    let runner = {
        let coord = Arc::clone(&coord);
        tokio::spawn(async move { coord.run().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // All discarded at the boundary: unknown key, empty payload, zero
    // sequence id.
    router.approve(99);
    router.submit(Packet::new(1, 1, ""));
    router.submit(Packet::new(1, 0, "zero-seq"));
    assert_eq!(coord.collector().received(1).unwrap(), 0);

    // Valid signals still complete the run.
    for key in [1, 2, 3] {
        router.submit(Packet::new(key, 1, "ok"));
    }
    let summary = runner.await.unwrap().expect("run succeeds");
    assert_eq!(summary.completed_groups, 3);
    assert_eq!(coord.phase(), Phase::Done);
}

#[tokio::test]
async fn duplicate_sequence_ids_do_not_double_count() {
    let mock = Arc::new(MockUploadActivity::succeeding(vec![]));
    let (collector, _results) = collector_over(&mock);
    collector.seed_group(8, 3, Vec::new());

    collector.deliver_item(Packet::new(8, 1, "a")).unwrap();
    collector.deliver_item(Packet::new(8, 1, "a-again")).unwrap();
    collector.deliver_item(Packet::new(8, 2, "b")).unwrap();
    assert_eq!(collector.received(8).unwrap(), 2);
    assert_eq!(mock.call_count(), 0);

    collector.deliver_item(Packet::new(8, 3, "c")).unwrap();
    collector.wait_all(None).await.unwrap();
    assert_eq!(mock.call_count(), 1);
}

// ============================================================
// Bulk waits
// ============================================================

#[tokio::test]
async fn wait_all_fails_fast_on_group_failure() {
    let mock = Arc::new(MockUploadActivity::failing_fatal(vec![], "upload rejected"));
    let (collector, _results) = collector_over(&mock);
    seed_counter_groups(&collector, &three_packets(), 1);

    // Only group 2 fires; its failure must surface even though the other
    // groups are still pending.
    collector.deliver_approval(2).unwrap();

    let err = collector.wait_all(None).await.expect_err("fail-fast");
    assert!(matches!(err, EngineError::ActionFailed { key: 2, .. }));

    assert_eq!(
        collector.group_state(2).unwrap(),
        GroupState::Failed("group 2 upload failed: upload rejected".into())
    );
    assert_eq!(collector.group_state(1).unwrap(), GroupState::Pending);
    assert_eq!(collector.group_state(3).unwrap(), GroupState::Pending);
}

#[tokio::test]
async fn wait_all_timeout_cancels_nothing() {
    let mock = Arc::new(MockUploadActivity::succeeding(three_packets()));
    let (collector, _results) = collector_over(&mock);
    seed_counter_groups(&collector, &three_packets(), 1);

    let outcome = collector
        .wait_all(Some(Duration::from_millis(50)))
        .await
        .unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);

    // State was left as-is; a later wait observes completion.
    for key in [1, 2, 3] {
        collector.deliver_approval(key).unwrap();
    }
    let outcome = collector.wait_all(None).await.unwrap();
    assert_eq!(outcome, WaitOutcome::Completed);
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn wait_any_returns_first_finisher_without_cancelling_others() {
    let mock = Arc::new(MockUploadActivity::succeeding(three_packets()));
    let (collector, _results) = collector_over(&mock);
    seed_counter_groups(&collector, &three_packets(), 1);

    collector.deliver_approval(2).unwrap();

    let (key, summary) = collector.wait_any().await.unwrap();
    assert_eq!(key, 2);
    assert_eq!(summary, "uploaded 1 packets for group 2");

    // The other groups are untouched and still accept signals.
    assert_eq!(collector.group_state(1).unwrap(), GroupState::Pending);
    collector.deliver_approval(1).unwrap();
    collector.deliver_approval(3).unwrap();
    assert_eq!(collector.wait_all(None).await.unwrap(), WaitOutcome::Completed);
}

#[tokio::test]
async fn wait_any_surfaces_failure_of_first_finisher() {
    let mock = Arc::new(MockUploadActivity::failing_fatal(vec![], "upload rejected"));
    let (collector, _results) = collector_over(&mock);
    seed_counter_groups(&collector, &three_packets(), 1);

    // The only group to fire is the one that fails, so the first finisher
    // the caller depends on carries the failure.
    collector.deliver_approval(2).unwrap();

    let err = collector.wait_any().await.expect_err("first finisher failed");
    assert!(matches!(err, EngineError::ActionFailed { key: 2, .. }));
}

#[tokio::test]
async fn race_wait_fails_once_target_becomes_unreachable() {
    let mock = Arc::new(MockUploadActivity::failing_fatal(vec![], "upload rejected"));
    let (collector, _results) = collector_over(&mock);
    seed_counter_groups(&collector, &three_packets(), 1);

    // More winners demanded than groups seeded: unreachable from the start.
    assert!(matches!(
        collector.wait_first(4).await,
        Err(EngineError::QuorumIncomplete { needed: 4, completed: 0 })
    ));

    // Two of three groups fire and fail; only one could still succeed, so a
    // race quorum of two can no longer be met.
    collector.deliver_approval(1).unwrap();
    collector.deliver_approval(2).unwrap();

    let err = collector.wait_first(2).await.expect_err("target unreachable");
    assert!(matches!(
        err,
        EngineError::QuorumIncomplete {
            needed: 2,
            completed: 0
        }
    ));
}

#[tokio::test]
async fn zero_quorum_is_clamped_to_one() {
    let mock = Arc::new(MockUploadActivity::succeeding(vec![]));
    let (collector, _results) = collector_over(&mock);
    collector.seed_group(1, 0, vec![Packet::new(1, 1, "content1")]);

    // A zero quorum would make the equality fire-guard unreachable; the
    // collector clamps it so the first signal fires the group.
    collector.deliver_approval(1).unwrap();
    assert_eq!(collector.wait_all(None).await.unwrap(), WaitOutcome::Completed);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn wait_for_group_returns_partial_batch_on_timeout() {
    let mock = Arc::new(MockUploadActivity::succeeding(vec![]));
    let (collector, _results) = collector_over(&mock);
    collector.seed_group(5, 10, Vec::new());

    collector.deliver_item(Packet::new(5, 1, "one")).unwrap();
    collector.deliver_item(Packet::new(5, 2, "two")).unwrap();

    // Deadline elapses before 5 items arrive: partial result, no error.
    let partial = collector
        .wait_for_group(5, 5, Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(partial.len(), 2);

    // Enough items already buffered: returns immediately, truncated.
    let one = collector
        .wait_for_group(5, 1, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(one.len(), 1);

    assert!(matches!(
        collector.wait_for_group(77, 1, Duration::from_millis(10)).await,
        Err(EngineError::UnknownGroupKey { key: 77 })
    ));
}

// ============================================================
// Race mode (coordinator level)
// ============================================================

#[tokio::test]
async fn race_mode_completes_after_two_of_three_groups() {
    let mock = Arc::new(MockUploadActivity::succeeding(three_packets()));
    let coord = Arc::new(UploadCoordinator::new(
        Arc::clone(&mock) as Arc<dyn UploadActivity>,
        CoordinatorConfig {
            per_group_quorum: 3,
            mode: CompletionMode::FirstN { required: 2 },
            seed_policy: SeedPolicy::KeysOnly,
            ..CoordinatorConfig::default()
        },
    ));
    let router = coord.router();

    let runner = {
        let coord = Arc::clone(&coord);
        tokio::spawn(async move { coord.run().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Interleave submits across the three types; type 1 fills on the 6th
    // submit, type 2 on the 7th. Type 3 never reaches quorum here.
    let submits = [
        (1, 1),
        (2, 1),
        (3, 1),
        (1, 2),
        (2, 2),
        (1, 3), // group 1 fires
        (2, 3), // group 2 fires — race quorum met
    ];
    for (key, seq) in submits {
        router.submit(Packet::new(key, seq, format!("payload-{key}-{seq}")));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let summary = runner.await.unwrap().expect("race quorum met");
    assert_eq!(summary.completed_groups, 2);
    assert_eq!(summary.total_groups, 3);
    assert_eq!(summary.to_string(), "uploaded 2 of 3 groups");
    assert_eq!(mock.uploaded_keys(), vec![1, 2]);

    // The straggler was not cancelled: it still accepts signals and
    // eventually uploads.
    assert_eq!(coord.collector().group_state(3).unwrap(), GroupState::Pending);
    router.submit(Packet::new(3, 2, "late"));
    router.submit(Packet::new(3, 3, "later"));
    coord.collector().wait_all(None).await.unwrap();
    assert_eq!(mock.call_count(), 3);
}

// ============================================================
// Retry policy at the dispatch boundary
// ============================================================

#[tokio::test]
async fn retryable_failures_are_retried_then_succeed() {
    let mock = Arc::new(MockUploadActivity::flaky(vec![], 2));
    let (collector, _results) = collector_over(&mock);
    collector.seed_group(1, 1, vec![Packet::new(1, 1, "content1")]);

    collector.deliver_approval(1).unwrap();
    let outcome = collector.wait_all(None).await.unwrap();

    assert_eq!(outcome, WaitOutcome::Completed);
    assert_eq!(mock.call_count(), 3); // 2 failures + 1 success
}

#[tokio::test]
async fn retry_exhaustion_fails_the_group() {
    let mock = Arc::new(MockUploadActivity::failing_retryable(vec![], "still down"));
    let results = Arc::new(ResultsLog::default());
    let collector = GroupCollector::new(
        Arc::clone(&mock) as Arc<dyn UploadActivity>,
        ActionConfig {
            max_retries: 1,
            retry_base_delay: Duration::from_millis(1),
            start_to_close: Duration::from_secs(1),
        },
        Uuid::new_v4(),
        Arc::clone(&results) as Arc<dyn ResultSink>,
    );
    collector.seed_group(1, 1, Vec::new());

    collector.deliver_approval(1).unwrap();
    let err = collector.wait_all(None).await.expect_err("retries exhausted");

    assert!(matches!(err, EngineError::ActionRetryExhausted { key: 1, .. }));
    assert_eq!(mock.call_count(), 2); // initial attempt + 1 retry
    assert!(results.snapshot().is_empty());
}

// ============================================================
// Results query
// ============================================================

#[tokio::test]
async fn collected_results_are_append_only_and_ordered() {
    let mock = Arc::new(MockUploadActivity::succeeding(three_packets()));
    let coord = UploadCoordinator::new(
        Arc::clone(&mock) as Arc<dyn UploadActivity>,
        CoordinatorConfig::default(),
    );

    coord.push_result("result1".into());
    let first = coord.collected_results();
    assert_eq!(first, vec!["result1".to_string()]);

    coord.push_result("result2".into());
    coord.push_result("result3".into());
    let second = coord.collected_results();

    // Never shrinks, never reorders previously returned entries.
    assert_eq!(second.len(), 3);
    assert_eq!(&second[..first.len()], &first[..]);
    assert_eq!(second, vec!["result1", "result2", "result3"]);
}
