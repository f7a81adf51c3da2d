//! Credentials, connection loss, cancellation, deadlines and budget

use std::sync::Arc;
use std::time::Instant;

use adsync_core::domain::{BatchTrigger, SyncStatus};
use adsync_sync::{BatchOptions, BudgetController};
use tokio_util::sync::CancellationToken;

use crate::common::{bound_user, entry, synced_user, FakeLimit, Harness, PASSWORD};

fn renamed_users(count: usize) -> Vec<adsync_core::domain::LocalUser> {
    (1..=count)
        .map(|n| synced_user(n as u64 + 1, n).with_metadata("first_name", format!("Renamed{n}")))
        .collect()
}

#[tokio::test]
async fn test_wrong_credentials_give_an_empty_report() {
    let harness = Harness::new(vec![entry(1)], vec![bound_user(2, 1)]);

    let report = harness
        .import(false)
        .run("svc-sync", "wrong", BatchTrigger::Full, BatchOptions::new())
        .await;

    assert_eq!(report.processed(), 0);
    assert!(report
        .aborted
        .as_deref()
        .unwrap()
        .starts_with("connection failed"));
    assert_eq!(harness.directory.state().opened, 0);
    assert_eq!(harness.store.meta(2, "first_name"), None);
    assert_eq!(harness.sink.reports().len(), 1);
}

#[tokio::test]
async fn test_missing_password_never_contacts_the_directory() {
    let harness = Harness::new(vec![entry(1)], Vec::new());

    let report = harness
        .export()
        .run("svc-sync", "", BatchTrigger::Full, BatchOptions::new())
        .await;

    assert!(!report.is_complete());
    assert_eq!(harness.directory.state().opened, 0);
}

#[tokio::test]
async fn test_connection_loss_keeps_partial_results() {
    let harness = Harness::new((1..=5).map(entry).collect(), renamed_users(5));
    // search + modify per user; the third user's search is the fifth operation
    harness.directory.state().lose_connection_after = Some(4);

    let report = harness
        .export()
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert_eq!(report.processed(), 3);
    assert_eq!(report.counts.updated, 2);
    assert_eq!(report.outcomes[2].status, SyncStatus::Failed);
    assert!(report
        .aborted
        .as_deref()
        .unwrap()
        .starts_with("connection lost"));
    assert_eq!(harness.directory.state().modifications.len(), 2);
    assert_eq!(harness.directory.state().closed, 1);
    assert_eq!(harness.sink.reports(), vec![report]);
}

#[tokio::test]
async fn test_cancellation_stops_before_the_next_principal() {
    let harness = Harness::new((1..=5).map(entry).collect(), renamed_users(5));
    let token = CancellationToken::new();
    harness.directory.state().cancel_on_search = Some((2, token.clone()));

    let report = harness
        .export()
        .run(
            "svc-sync",
            PASSWORD,
            BatchTrigger::Full,
            BatchOptions::new().with_cancellation(token),
        )
        .await;

    assert_eq!(report.processed(), 2);
    assert_eq!(report.counts.updated, 2);
    assert_eq!(report.aborted.as_deref(), Some("cancelled"));
    assert_eq!(harness.directory.state().closed, 1);
}

#[tokio::test]
async fn test_passed_deadline_processes_nothing() {
    let harness = Harness::new((1..=3).map(entry).collect(), Vec::new());

    let report = harness
        .import(true)
        .run(
            "svc-sync",
            PASSWORD,
            BatchTrigger::Full,
            BatchOptions::new().with_deadline(Instant::now()),
        )
        .await;

    assert_eq!(report.processed(), 0);
    assert_eq!(report.aborted.as_deref(), Some("deadline reached"));
    assert_eq!(harness.store.len(), 1);
}

#[tokio::test]
async fn test_budget_is_raised_once() {
    let harness = Harness::new(vec![entry(1)], vec![bound_user(2, 1)]);
    let limit = Arc::new(FakeLimit::new(300, None));

    for _ in 0..2 {
        let report = harness
            .import(false)
            .with_budget(BudgetController::new(limit.clone()))
            .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
            .await;
        assert!(report.warnings.is_empty());
        assert!(report.is_complete());
    }
    assert_eq!(limit.raises(), 1);
}

#[tokio::test]
async fn test_capped_budget_warns_and_continues() {
    let harness = Harness::new(vec![entry(1), entry(2)], vec![bound_user(2, 1), bound_user(3, 2)]);
    let limit = Arc::new(FakeLimit::new(60, Some(600)));

    let mut orchestrator = harness
        .import(false)
        .with_budget(BudgetController::new(limit.clone()));
    let report = orchestrator
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert!(report.is_complete());
    assert_eq!(report.counts.updated, 2);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("18000s"));
    assert!(orchestrator.elapsed_time() < std::time::Duration::from_secs(60));
}

#[tokio::test]
async fn test_deadline_from_cpu_limit_counts_wall_clock_time() {
    let harness = Harness::new(vec![entry(1)], vec![bound_user(2, 1)]);
    let limit = Arc::new(FakeLimit::new(60, Some(90)));

    let report = harness
        .import(false)
        .with_budget(BudgetController::new(limit))
        .with_safety_margin(std::time::Duration::from_secs(90))
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    // No CPU time was spent, yet the derived wall-clock deadline has passed
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.processed(), 0);
    assert_eq!(report.aborted.as_deref(), Some("deadline reached"));

    // An explicit deadline replaces the derived one
    let report = harness
        .import(false)
        .with_budget(BudgetController::new(Arc::new(FakeLimit::new(60, Some(90)))))
        .with_safety_margin(std::time::Duration::from_secs(90))
        .run(
            "svc-sync",
            PASSWORD,
            BatchTrigger::Full,
            BatchOptions::new().with_timeout(std::time::Duration::from_secs(60)),
        )
        .await;
    assert!(report.is_complete());
    assert_eq!(report.counts.updated, 1);
}
