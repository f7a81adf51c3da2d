//! Import batches: directory → local store

use adsync_core::domain::{BatchTrigger, IdentityAnomaly, LocalUser, LocalUserId, SyncStatus};
use adsync_sync::{BatchOptions, BatchPhase};

use crate::common::{bound_user, entry, guid, with_attr, Harness, PASSWORD};

#[tokio::test]
async fn test_failing_principal_does_not_stop_the_batch() {
    let entries = (1..=10)
        .map(|n| {
            if n == 5 {
                with_attr(entry(n), "mail", None)
            } else {
                entry(n)
            }
        })
        .collect();
    let users = (1..=10).map(|n| bound_user(n as u64 + 1, n)).collect();
    let harness = Harness::new(entries, users);

    let mut orchestrator = harness.import(false);
    let report = orchestrator
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert!(report.is_complete());
    assert_eq!(report.processed(), 10);
    assert_eq!(report.counts.updated, 9);
    assert_eq!(report.counts.failed, 1);
    let failed: Vec<_> = report.failures().collect();
    assert_eq!(failed[0].identifier, "user5");
    assert!(failed[0].reason.as_deref().unwrap().contains("mail"));

    // Principals after the failure were still applied
    assert_eq!(harness.store.meta(11, "first_name").as_deref(), Some("User10"));
    assert_eq!(harness.store.meta(6, "first_name"), None);
    assert_eq!(orchestrator.phase(), BatchPhase::Idle);
    assert_eq!(harness.sink.reports(), vec![report]);
}

#[tokio::test]
async fn test_import_writes_fields_and_bookkeeping() {
    let harness = Harness::new(
        vec![with_attr(entry(1), "userAccountControl", Some(vec!["514".into()]))],
        vec![bound_user(2, 1)],
    );

    let report = harness
        .import(false)
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert!(report.is_clean());
    assert_eq!(report.counts.updated, 1);
    let store = &harness.store;
    assert_eq!(store.meta(2, "first_name").as_deref(), Some("User1"));
    assert_eq!(store.meta(2, "email").as_deref(), Some("user1@example.com"));
    assert_eq!(
        store.meta(2, "aliases").as_deref(),
        Some("smtp:user1@example.com, smtp:u1@example.com")
    );
    assert_eq!(store.meta(2, "adsync_disabled").as_deref(), Some("1"));
    assert!(store.meta(2, "adsync_last_synced_at").is_some());

    let directory = harness.directory.state();
    assert_eq!(directory.opened, 1);
    assert_eq!(directory.closed, 1);
}

#[tokio::test]
async fn test_second_import_changes_nothing() {
    let harness = Harness::new(vec![entry(1), entry(2)], vec![bound_user(2, 1), bound_user(3, 2)]);

    let first = harness
        .import(false)
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;
    assert_eq!(first.counts.updated, 2);
    let stamp = harness.store.meta(2, "adsync_last_synced_at");

    let second = harness
        .import(false)
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;
    assert_eq!(second.counts.skipped, 2);
    assert!(second
        .outcomes
        .iter()
        .all(|o| o.reason.as_deref() == Some("unchanged")));
    assert_eq!(harness.store.meta(2, "adsync_last_synced_at"), stamp);
}

#[tokio::test]
async fn test_unmatched_principals_are_created_on_request() {
    let harness = Harness::new(vec![entry(1), entry(2)], Vec::new());

    let skipped = harness
        .import(false)
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;
    assert_eq!(skipped.counts.skipped, 2);
    assert_eq!(harness.store.len(), 1);

    let created = harness
        .import(true)
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;
    assert_eq!(created.counts.created, 2);
    assert_eq!(harness.store.len(), 3);

    let user = harness.store.by_login("user2").unwrap();
    assert_eq!(user.id(), LocalUserId::new(3));
    assert_eq!(user.metadata()["adsync_object_guid"], guid(2));
    assert_eq!(user.metadata()["adsync_samaccountname"], "user2");
    assert_eq!(user.metadata()["adsync_disabled"], "0");
    assert_eq!(user.metadata()["email"], "user2@example.com");
}

#[tokio::test]
async fn test_account_name_match_binds_the_guid() {
    let user = LocalUser::new(LocalUserId::new(2), "user1")
        .unwrap()
        .with_metadata("adsync_samaccountname", "USER1");
    let harness = Harness::new(vec![entry(1)], vec![user]);

    let report = harness
        .import(false)
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert_eq!(report.counts.updated, 1);
    assert_eq!(harness.store.meta(2, "adsync_object_guid"), Some(guid(1)));
    assert_eq!(harness.store.meta(2, "adsync_samaccountname").as_deref(), Some("user1"));
}

#[tokio::test]
async fn test_user_bound_earlier_in_the_batch_is_not_rebound() {
    // Renamed account: the login still says user1, the mirror says user2
    let user = LocalUser::new(LocalUserId::new(2), "user1")
        .unwrap()
        .with_metadata("adsync_samaccountname", "user2");
    let harness = Harness::new(vec![entry(1), entry(2)], vec![user]);

    let report = harness
        .import(false)
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert!(report.is_complete());
    assert_eq!(report.counts.updated, 1);
    assert_eq!(report.counts.skipped, 1);
    assert_eq!(report.outcomes[0].status, SyncStatus::Updated);
    assert_eq!(report.outcomes[1].identifier, "user2");
    assert_eq!(report.outcomes[1].status, SyncStatus::Skipped);
    assert!(report.outcomes[1]
        .reason
        .as_deref()
        .unwrap()
        .contains("bound to"));

    assert_eq!(harness.store.meta(2, "adsync_object_guid"), Some(guid(1)));
    assert_eq!(harness.store.meta(2, "first_name").as_deref(), Some("User1"));
}

#[tokio::test]
async fn test_duplicate_guid_is_reported_and_skipped() {
    let harness = Harness::new(
        vec![entry(1), entry(2)],
        vec![
            bound_user(2, 1),
            bound_user(3, 1)
                .with_metadata("adsync_samaccountname", "user1-old")
                .with_metadata("adsync_object_guid", guid(1).to_uppercase()),
            bound_user(4, 2),
        ],
    );

    let report = harness
        .import(false)
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert!(report.is_complete());
    assert!(!report.is_clean());
    assert_eq!(report.anomalies.len(), 1);
    assert!(matches!(
        &report.anomalies[0],
        IdentityAnomaly::DuplicateGuid { users, kept, .. }
            if users == &[LocalUserId::new(2), LocalUserId::new(3)] && *kept == LocalUserId::new(3)
    ));

    assert_eq!(report.outcomes[0].status, SyncStatus::Skipped);
    assert_eq!(report.outcomes[1].status, SyncStatus::Updated);
    assert_eq!(harness.store.meta(2, "first_name"), None);
    assert_eq!(harness.store.meta(3, "first_name"), None);
    assert_eq!(harness.store.meta(4, "first_name").as_deref(), Some("User2"));
}

#[tokio::test]
async fn test_reserved_user_is_never_touched() {
    let admin_entry = with_attr(entry(1), "sAMAccountName", Some(vec!["admin".into()]));
    let harness = Harness::new(vec![admin_entry], Vec::new());

    let report = harness
        .import(false)
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert_eq!(report.counts.skipped, 1);
    assert_eq!(
        report.outcomes[0].reason.as_deref(),
        Some("no matching local user")
    );
    assert!(harness.store.user(1).metadata().is_empty());

    let single = harness
        .import(false)
        .run(
            "svc-sync",
            PASSWORD,
            BatchTrigger::SingleUser(LocalUserId::new(1)),
            BatchOptions::new(),
        )
        .await;
    assert_eq!(single.processed(), 0);
    assert!(single.is_complete());
}

#[tokio::test]
async fn test_single_user_trigger_imports_one_principal() {
    let harness = Harness::new(
        vec![entry(1), entry(2), entry(3)],
        vec![bound_user(2, 1), bound_user(3, 2), bound_user(4, 3)],
    );

    let report = harness
        .import(false)
        .run(
            "svc-sync",
            PASSWORD,
            BatchTrigger::SingleUser(LocalUserId::new(3)),
            BatchOptions::new(),
        )
        .await;

    assert_eq!(report.processed(), 1);
    assert_eq!(report.outcomes[0].identifier, "user2");
    assert_eq!(harness.store.meta(3, "first_name").as_deref(), Some("User2"));
    assert_eq!(harness.store.meta(2, "first_name"), None);
}
