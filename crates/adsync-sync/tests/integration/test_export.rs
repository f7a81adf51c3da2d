//! Export batches: local store → directory

use adsync_core::domain::{BatchTrigger, DirectoryChange, LocalUser, LocalUserId, SyncStatus};
use adsync_sync::BatchOptions;

use crate::common::{attr, entry, guid, synced_user, Harness, PASSWORD};

#[tokio::test]
async fn test_round_trip_produces_no_changes() {
    let harness = Harness::new(vec![entry(1), entry(2)], Vec::new());

    let imported = harness
        .import(true)
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;
    assert_eq!(imported.counts.created, 2);

    let exported = harness
        .export()
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;
    assert!(exported.is_clean());
    assert_eq!(exported.counts.skipped, 2);
    assert!(harness.directory.state().modifications.is_empty());

    let reimported = harness
        .import(false)
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;
    assert_eq!(reimported.counts.skipped, 2);
}

#[tokio::test]
async fn test_local_edit_is_exported_once() {
    let harness = Harness::new(
        vec![entry(1), entry(2)],
        vec![
            synced_user(2, 1).with_metadata("first_name", "Ada"),
            synced_user(3, 2),
        ],
    );

    let report = harness
        .export()
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;
    assert_eq!(report.counts.updated, 1);
    assert_eq!(report.counts.skipped, 1);
    assert_eq!(report.outcomes[0].changes, ["givenName := 'Ada'"]);

    let dn = entry(1).dn().to_string();
    assert_eq!(
        harness.directory.state().modifications,
        vec![(
            dn.clone(),
            vec![DirectoryChange::Replace {
                attribute: attr("givenName"),
                values: vec!["Ada".into()],
            }]
        )]
    );
    assert_eq!(
        harness.directory.entry(&dn).attributes().first(&attr("givenName")),
        Some("Ada")
    );

    // Nothing left to do on either side
    let again = harness
        .export()
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;
    assert_eq!(again.counts.skipped, 2);
    let reimport = harness
        .import(false)
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;
    assert_eq!(reimport.counts.skipped, 2);
}

#[tokio::test]
async fn test_emptied_field_clears_the_attribute() {
    let harness = Harness::new(
        vec![entry(1)],
        vec![synced_user(2, 1).with_metadata("aliases", "  ")],
    );

    let report = harness
        .export()
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert_eq!(report.counts.updated, 1);
    assert_eq!(report.outcomes[0].changes, ["proxyAddresses := (cleared)"]);
    assert!(!harness
        .directory
        .entry(entry(1).dn())
        .attributes()
        .contains(&attr("proxyAddresses")));
}

#[tokio::test]
async fn test_rejected_write_fails_only_that_user() {
    let users = (1..=4)
        .map(|n| synced_user(n as u64 + 1, n).with_metadata("first_name", format!("Renamed{n}")))
        .collect();
    let harness = Harness::new((1..=4).map(entry).collect(), users);
    harness
        .directory
        .state()
        .reject_dns
        .insert(entry(2).dn().to_string());

    let report = harness
        .export()
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert!(report.is_complete());
    assert_eq!(report.counts.updated, 3);
    assert_eq!(report.counts.failed, 1);
    assert_eq!(report.outcomes[1].identifier, "user2");
    assert_eq!(report.outcomes[1].status, SyncStatus::Failed);
    assert_eq!(harness.directory.state().modifications.len(), 3);
}

#[tokio::test]
async fn test_unbound_user_is_bound_on_export() {
    let user = LocalUser::new(LocalUserId::new(2), "user1")
        .unwrap()
        .with_metadata("adsync_samaccountname", "user1")
        .with_metadata("first_name", "User1")
        .with_metadata("email", "user1@example.com")
        .with_metadata("aliases", "smtp:user1@example.com, smtp:u1@example.com");
    let harness = Harness::new(vec![entry(1)], vec![user]);

    let report = harness
        .export()
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert_eq!(report.counts.updated, 1);
    assert!(harness.directory.state().modifications.is_empty());
    assert_eq!(harness.store.meta(2, "adsync_object_guid"), Some(guid(1)));
}

#[tokio::test]
async fn test_missing_required_field_fails_without_clearing() {
    let unbound = LocalUser::new(LocalUserId::new(3), "user2")
        .unwrap()
        .with_metadata("adsync_samaccountname", "user2")
        .with_metadata("first_name", "Renamed2");
    let harness = Harness::new(
        vec![entry(1), entry(2)],
        vec![synced_user(2, 1).with_metadata("email", ""), unbound],
    );

    let report = harness
        .export()
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert!(report.is_complete());
    assert_eq!(report.counts.failed, 2);
    for outcome in &report.outcomes {
        assert_eq!(outcome.status, SyncStatus::Failed);
        assert!(outcome.reason.as_deref().unwrap().contains("mail"));
    }

    assert!(harness.directory.state().modifications.is_empty());
    assert_eq!(
        harness.directory.entry(entry(1).dn()).attributes().first(&attr("mail")),
        Some("user1@example.com")
    );
    // The failed user is not bound either
    assert_eq!(harness.store.meta(3, "adsync_object_guid"), None);
}

#[tokio::test]
async fn test_entries_bound_elsewhere_or_missing_are_skipped() {
    let harness = Harness::new(
        vec![entry(1)],
        vec![
            synced_user(2, 1).with_metadata("adsync_object_guid", guid(9)),
            synced_user(3, 7),
        ],
    );

    let report = harness
        .export()
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert_eq!(report.counts.skipped, 2);
    assert!(report.outcomes[0]
        .reason
        .as_deref()
        .unwrap()
        .contains("bound to"));
    assert_eq!(
        report.outcomes[1].reason.as_deref(),
        Some("no directory entry")
    );
    assert!(harness.directory.state().modifications.is_empty());
}

#[tokio::test]
async fn test_only_directory_users_are_candidates() {
    let local_only = LocalUser::new(LocalUserId::new(2), "kiosk")
        .unwrap()
        .with_metadata("first_name", "Kiosk");
    let admin = LocalUser::new(LocalUserId::new(1), "admin")
        .unwrap()
        .with_metadata("adsync_samaccountname", "admin")
        .with_metadata("first_name", "Root");
    let harness = Harness::new(
        vec![entry(1)],
        vec![admin, local_only, synced_user(3, 1).with_metadata("first_name", "Ada")],
    );

    let report = harness
        .export()
        .run("svc-sync", PASSWORD, BatchTrigger::Full, BatchOptions::new())
        .await;

    assert_eq!(report.processed(), 1);
    assert_eq!(report.outcomes[0].identifier, "user1");

    let reserved = harness
        .export()
        .run(
            "svc-sync",
            PASSWORD,
            BatchTrigger::SingleUser(LocalUserId::new(1)),
            BatchOptions::new(),
        )
        .await;
    assert_eq!(reserved.processed(), 0);
}
