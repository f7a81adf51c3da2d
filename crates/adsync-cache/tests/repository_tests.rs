//! Integration tests for SqliteUserStore
//!
//! Each test gets a fresh in-memory database, which starts out holding
//! only the superuser record (id 1).

use adsync_cache::{DatabasePool, SqliteUserStore};
use adsync_core::domain::{
    BatchReportBuilder, BatchTrigger, LocalUserId, MetaKey, SyncKind, SyncOutcome,
};
use adsync_core::ports::{IReportSink, IUserStore, UserFilter};

// ============================================================================
// Test helpers
// ============================================================================

async fn setup() -> SqliteUserStore {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteUserStore::new(pool.pool().clone())
}

/// Creates a directory-originated user bound to `guid`
async fn create_directory_user(store: &SqliteUserStore, login: &str, guid: &str) -> LocalUserId {
    let user = store.create_user(login).await.unwrap();
    store
        .write_metadata(user.id(), MetaKey::SamAccountName.as_str(), login)
        .await
        .unwrap();
    store
        .write_metadata(user.id(), MetaKey::ObjectGuid.as_str(), guid)
        .await
        .unwrap();
    user.id()
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn test_superuser_is_seeded() {
    let store = setup().await;

    let admin = store.get_user(LocalUserId::new(1)).await.unwrap().unwrap();
    assert_eq!(admin.login(), "admin");
    assert!(admin.metadata().is_empty());
    assert!(!admin.is_directory_user());
}

#[tokio::test]
async fn test_create_user_assigns_increasing_ids() {
    let store = setup().await;

    let first = store.create_user("jdoe").await.unwrap();
    let second = store.create_user("asmith").await.unwrap();

    assert!(first.id() > LocalUserId::new(1));
    assert!(second.id() > first.id());
    assert_eq!(second.login(), "asmith");
}

#[tokio::test]
async fn test_create_user_rejects_duplicate_login_ignoring_case() {
    let store = setup().await;
    store.create_user("jdoe").await.unwrap();

    let err = store.create_user("JDoe").await.unwrap_err();
    assert!(err.to_string().contains("JDoe"), "{err:#}");
}

#[tokio::test]
async fn test_create_user_rejects_blank_login() {
    let store = setup().await;
    assert!(store.create_user("  ").await.is_err());
}

#[tokio::test]
async fn test_find_by_login_is_case_insensitive() {
    let store = setup().await;
    let id = create_directory_user(&store, "jdoe", "guid-1").await;

    let found = store.find_by_login("JDOE").await.unwrap().unwrap();
    assert_eq!(found.id(), id);
    assert_eq!(found.account_name(), Some("jdoe"));

    assert!(store.find_by_login("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_missing_user() {
    let store = setup().await;
    assert!(store.get_user(LocalUserId::new(42)).await.unwrap().is_none());
}

// ============================================================================
// Metadata
// ============================================================================

#[tokio::test]
async fn test_write_metadata_inserts_then_updates() {
    let store = setup().await;
    let user = store.create_user("jdoe").await.unwrap();

    store.write_metadata(user.id(), "email", "old@example.com").await.unwrap();
    store.write_metadata(user.id(), "email", "new@example.com").await.unwrap();

    assert_eq!(
        store.read_metadata(user.id(), "email").await.unwrap().as_deref(),
        Some("new@example.com")
    );
    let loaded = store.get_user(user.id()).await.unwrap().unwrap();
    assert_eq!(loaded.metadata().len(), 1);
}

#[tokio::test]
async fn test_read_missing_metadata() {
    let store = setup().await;
    let user = store.create_user("jdoe").await.unwrap();
    assert!(store.read_metadata(user.id(), "email").await.unwrap().is_none());
}

#[tokio::test]
async fn test_write_metadata_for_unknown_user_fails() {
    let store = setup().await;
    let result = store
        .write_metadata(LocalUserId::new(99), "email", "x@example.com")
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_get_user_loads_all_metadata() {
    let store = setup().await;
    let id = create_directory_user(&store, "jdoe", "3f2504e0-4f89-11d3-9a0c-0305e82c3301").await;
    store.write_metadata(id, "first_name", "John").await.unwrap();

    let user = store.get_user(id).await.unwrap().unwrap();
    assert_eq!(user.metadata().len(), 3);
    assert_eq!(user.meta(MetaKey::SamAccountName), Some("jdoe"));
    assert_eq!(
        user.object_guid().map(|g| g.to_string()).as_deref(),
        Some("3f2504e0-4f89-11d3-9a0c-0305e82c3301")
    );
    assert!(user.is_directory_user());
}

// ============================================================================
// Filters
// ============================================================================

#[tokio::test]
async fn test_query_users_ordered_by_id() {
    let store = setup().await;
    let a = create_directory_user(&store, "zed", "g-a").await;
    let b = create_directory_user(&store, "amy", "g-b").await;

    let ids: Vec<_> = store
        .query_users(&UserFilter::new())
        .await
        .unwrap()
        .iter()
        .map(|u| u.id())
        .collect();
    assert_eq!(ids, vec![LocalUserId::new(1), a, b]);
}

#[tokio::test]
async fn test_query_users_non_empty_meta() {
    let store = setup().await;
    let directory_user = create_directory_user(&store, "jdoe", "g-1").await;
    let blank = store.create_user("blank").await.unwrap();
    store
        .write_metadata(blank.id(), MetaKey::SamAccountName.as_str(), "  ")
        .await
        .unwrap();
    store.create_user("local-only").await.unwrap();

    let users = store
        .query_users(&UserFilter::new().with_non_empty_meta(MetaKey::SamAccountName.as_str()))
        .await
        .unwrap();

    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id(), directory_user);
    // the joined rows still carry every key, not only the filtered one
    assert_eq!(users[0].metadata().len(), 2);
}

#[tokio::test]
async fn test_query_users_exclude_and_only() {
    let store = setup().await;
    let a = create_directory_user(&store, "a", "g-a").await;
    let b = create_directory_user(&store, "b", "g-b").await;

    let users = store
        .query_users(&UserFilter::new().excluding([LocalUserId::new(1), a]))
        .await
        .unwrap();
    assert_eq!(users.iter().map(|u| u.id()).collect::<Vec<_>>(), vec![b]);

    let users = store
        .query_users(&UserFilter::new().excluding([LocalUserId::new(1)]).only(a))
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id(), a);

    let users = store
        .query_users(&UserFilter::new().excluding([a]).only(a))
        .await
        .unwrap();
    assert!(users.is_empty());
}

#[tokio::test]
async fn test_query_agrees_with_filter_matches() {
    let store = setup().await;
    create_directory_user(&store, "a", "g-a").await;
    store.create_user("b").await.unwrap();
    create_directory_user(&store, "c", "g-c").await;

    let filter = UserFilter::new()
        .with_non_empty_meta(MetaKey::SamAccountName.as_str())
        .excluding([LocalUserId::new(1)]);
    let everyone = store.query_users(&UserFilter::new()).await.unwrap();
    let expected: Vec<_> = everyone.into_iter().filter(|u| filter.matches(u)).collect();

    assert_eq!(store.query_users(&filter).await.unwrap(), expected);
}

// ============================================================================
// Batch history
// ============================================================================

#[tokio::test]
async fn test_batches_are_returned_newest_first() {
    let store = setup().await;

    let mut import = BatchReportBuilder::new(SyncKind::Import, BatchTrigger::Full);
    import.record(SyncOutcome::updated("jdoe", vec!["email: '' -> 'j@x'".into()]));
    store.record_batch(&import.finish(12)).await.unwrap();

    let mut export =
        BatchReportBuilder::new(SyncKind::Export, BatchTrigger::SingleUser(LocalUserId::new(5)));
    export.record(SyncOutcome::failed("jdoe", "code 50: insufficient access"));
    export.abort("connection lost: server down");
    store.record_batch(&export.finish(3)).await.unwrap();

    let reports = store.recent_batches(10).await.unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].kind, SyncKind::Export);
    assert_eq!(reports[0].trigger, BatchTrigger::SingleUser(LocalUserId::new(5)));
    assert_eq!(reports[0].counts.failed, 1);
    assert_eq!(reports[0].aborted.as_deref(), Some("connection lost: server down"));
    assert_eq!(reports[1].kind, SyncKind::Import);
    assert_eq!(reports[1].elapsed_ms, 12);
    assert_eq!(reports[1].outcomes[0].changes, vec!["email: '' -> 'j@x'".to_string()]);
}

#[tokio::test]
async fn test_recent_batches_honours_limit() {
    let store = setup().await;
    for elapsed in 0..5 {
        let report = BatchReportBuilder::new(SyncKind::Import, BatchTrigger::Full).finish(elapsed);
        store.record_batch(&report).await.unwrap();
    }

    let reports = store.recent_batches(2).await.unwrap();
    assert_eq!(
        reports.iter().map(|r| r.elapsed_ms).collect::<Vec<_>>(),
        vec![4, 3]
    );
    assert!(store.recent_batches(0).await.unwrap().is_empty());
}

// ============================================================================
// File databases
// ============================================================================

#[tokio::test]
async fn test_file_database_persists_across_pools() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("adsync.db");

    {
        let pool = DatabasePool::new(&path).await.unwrap();
        let store = SqliteUserStore::new(pool.pool().clone());
        create_directory_user(&store, "jdoe", "g-1").await;
    }

    let pool = DatabasePool::new(&path).await.unwrap();
    let store = SqliteUserStore::new(pool.pool().clone());
    let user = store.find_by_login("jdoe").await.unwrap().unwrap();
    assert_eq!(user.meta(MetaKey::ObjectGuid), Some("g-1"));
    // re-running the migration does not duplicate the superuser
    assert_eq!(store.query_users(&UserFilter::new()).await.unwrap().len(), 2);
}
