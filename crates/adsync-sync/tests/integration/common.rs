//! Shared fakes for engine integration tests
//!
//! The directory, the local store, the report sink and the execution limit
//! are all in-memory. The fake directory can be told to reject writes to
//! given DNs, drop the connection after a number of operations, or cancel
//! a token when a search is made.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adsync_core::domain::{
    AttributeMap, AttributeName, BatchReport, ConnectionDetails, DirectoryChange, DirectoryError,
    DirectoryPrincipal, FieldMapping, LocalField, LocalUser, LocalUserId, MetaKey,
    MultiValuePolicy, ReservedIdentitySet,
};
use adsync_core::ports::{
    IDirectoryConnector, IDirectorySession, IExecutionLimit, IReportSink, IUserStore,
    SearchFilter, SearchRequest, UserFilter,
};
use adsync_sync::{
    AttributeService, ConnectionManager, ExportToDirectory, IdentityMatcher, ImportFromDirectory,
    SyncOrchestrator,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub const PASSWORD: &str = "s3cret";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("adsync_sync=debug")
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn attr(name: &str) -> AttributeName {
    AttributeName::new(name).unwrap()
}

pub fn guid(n: usize) -> String {
    format!("00000000-0000-4000-8000-{n:012}")
}

/// Directory entry for `user{n}` with every mapped attribute populated
pub fn entry(n: usize) -> DirectoryPrincipal {
    DirectoryPrincipal::new(
        format!("CN=User {n},OU=Staff,DC=example,DC=com"),
        AttributeMap::new()
            .with(AttributeName::object_guid(), vec![guid(n)])
            .with(AttributeName::sam_account_name(), vec![format!("user{n}")])
            .with(AttributeName::user_account_control(), vec!["512".into()])
            .with(attr("givenName"), vec![format!("User{n}")])
            .with(attr("mail"), vec![format!("user{n}@example.com")])
            .with(
                attr("proxyAddresses"),
                vec![
                    format!("smtp:user{n}@example.com"),
                    format!("smtp:u{n}@example.com"),
                ],
            ),
    )
}

/// `principal` with `attribute` replaced (or removed when `values` is `None`)
pub fn with_attr(
    principal: DirectoryPrincipal,
    attribute: &str,
    values: Option<Vec<String>>,
) -> DirectoryPrincipal {
    let mut attributes = principal.attributes().clone();
    match values {
        Some(values) => attributes.insert(attr(attribute), values),
        None => {
            attributes.remove(&attr(attribute));
        }
    }
    DirectoryPrincipal::new(principal.dn(), attributes)
}

/// Local user bound to `entry(n)` with no profile fields yet
pub fn bound_user(id: u64, n: usize) -> LocalUser {
    LocalUser::new(LocalUserId::new(id), format!("user{n}"))
        .unwrap()
        .with_metadata(MetaKey::SamAccountName.as_str(), format!("user{n}"))
        .with_metadata(MetaKey::ObjectGuid.as_str(), guid(n))
}

/// Local user whose profile matches `entry(n)` exactly
pub fn synced_user(id: u64, n: usize) -> LocalUser {
    bound_user(id, n)
        .with_metadata(MetaKey::Disabled.as_str(), "0")
        .with_metadata("first_name", format!("User{n}"))
        .with_metadata("email", format!("user{n}@example.com"))
        .with_metadata(
            "aliases",
            format!("smtp:user{n}@example.com, smtp:u{n}@example.com"),
        )
}

pub fn attributes() -> AttributeService {
    AttributeService::new(vec![
        FieldMapping::new(attr("givenName"), LocalField::new("first_name").unwrap()),
        FieldMapping::new(attr("mail"), LocalField::new("email").unwrap()).required(true),
        FieldMapping::new(attr("proxyAddresses"), LocalField::new("aliases").unwrap())
            .multi_value(MultiValuePolicy::Join {
                separator: ", ".into(),
            }),
    ])
}

// ============================================================================
// Local store
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<BTreeMap<LocalUserId, LocalUser>>,
}

impl MemoryStore {
    /// Store holding only the superuser record
    pub fn with_superuser() -> Self {
        let store = Self::default();
        store.insert(LocalUser::new(LocalUserId::new(1), "admin").unwrap());
        store
    }

    pub fn insert(&self, user: LocalUser) {
        self.users.lock().unwrap().insert(user.id(), user);
    }

    pub fn user(&self, id: u64) -> LocalUser {
        self.users.lock().unwrap()[&LocalUserId::new(id)].clone()
    }

    pub fn meta(&self, id: u64, key: &str) -> Option<String> {
        self.user(id).metadata().get(key).cloned()
    }

    pub fn by_login(&self, login: &str) -> Option<LocalUser> {
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.login() == login)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[async_trait]
impl IUserStore for MemoryStore {
    async fn query_users(&self, filter: &UserFilter) -> anyhow::Result<Vec<LocalUser>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect())
    }

    async fn get_user(&self, id: LocalUserId) -> anyhow::Result<Option<LocalUser>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_login(&self, login: &str) -> anyhow::Result<Option<LocalUser>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.login().eq_ignore_ascii_case(login))
            .cloned())
    }

    async fn read_metadata(&self, id: LocalUserId, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|u| u.metadata().get(key).cloned()))
    }

    async fn write_metadata(&self, id: LocalUserId, key: &str, value: &str) -> anyhow::Result<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("no user {id}"))?;
        user.set_metadata(key, value);
        Ok(())
    }

    async fn create_user(&self, login: &str) -> anyhow::Result<LocalUser> {
        let mut users = self.users.lock().unwrap();
        let next = users.keys().last().map_or(1, |id| id.as_u64() + 1);
        let user = LocalUser::new(LocalUserId::new(next), login)?;
        users.insert(user.id(), user.clone());
        Ok(user)
    }
}

// ============================================================================
// Directory
// ============================================================================

#[derive(Default)]
pub struct DirectoryState {
    pub entries: Vec<DirectoryPrincipal>,
    pub modifications: Vec<(String, Vec<DirectoryChange>)>,
    /// Modifications on these DNs are rejected
    pub reject_dns: HashSet<String>,
    /// Searches and modifies after this many operations fail with a lost connection
    pub lose_connection_after: Option<usize>,
    /// Cancel the token when the n-th search (1-based) is made
    pub cancel_on_search: Option<(usize, CancellationToken)>,
    pub operations: usize,
    pub searches: usize,
    pub opened: usize,
    pub closed: usize,
}

impl DirectoryState {
    fn operation(&mut self) -> Result<(), DirectoryError> {
        self.operations += 1;
        match self.lose_connection_after {
            Some(limit) if self.operations > limit => Err(DirectoryError::ConnectionLost(
                "connection reset by peer".into(),
            )),
            _ => Ok(()),
        }
    }
}

pub struct FakeDirectory {
    pub state: Arc<Mutex<DirectoryState>>,
}

impl FakeDirectory {
    pub fn new(entries: Vec<DirectoryPrincipal>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DirectoryState {
                entries,
                ..DirectoryState::default()
            })),
        }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap()
    }

    pub fn entry(&self, dn: &str) -> DirectoryPrincipal {
        self.state()
            .entries
            .iter()
            .find(|e| e.dn() == dn)
            .cloned()
            .unwrap()
    }
}

#[async_trait]
impl IDirectoryConnector for FakeDirectory {
    async fn open(
        &self,
        details: ConnectionDetails,
    ) -> Result<Box<dyn IDirectorySession>, DirectoryError> {
        if details.password() != PASSWORD {
            return Err(DirectoryError::Rejected {
                dn: details.username().to_string(),
                message: "invalid credentials".into(),
            });
        }
        self.state().opened += 1;
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<DirectoryState>>,
}

fn filter_matches(filter: &SearchFilter, entry: &DirectoryPrincipal) -> bool {
    match filter {
        SearchFilter::Raw(_) => true,
        SearchFilter::ObjectGuid(guid) => entry.object_guid() == Some(guid),
        SearchFilter::AccountName(name) => entry
            .sam_account_name()
            .is_some_and(|sam| sam.eq_ignore_ascii_case(name)),
        SearchFilter::And(parts) => parts.iter().all(|part| filter_matches(part, entry)),
    }
}

#[async_trait]
impl IDirectorySession for FakeSession {
    async fn bind(&mut self, _username: &str, password: &str) -> Result<bool, DirectoryError> {
        Ok(password == PASSWORD)
    }

    async fn search(
        &mut self,
        request: &SearchRequest,
    ) -> Result<Vec<DirectoryPrincipal>, DirectoryError> {
        let mut state = self.state.lock().unwrap();
        state.operation()?;
        state.searches += 1;
        if let Some((at, token)) = &state.cancel_on_search {
            if *at == state.searches {
                token.cancel();
            }
        }
        Ok(state
            .entries
            .iter()
            .filter(|e| filter_matches(&request.filter, e))
            .cloned()
            .collect())
    }

    async fn modify(&mut self, dn: &str, changes: &[DirectoryChange]) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().unwrap();
        state.operation()?;
        if state.reject_dns.contains(dn) {
            return Err(DirectoryError::Rejected {
                dn: dn.to_string(),
                message: "insufficient access rights".into(),
            });
        }
        let position = state
            .entries
            .iter()
            .position(|e| e.dn() == dn)
            .ok_or_else(|| DirectoryError::NoSuchEntry(dn.to_string()))?;

        let mut attributes = state.entries[position].attributes().clone();
        for change in changes {
            match change {
                DirectoryChange::Replace { attribute, values } => {
                    attributes.insert(attribute.clone(), values.clone());
                }
                DirectoryChange::Clear { attribute } => {
                    attributes.remove(attribute);
                }
            }
        }
        state.entries[position] = DirectoryPrincipal::new(dn, attributes);
        state.modifications.push((dn.to_string(), changes.to_vec()));
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DirectoryError> {
        self.state.lock().unwrap().closed += 1;
        Ok(())
    }
}

// ============================================================================
// Report sink and execution limit
// ============================================================================

#[derive(Default)]
pub struct MemorySink {
    reports: Mutex<Vec<BatchReport>>,
}

impl MemorySink {
    pub fn reports(&self) -> Vec<BatchReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl IReportSink for MemorySink {
    async fn record_batch(&self, report: &BatchReport) -> anyhow::Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }

    async fn recent_batches(&self, limit: u32) -> anyhow::Result<Vec<BatchReport>> {
        Ok(self
            .reports
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Limit the "platform" caps at `ceiling`
pub struct FakeLimit {
    value: Mutex<Option<Duration>>,
    ceiling: Option<Duration>,
    pub raises: AtomicUsize,
}

impl FakeLimit {
    pub fn new(value_secs: u64, ceiling_secs: Option<u64>) -> Self {
        Self {
            value: Mutex::new(Some(Duration::from_secs(value_secs))),
            ceiling: ceiling_secs.map(Duration::from_secs),
            raises: AtomicUsize::new(0),
        }
    }

    pub fn raises(&self) -> usize {
        self.raises.load(Ordering::SeqCst)
    }
}

impl IExecutionLimit for FakeLimit {
    fn current(&self) -> std::io::Result<Option<Duration>> {
        Ok(*self.value.lock().unwrap())
    }

    fn raise_to(&self, limit: Duration) -> std::io::Result<()> {
        self.raises.fetch_add(1, Ordering::SeqCst);
        let applied = self.ceiling.map_or(limit, |c| limit.min(c));
        *self.value.lock().unwrap() = Some(applied);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub directory: Arc<FakeDirectory>,
    pub sink: Arc<MemorySink>,
}

impl Harness {
    pub fn new(entries: Vec<DirectoryPrincipal>, users: Vec<LocalUser>) -> Self {
        init_tracing();
        let store = MemoryStore::with_superuser();
        for user in users {
            store.insert(user);
        }
        Self {
            store: Arc::new(store),
            directory: Arc::new(FakeDirectory::new(entries)),
            sink: Arc::new(MemorySink::default()),
        }
    }

    fn matcher(&self) -> IdentityMatcher {
        IdentityMatcher::new(self.store.clone(), ReservedIdentitySet::default())
    }

    pub fn import(&self, create_users: bool) -> SyncOrchestrator<ImportFromDirectory> {
        let matcher = self.matcher();
        let direction = ImportFromDirectory::new(self.store.clone(), matcher.clone(), attributes())
            .create_users(create_users);
        SyncOrchestrator::new(
            direction,
            ConnectionManager::new(self.directory.clone()),
            matcher,
        )
        .with_report_sink(self.sink.clone())
    }

    pub fn export(&self) -> SyncOrchestrator<ExportToDirectory> {
        let matcher = self.matcher();
        let direction = ExportToDirectory::new(self.store.clone(), matcher.clone(), attributes());
        SyncOrchestrator::new(
            direction,
            ConnectionManager::new(self.directory.clone()),
            matcher,
        )
        .with_report_sink(self.sink.clone())
    }
}
