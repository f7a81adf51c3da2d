//! Batch orchestration
//!
//! The [`SyncOrchestrator`] drives one batch from connection to report. The
//! direction-specific work (what to enumerate, how to apply one item) lives
//! behind the [`SyncDirection`] trait, implemented by
//! [`ImportFromDirectory`] and [`ExportToDirectory`].
//!
//! ## Batch Flow
//!
//! ```text
//! Idle ──→ Connected ──→ Enumerating ──→ PerPrincipal ──→ Reporting ──→ Idle
//!                                         (Matching → Diffing → Applying → Recording)
//! ```
//!
//! Per-principal failures are recorded and the loop moves on. A lost
//! connection, a cancellation or a passed deadline stops the loop; the
//! report then carries what was done so far and the reason it stopped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use adsync_core::config::DEFAULT_IMPORT_FILTER;
use adsync_core::domain::{
    AttributeDiff, AttributeMappingError, BatchReport, BatchReportBuilder, BatchTrigger,
    DirectoryPrincipal, LocalUser, LocalUserId, MetaKey, SyncKind, SyncOutcome,
};
use adsync_core::ports::{IReportSink, IUserStore, SearchFilter, SearchRequest};
use anyhow::anyhow;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::attributes::AttributeService;
use crate::budget::BudgetController;
use crate::connection::{ConnectionManager, DirectorySession};
use crate::identity::{GuidIndex, IdentityMatcher, Match};
use crate::SyncError;

// ============================================================================
// Batch options and context
// ============================================================================

/// Limits on a single batch run
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Stop starting new principals after this instant
    pub deadline: Option<Instant>,
    /// Stop starting new principals once cancelled
    pub cancel: CancellationToken,
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// State shared by every step of one batch
pub struct BatchContext<'a> {
    pub session: &'a mut DirectorySession,
    pub index: &'a GuidIndex,
    pub trigger: BatchTrigger,
}

/// Where a batch currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Connected,
    Enumerating,
    PerPrincipal,
    Reporting,
}

// ============================================================================
// SyncDirection
// ============================================================================

/// One way of moving data between the directory and the local store
#[async_trait::async_trait]
pub trait SyncDirection: Send + Sync {
    /// What the batch iterates over
    type Item: Send + Sync;

    fn kind(&self) -> SyncKind;

    /// Identifier of `item` used in logs and outcomes
    fn identify(&self, item: &Self::Item) -> String;

    /// Lists the items the batch will process
    async fn enumerate(&self, ctx: &mut BatchContext<'_>) -> Result<Vec<Self::Item>, SyncError>;

    /// Matches, diffs and applies one item
    async fn synchronize(
        &self,
        ctx: &mut BatchContext<'_>,
        item: &Self::Item,
    ) -> Result<SyncOutcome, SyncError>;
}

// ============================================================================
// Import: directory → local store
// ============================================================================

/// Imports directory principals into the local store
pub struct ImportFromDirectory {
    store: Arc<dyn IUserStore>,
    matcher: IdentityMatcher,
    attributes: AttributeService,
    filter: String,
    create_users: bool,
}

impl ImportFromDirectory {
    pub fn new(
        store: Arc<dyn IUserStore>,
        matcher: IdentityMatcher,
        attributes: AttributeService,
    ) -> Self {
        Self {
            store,
            matcher,
            attributes,
            filter: DEFAULT_IMPORT_FILTER.to_string(),
            create_users: false,
        }
    }

    /// LDAP filter selecting the principals to import
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Create local users for principals without a match
    #[must_use]
    pub fn create_users(mut self, create: bool) -> Self {
        self.create_users = create;
        self
    }

    /// Bookkeeping updates: GUID and account-name mirrors, disabled marker
    fn identity_diffs(
        principal: &DirectoryPrincipal,
        user: Option<&LocalUser>,
    ) -> Vec<AttributeDiff> {
        let stored = |key: MetaKey| user.and_then(|u| u.meta(key));
        let mut wanted: Vec<(MetaKey, String)> = Vec::with_capacity(3);
        if let Some(guid) = principal.object_guid() {
            wanted.push((MetaKey::ObjectGuid, guid.to_string()));
        }
        if let Some(account) = principal.sam_account_name() {
            wanted.push((MetaKey::SamAccountName, account.to_string()));
        }
        let disabled = if principal.is_disabled() { "1" } else { "0" };
        wanted.push((MetaKey::Disabled, disabled.to_string()));

        wanted
            .into_iter()
            .filter(|(key, value)| stored(*key) != Some(value.as_str()))
            .map(|(key, value)| AttributeDiff {
                field: key.as_str().to_string(),
                old: stored(key).map(str::to_string),
                new: value,
            })
            .collect()
    }

    async fn apply(&self, id: LocalUserId, diffs: &[AttributeDiff]) -> Result<(), SyncError> {
        for diff in diffs {
            self.store
                .write_metadata(id, &diff.field, &diff.new)
                .await?;
        }
        self.store
            .write_metadata(
                id,
                MetaKey::LastSyncedAt.as_str(),
                &Utc::now().to_rfc3339(),
            )
            .await?;
        Ok(())
    }

    async fn create(&self, principal: &DirectoryPrincipal) -> Result<SyncOutcome, SyncError> {
        let identifier = principal.display_id();
        let Some(login) = principal.sam_account_name() else {
            return Err(AttributeMappingError::InvalidIdentifier(format!(
                "{} has no sAMAccountName to use as login",
                principal.dn()
            ))
            .into());
        };

        // Validate before creating so a bad entry leaves no half-made user
        let mut diffs = self.attributes.map_directory_to_local(principal, None)?;
        diffs.extend(Self::identity_diffs(principal, None));

        let user = self.store.create_user(login).await?;
        self.apply(user.id(), &diffs).await?;
        info!(user = %user.id(), login, "Created local user");
        Ok(SyncOutcome::created(
            identifier,
            diffs.iter().map(ToString::to_string).collect(),
        ))
    }

    async fn update(
        &self,
        principal: &DirectoryPrincipal,
        id: LocalUserId,
    ) -> Result<SyncOutcome, SyncError> {
        let identifier = principal.display_id();
        let user = self
            .store
            .get_user(id)
            .await?
            .ok_or_else(|| anyhow!("local user {id} disappeared during the batch"))?;

        // The batch index is a snapshot; an earlier principal may have bound this user
        if let (Some(bound), Some(guid)) = (user.object_guid(), principal.object_guid()) {
            if &bound != guid {
                debug!(user = %id, bound = %bound, "User already bound to another objectGUID");
                return Ok(SyncOutcome::skipped(
                    identifier,
                    format!("local user {id} is bound to objectGUID {bound}"),
                ));
            }
        }

        let mut diffs = self.attributes.map_directory_to_local(principal, Some(&user))?;
        diffs.extend(Self::identity_diffs(principal, Some(&user)));
        if diffs.is_empty() {
            return Ok(SyncOutcome::skipped(identifier, "unchanged"));
        }

        self.apply(id, &diffs).await?;
        debug!(user = %id, changes = diffs.len(), "Updated local user");
        Ok(SyncOutcome::updated(
            identifier,
            diffs.iter().map(ToString::to_string).collect(),
        ))
    }

    fn search_for(&self, filter: SearchFilter) -> SearchRequest {
        SearchRequest::new(
            SearchFilter::Raw(self.filter.clone()).and(filter),
            self.attributes.requested_attributes(),
        )
    }
}

#[async_trait::async_trait]
impl SyncDirection for ImportFromDirectory {
    type Item = DirectoryPrincipal;

    fn kind(&self) -> SyncKind {
        SyncKind::Import
    }

    fn identify(&self, item: &DirectoryPrincipal) -> String {
        item.display_id()
    }

    async fn enumerate(
        &self,
        ctx: &mut BatchContext<'_>,
    ) -> Result<Vec<DirectoryPrincipal>, SyncError> {
        let Some(target) = ctx.trigger.target() else {
            let request = SearchRequest::new(
                SearchFilter::Raw(self.filter.clone()),
                self.attributes.requested_attributes(),
            );
            return Ok(ctx.session.search(&request).await?);
        };

        let candidates = self.matcher.find_principal_candidates(Some(target)).await?;
        let Some(user) = candidates.into_iter().next() else {
            info!(user = %target, "Target user is not eligible for import");
            return Ok(Vec::new());
        };

        if let Some(guid) = user.object_guid() {
            let found = ctx
                .session
                .search(&self.search_for(SearchFilter::ObjectGuid(guid)))
                .await?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        match user.account_name() {
            Some(account) => Ok(ctx
                .session
                .search(&self.search_for(SearchFilter::AccountName(account.to_string())))
                .await?),
            None => Ok(Vec::new()),
        }
    }

    async fn synchronize(
        &self,
        ctx: &mut BatchContext<'_>,
        principal: &DirectoryPrincipal,
    ) -> Result<SyncOutcome, SyncError> {
        if principal.object_guid().is_none() && principal.sam_account_name().is_none() {
            return Err(AttributeMappingError::InvalidIdentifier(format!(
                "{} has neither objectGUID nor sAMAccountName",
                principal.dn()
            ))
            .into());
        }

        match self.matcher.resolve(principal, ctx.index).await? {
            Match::Ambiguous(err) => Ok(SyncOutcome::skipped(
                principal.display_id(),
                err.to_string(),
            )),
            Match::Unmatched if self.create_users => self.create(principal).await,
            Match::Unmatched => Ok(SyncOutcome::skipped(
                principal.display_id(),
                "no matching local user",
            )),
            Match::ByGuid(id) | Match::ByAccountName(id) => self.update(principal, id).await,
        }
    }
}

// ============================================================================
// Export: local store → directory
// ============================================================================

/// Exports local user fields to their directory entries
pub struct ExportToDirectory {
    store: Arc<dyn IUserStore>,
    matcher: IdentityMatcher,
    attributes: AttributeService,
    filter: String,
}

impl ExportToDirectory {
    pub fn new(
        store: Arc<dyn IUserStore>,
        matcher: IdentityMatcher,
        attributes: AttributeService,
    ) -> Self {
        Self {
            store,
            matcher,
            attributes,
            filter: DEFAULT_IMPORT_FILTER.to_string(),
        }
    }

    /// LDAP filter every located entry must also satisfy
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    async fn locate(
        &self,
        session: &mut DirectorySession,
        user: &LocalUser,
    ) -> Result<Vec<DirectoryPrincipal>, SyncError> {
        let attributes = self.attributes.requested_attributes();
        let raw = || SearchFilter::Raw(self.filter.clone());

        if let Some(guid) = user.object_guid() {
            let request =
                SearchRequest::new(raw().and(SearchFilter::ObjectGuid(guid)), attributes.clone());
            let found = session.search(&request).await?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        match user.account_name() {
            Some(account) => {
                let request = SearchRequest::new(
                    raw().and(SearchFilter::AccountName(account.to_string())),
                    attributes,
                );
                Ok(session.search(&request).await?)
            }
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl SyncDirection for ExportToDirectory {
    type Item = LocalUser;

    fn kind(&self) -> SyncKind {
        SyncKind::Export
    }

    fn identify(&self, item: &LocalUser) -> String {
        item.login().to_string()
    }

    async fn enumerate(&self, ctx: &mut BatchContext<'_>) -> Result<Vec<LocalUser>, SyncError> {
        Ok(self
            .matcher
            .find_principal_candidates(ctx.trigger.target())
            .await?)
    }

    async fn synchronize(
        &self,
        ctx: &mut BatchContext<'_>,
        user: &LocalUser,
    ) -> Result<SyncOutcome, SyncError> {
        let identifier = user.login().to_string();
        let stored_guid = user.object_guid();

        if let Some(err) = stored_guid.as_ref().and_then(|g| ctx.index.ambiguity(g)) {
            return Ok(SyncOutcome::skipped(identifier, err.to_string()));
        }

        let mut entries = self.locate(&mut *ctx.session, user).await?;
        let principal = match entries.len() {
            0 => return Ok(SyncOutcome::skipped(identifier, "no directory entry")),
            1 => entries.remove(0),
            n => {
                return Ok(SyncOutcome::failed(
                    identifier,
                    format!("{n} directory entries match"),
                ))
            }
        };

        if let (Some(stored), Some(found)) = (stored_guid.as_ref(), principal.object_guid()) {
            if stored != found {
                return Ok(SyncOutcome::skipped(
                    identifier,
                    format!("directory entry has objectGUID {found}, user is bound to {stored}"),
                ));
            }
        }
        // Validate before binding so a failed user is left untouched
        let changes = self.attributes.map_local_to_directory(user, &principal)?;

        let mut applied: Vec<String> = Vec::new();
        if let (None, Some(found)) = (stored_guid.as_ref(), principal.object_guid()) {
            self.store
                .write_metadata(user.id(), MetaKey::ObjectGuid.as_str(), found.as_str())
                .await?;
            applied.push(
                AttributeDiff {
                    field: MetaKey::ObjectGuid.as_str().to_string(),
                    old: None,
                    new: found.to_string(),
                }
                .to_string(),
            );
        }

        if !changes.is_empty() {
            ctx.session.modify(principal.dn(), &changes).await?;
            debug!(dn = principal.dn(), changes = changes.len(), "Modified directory entry");
            applied.extend(changes.iter().map(ToString::to_string));
        }

        if applied.is_empty() {
            Ok(SyncOutcome::skipped(identifier, "unchanged"))
        } else {
            Ok(SyncOutcome::updated(identifier, applied))
        }
    }
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

/// Runs batches in one direction
pub struct SyncOrchestrator<D: SyncDirection> {
    direction: D,
    connections: ConnectionManager,
    matcher: IdentityMatcher,
    budget: Option<BudgetController>,
    sink: Option<Arc<dyn IReportSink>>,
    safety_margin: Duration,
    started: Option<Instant>,
    phase: BatchPhase,
    span: tracing::Span,
}

impl<D: SyncDirection> SyncOrchestrator<D> {
    pub fn new(direction: D, connections: ConnectionManager, matcher: IdentityMatcher) -> Self {
        Self {
            direction,
            connections,
            matcher,
            budget: None,
            sink: None,
            safety_margin: Duration::from_secs(60),
            started: None,
            phase: BatchPhase::Idle,
            span: tracing::info_span!("orchestrator"),
        }
    }

    /// Checks the platform execution limit before each batch
    #[must_use]
    pub fn with_budget(mut self, budget: BudgetController) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Receives every finished report
    #[must_use]
    pub fn with_report_sink(mut self, sink: Arc<dyn IReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Time kept in reserve when deriving a deadline from the platform limit
    ///
    /// The derived deadline is measured in wall-clock time against a limit
    /// in CPU seconds, which makes it a conservative approximation.
    #[must_use]
    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn direction(&self) -> &D {
        &self.direction
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    /// Marks the start of a batch
    pub fn start_timer(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Time since [`start_timer`](Self::start_timer); zero if never started
    pub fn elapsed_time(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    fn enter(&mut self, phase: BatchPhase) {
        debug!(parent: &self.span, from = ?self.phase, to = ?phase, "Batch phase");
        self.phase = phase;
    }

    /// Runs one batch and returns its report
    ///
    /// Never fails: connection problems, cancellation and deadlines end up
    /// in the report's `aborted` field, per-item errors as `failed` outcomes.
    #[tracing::instrument(
        parent = &self.span,
        skip_all,
        fields(kind = %self.direction.kind(), trigger = ?trigger)
    )]
    pub async fn run(
        &mut self,
        username: &str,
        password: &str,
        trigger: BatchTrigger,
        options: BatchOptions,
    ) -> BatchReport {
        self.start_timer();
        let mut report = BatchReportBuilder::new(self.direction.kind(), trigger);
        info!("Starting batch");

        let mut deadline = options.deadline;
        if let Some(budget) = &self.budget {
            let status = budget.ensure_long_running_budget();
            if let Some(warning) = status.warning() {
                report.warn(warning.to_string());
            }
            // The platform limit counts CPU seconds but the deadline is wall-clock,
            // so an I/O-bound batch stops before the platform would stop it
            if deadline.is_none() {
                deadline = status
                    .limit()
                    .map(|limit| Instant::now() + limit.saturating_sub(self.safety_margin));
            }
        }

        match self.connections.connect(username, password).await {
            Ok(mut session) => {
                self.enter(BatchPhase::Connected);
                self.drive(&mut session, &mut report, trigger, deadline, &options.cancel)
                    .await;
                session.close().await;
            }
            Err(err) => {
                error!(error = %err, "Cannot open directory session");
                report.abort(format!("connection failed: {err}"));
            }
        }

        self.enter(BatchPhase::Reporting);
        let elapsed_ms = u64::try_from(self.elapsed_time().as_millis()).unwrap_or(u64::MAX);
        let report = report.finish(elapsed_ms);
        info!(
            processed = report.processed(),
            created = report.counts.created,
            updated = report.counts.updated,
            skipped = report.counts.skipped,
            failed = report.counts.failed,
            anomalies = report.anomalies.len(),
            aborted = report.aborted.as_deref(),
            elapsed_ms,
            "Batch finished"
        );

        if let Some(sink) = &self.sink {
            if let Err(err) = sink.record_batch(&report).await {
                warn!(error = %format!("{err:#}"), "Failed to record batch report");
            }
        }
        self.enter(BatchPhase::Idle);
        report
    }

    async fn drive(
        &mut self,
        session: &mut DirectorySession,
        report: &mut BatchReportBuilder,
        trigger: BatchTrigger,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) {
        let index = match self.matcher.build_guid_to_login_index().await {
            Ok(index) => index,
            Err(err) => {
                error!(error = %format!("{err:#}"), "Cannot build identity index");
                report.abort(format!("identity index unavailable: {err:#}"));
                return;
            }
        };
        report.anomalies(index.anomalies().iter().cloned());

        self.enter(BatchPhase::Enumerating);
        let mut ctx = BatchContext {
            session,
            index: &index,
            trigger,
        };
        let items = match self.direction.enumerate(&mut ctx).await {
            Ok(items) => items,
            Err(err) => {
                error!(error = %err, "Enumeration failed");
                report.abort(format!("enumeration failed: {err}"));
                return;
            }
        };
        info!(candidates = items.len(), "Enumerated batch");

        self.phase = BatchPhase::PerPrincipal;
        for item in &items {
            if cancel.is_cancelled() {
                warn!(processed = report.processed(), "Batch cancelled");
                report.abort("cancelled");
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(processed = report.processed(), "Batch deadline reached");
                report.abort("deadline reached");
                break;
            }

            let identifier = self.direction.identify(item);
            let span = tracing::info_span!(parent: &self.span, "principal", principal = %identifier);
            match self
                .direction
                .synchronize(&mut ctx, item)
                .instrument(span)
                .await
            {
                Ok(outcome) => {
                    debug!(principal = %identifier, status = %outcome.status, "Principal done");
                    report.record(outcome);
                }
                Err(err) if err.is_fatal() => {
                    error!(principal = %identifier, error = %err, "Connection lost, stopping batch");
                    report.record(SyncOutcome::failed(identifier, err.to_string()));
                    report.abort(format!("connection lost: {err}"));
                    break;
                }
                Err(err) => {
                    warn!(principal = %identifier, error = %err, "Principal failed");
                    report.record(SyncOutcome::failed(identifier, err.to_string()));
                }
            }
        }
    }
}
