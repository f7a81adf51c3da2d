//! Batch outcomes and reports
//!
//! Every principal handled by a batch yields one [`SyncOutcome`]. Outcomes
//! are collected by a [`BatchReportBuilder`] while the batch runs and only
//! become a [`BatchReport`] once the batch is over, so a report is never
//! observed half-built.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{LocalUserId, ObjectGuid};

/// Which way a batch moves data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    /// Directory to local store
    Import,
    /// Local store to directory
    Export,
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncKind::Import => write!(f, "import"),
            SyncKind::Export => write!(f, "export"),
        }
    }
}

/// What started a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "user_id", rename_all = "snake_case")]
pub enum BatchTrigger {
    /// Scheduled run over the whole directory
    Full,
    /// Immediate re-sync of one local user
    SingleUser(LocalUserId),
}

impl BatchTrigger {
    pub fn target(&self) -> Option<LocalUserId> {
        match self {
            BatchTrigger::Full => None,
            BatchTrigger::SingleUser(id) => Some(*id),
        }
    }
}

impl From<Option<LocalUserId>> for BatchTrigger {
    fn from(target: Option<LocalUserId>) -> Self {
        target.map_or(BatchTrigger::Full, BatchTrigger::SingleUser)
    }
}

/// Result status of one principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Created,
    Updated,
    Skipped,
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Created => write!(f, "created"),
            SyncStatus::Updated => write!(f, "updated"),
            SyncStatus::Skipped => write!(f, "skipped"),
            SyncStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of synchronizing one principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub identifier: String,
    pub status: SyncStatus,
    pub reason: Option<String>,
    /// Human-readable description of every change applied
    pub changes: Vec<String>,
}

impl SyncOutcome {
    pub fn created(identifier: impl Into<String>, changes: Vec<String>) -> Self {
        Self {
            identifier: identifier.into(),
            status: SyncStatus::Created,
            reason: None,
            changes,
        }
    }

    pub fn updated(identifier: impl Into<String>, changes: Vec<String>) -> Self {
        Self {
            identifier: identifier.into(),
            status: SyncStatus::Updated,
            reason: None,
            changes,
        }
    }

    pub fn skipped(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            status: SyncStatus::Skipped,
            reason: Some(reason.into()),
            changes: Vec::new(),
        }
    }

    pub fn failed(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            status: SyncStatus::Failed,
            reason: Some(reason.into()),
            changes: Vec::new(),
        }
    }
}

/// A data-integrity problem found while building the identity index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentityAnomaly {
    /// Several local users store the same objectGUID; the last one read
    /// owns the index entry
    DuplicateGuid {
        guid: ObjectGuid,
        users: Vec<LocalUserId>,
        kept: LocalUserId,
    },
    /// A local user stores a value that is not a GUID
    InvalidStoredGuid { user: LocalUserId, value: String },
}

impl fmt::Display for IdentityAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityAnomaly::DuplicateGuid { guid, users, kept } => {
                let ids: Vec<String> = users.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "objectGUID {guid} stored on users [{}], kept {kept}",
                    ids.join(", ")
                )
            }
            IdentityAnomaly::InvalidStoredGuid { user, value } => {
                write!(f, "user {user} stores invalid objectGUID '{value}'")
            }
        }
    }
}

/// Per-status totals of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.failed
    }

    fn record(&mut self, status: SyncStatus) {
        match status {
            SyncStatus::Created => self.created += 1,
            SyncStatus::Updated => self.updated += 1,
            SyncStatus::Skipped => self.skipped += 1,
            SyncStatus::Failed => self.failed += 1,
        }
    }
}

/// Final summary of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub kind: SyncKind,
    pub trigger: BatchTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub counts: StatusCounts,
    pub outcomes: Vec<SyncOutcome>,
    pub anomalies: Vec<IdentityAnomaly>,
    pub warnings: Vec<String>,
    /// Why the batch stopped early, if it did
    pub aborted: Option<String>,
}

impl BatchReport {
    /// Number of principals that reached the recording step
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    /// Outcomes with status `failed`
    pub fn failures(&self) -> impl Iterator<Item = &SyncOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == SyncStatus::Failed)
    }

    /// Returns true if the batch ran to completion
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }

    /// Returns true if the batch completed without failures or anomalies
    pub fn is_clean(&self) -> bool {
        self.is_complete() && self.counts.failed == 0 && self.anomalies.is_empty()
    }
}

/// Accumulates outcomes while a batch runs
#[derive(Debug)]
pub struct BatchReportBuilder {
    kind: SyncKind,
    trigger: BatchTrigger,
    started_at: DateTime<Utc>,
    counts: StatusCounts,
    outcomes: Vec<SyncOutcome>,
    anomalies: Vec<IdentityAnomaly>,
    warnings: Vec<String>,
    aborted: Option<String>,
}

impl BatchReportBuilder {
    pub fn new(kind: SyncKind, trigger: BatchTrigger) -> Self {
        Self {
            kind,
            trigger,
            started_at: Utc::now(),
            counts: StatusCounts::default(),
            outcomes: Vec::new(),
            anomalies: Vec::new(),
            warnings: Vec::new(),
            aborted: None,
        }
    }

    pub fn record(&mut self, outcome: SyncOutcome) {
        self.counts.record(outcome.status);
        self.outcomes.push(outcome);
    }

    pub fn anomalies(&mut self, anomalies: impl IntoIterator<Item = IdentityAnomaly>) {
        self.anomalies.extend(anomalies);
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Marks the batch as stopped early; the first reason wins
    pub fn abort(&mut self, reason: impl Into<String>) {
        if self.aborted.is_none() {
            self.aborted = Some(reason.into());
        }
    }

    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    /// Freezes the report
    pub fn finish(self, elapsed_ms: u64) -> BatchReport {
        BatchReport {
            kind: self.kind,
            trigger: self.trigger,
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed_ms,
            counts: self.counts,
            outcomes: self.outcomes,
            anomalies: self.anomalies,
            warnings: self.warnings,
            aborted: self.aborted,
        }
    }
}
