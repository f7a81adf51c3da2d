//! adsync Sync - Directory synchronization engine
//!
//! Provides:
//! - Directory connection lifecycle with verified binds
//! - Identity matching on objectGUID with sAMAccountName fallback
//! - Attribute mapping and conflict policy
//! - Execution-time budgeting for long batches
//! - Batch orchestration in both directions
//!
//! ## Modules
//!
//! - [`connection`] - Opens and verifies directory sessions
//! - [`identity`] - GUID index, candidate selection and principal resolution
//! - [`attributes`] - Directory ↔ local field mapping and diffs
//! - [`budget`] - Platform execution limit controller
//! - [`orchestrator`] - Batch loop, import and export directions

pub mod attributes;
pub mod budget;
pub mod connection;
pub mod identity;
pub mod orchestrator;

use adsync_core::domain::{
    AttributeMappingError, ConnectionError, DirectoryError, DomainError, IdentityAmbiguityError,
};
use thiserror::Error;

pub use attributes::{is_attribute_value_empty, AttributeService};
pub use budget::{BudgetController, BudgetStatus, CpuTimeLimit};
pub use connection::{ConnectionManager, DirectorySession};
pub use identity::{GuidIndex, IdentityMatcher, Match};
pub use orchestrator::{
    BatchContext, BatchOptions, BatchPhase, ExportToDirectory, ImportFromDirectory,
    SyncDirection, SyncOrchestrator,
};

/// Errors that can occur while synchronizing
///
/// Everything except a lost connection is confined to the principal that
/// raised it.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The session could not be established
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A directory operation failed
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The principal's attributes cannot be mapped
    #[error(transparent)]
    Mapping(#[from] AttributeMappingError),

    /// The directory identity is claimed by several local users
    #[error(transparent)]
    Ambiguous(#[from] IdentityAmbiguityError),

    /// A domain value was invalid
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The local store failed
    #[error("local store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl SyncError {
    /// Returns true if the error ends the whole batch
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Connection(_) => true,
            SyncError::Directory(err) => err.is_connection_loss(),
            _ => false,
        }
    }
}
