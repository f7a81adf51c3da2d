//! Domain entities and business logic
//!
//! This module contains the core domain types for adsync:
//! - Newtypes for validated identifiers and attribute keys
//! - Directory principals and local users
//! - Connection credentials
//! - Field mappings and diffs
//! - Batch outcomes and reports
//! - Domain-specific error types

pub mod connection;
pub mod errors;
pub mod mapping;
pub mod newtypes;
pub mod principal;
pub mod report;
pub mod user;

// Re-export commonly used types
pub use connection::ConnectionDetails;
pub use errors::{
    AttributeMappingError, ConnectionError, DirectoryError, DomainError, IdentityAmbiguityError,
    PlatformLimitWarning,
};
pub use mapping::{
    AttributeDiff, ConflictPolicy, DirectoryChange, FieldMapping, MappingDirection,
    MultiValuePolicy, Transform,
};
pub use newtypes::*;
pub use principal::{AttributeMap, DirectoryPrincipal};
pub use report::{
    BatchReport, BatchReportBuilder, BatchTrigger, IdentityAnomaly, StatusCounts, SyncKind,
    SyncOutcome, SyncStatus,
};
pub use user::{LocalUser, ReservedIdentitySet};
