//! Domain error types
//!
//! This module defines the validation errors raised when constructing
//! domain values, and the error taxonomy of the synchronization engine:
//!
//! - [`ConnectionError`] - bind/verify failures; aborts a batch
//! - [`IdentityAmbiguityError`] - a directory identity maps to several local users
//! - [`AttributeMappingError`] - a single principal cannot be mapped
//! - [`PlatformLimitWarning`] - the execution-time ceiling could not be raised
//! - [`DirectoryError`] - failures reported by a directory adapter

use thiserror::Error;

use super::newtypes::{AttributeName, LocalUserId, ObjectGuid};

/// Errors that can occur when constructing or validating domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid objectGUID value
    #[error("Invalid objectGUID: {0}")]
    InvalidGuid(String),

    /// Invalid directory attribute name
    #[error("Invalid attribute name: {0}")]
    InvalidAttributeName(String),

    /// Invalid local field name
    #[error("Invalid local field: {0}")]
    InvalidField(String),

    /// Invalid login name
    #[error("Invalid login: {0}")]
    InvalidLogin(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Failure to establish or verify an authenticated directory session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The directory could not be reached
    #[error("cannot reach directory: {0}")]
    Unreachable(String),

    /// The directory rejected the credentials
    #[error("bind rejected for '{username}'")]
    BindRejected { username: String },

    /// The initial bind succeeded but the verification bind did not
    #[error("verification bind failed for '{username}'")]
    VerificationFailed { username: String },

    /// No credentials were available for this batch
    #[error("no credentials configured: {0}")]
    MissingCredentials(String),

    /// An established session was lost mid-batch
    #[error("connection lost: {0}")]
    Lost(String),
}

/// Two or more local users claim the same directory identity
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("objectGUID {guid} is claimed by several local users: {}", join_ids(.users))]
pub struct IdentityAmbiguityError {
    pub guid: ObjectGuid,
    pub users: Vec<LocalUserId>,
}

fn join_ids(ids: &[LocalUserId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single principal's attributes cannot be mapped
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttributeMappingError {
    /// A mapping marked as required has no value
    #[error("required attribute '{attribute}' is empty")]
    MissingRequired { attribute: AttributeName },

    /// A single-valued mapping received several values
    #[error("attribute '{attribute}' has {count} values but is mapped as single-valued")]
    MalformedMultiValue { attribute: AttributeName, count: usize },

    /// The principal carries an unusable identifier
    #[error("principal identifier is invalid: {0}")]
    InvalidIdentifier(String),
}

/// The platform refused to raise the execution-time ceiling
///
/// This is advisory; the batch continues under the imposed limit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot raise execution time limit to {required_secs}s (current: {})", describe_limit(.current_secs))]
pub struct PlatformLimitWarning {
    pub required_secs: u64,
    pub current_secs: Option<u64>,
}

fn describe_limit(current: &Option<u64>) -> String {
    match current {
        Some(secs) => format!("{secs}s"),
        None => "unknown".to_string(),
    }
}

/// Errors reported by a directory adapter
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The session is gone (socket closed, server down, timeout)
    #[error("directory connection lost: {0}")]
    ConnectionLost(String),

    /// The directory rejected the operation for this entry
    #[error("directory rejected operation on '{dn}': {message}")]
    Rejected { dn: String, message: String },

    /// The entry does not exist
    #[error("no such entry: {0}")]
    NoSuchEntry(String),

    /// The search could not be performed
    #[error("search failed: {0}")]
    SearchFailed(String),
}

impl DirectoryError {
    /// Returns true if the error means the session is unusable
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, DirectoryError::ConnectionLost(_))
    }
}
