//! Directory port (driven/secondary port)
//!
//! This module defines the interface for talking to the directory service.
//! The primary implementation targets Active Directory over LDAP, but the
//! engine only depends on these traits.
//!
//! ## Design Notes
//!
//! - A session is an owned value: [`IDirectoryConnector::open`] consumes the
//!   [`ConnectionDetails`] and returns a boxed session that owns them. The
//!   session is closed explicitly with [`IDirectorySession::close`]; dropping
//!   it releases the credentials as well.
//! - Errors are typed ([`DirectoryError`]) because the engine must tell a
//!   lost connection (abort the batch) from a rejected operation (fail one
//!   principal).
//! - Search filters are typed ([`SearchFilter`]); escaping is the adapter's job.

use crate::domain::{
    AttributeName, ConnectionDetails, DirectoryChange, DirectoryError, DirectoryPrincipal,
    ObjectGuid,
};

/// A directory search filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    /// A pre-formatted LDAP filter taken verbatim from configuration
    Raw(String),
    /// Match one entry by objectGUID
    ObjectGuid(ObjectGuid),
    /// Match entries by sAMAccountName
    AccountName(String),
    /// All sub-filters must match
    And(Vec<SearchFilter>),
}

impl SearchFilter {
    /// Combines `self` with another filter
    #[must_use]
    pub fn and(self, other: SearchFilter) -> SearchFilter {
        match self {
            SearchFilter::And(mut parts) => {
                parts.push(other);
                SearchFilter::And(parts)
            }
            first => SearchFilter::And(vec![first, other]),
        }
    }
}

/// A search over the configured base DN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub filter: SearchFilter,
    /// Attributes to return; `objectGUID` and `sAMAccountName` are always
    /// requested in addition
    pub attributes: Vec<AttributeName>,
}

impl SearchRequest {
    pub fn new(filter: SearchFilter, attributes: Vec<AttributeName>) -> Self {
        Self { filter, attributes }
    }
}

/// Opens authenticated sessions against the directory
#[async_trait::async_trait]
pub trait IDirectoryConnector: Send + Sync {
    /// Connects and binds with the given credentials
    ///
    /// # Returns
    /// - `Ok(session)` when the bind succeeded
    /// - `Err(DirectoryError::Rejected)` when the directory refused the
    ///   credentials
    /// - `Err(DirectoryError::ConnectionLost)` when the server is unreachable
    async fn open(
        &self,
        details: ConnectionDetails,
    ) -> Result<Box<dyn IDirectorySession>, DirectoryError>;
}

/// One authenticated directory session
#[async_trait::async_trait]
pub trait IDirectorySession: Send {
    /// Re-binds with the given credentials
    ///
    /// Returns `Ok(false)` when the directory rejects them; `Err` only when
    /// the session itself failed.
    async fn bind(&mut self, username: &str, password: &str) -> Result<bool, DirectoryError>;

    /// Searches the directory
    async fn search(
        &mut self,
        request: &SearchRequest,
    ) -> Result<Vec<DirectoryPrincipal>, DirectoryError>;

    /// Applies changes to one entry
    async fn modify(&mut self, dn: &str, changes: &[DirectoryChange])
        -> Result<(), DirectoryError>;

    /// Unbinds and releases the session
    async fn close(self: Box<Self>) -> Result<(), DirectoryError>;
}
