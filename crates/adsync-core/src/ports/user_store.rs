//! Local user store port (driven/secondary port)
//!
//! This module defines the interface for reading and writing local user
//! records. The store is treated as a key-value repository: a user has an
//! id, a login and flat string metadata.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, an external database, ...) and don't need domain-level
//!   classification; the engine records them as per-principal failures.
//! - The [`UserFilter`] struct provides a composable query mechanism
//!   without exposing storage implementation details.

use crate::domain::{LocalUser, LocalUserId};

/// Filter criteria for querying local users
///
/// All fields are optional; multiple filters are combined with AND logic.
///
/// # Example
///
/// ```
/// use adsync_core::domain::{LocalUserId, MetaKey};
/// use adsync_core::ports::UserFilter;
///
/// // Every directory-originated user except the superuser
/// let filter = UserFilter::new()
///     .with_non_empty_meta(MetaKey::SamAccountName.as_str())
///     .excluding([LocalUserId::new(1)]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    /// Only users whose metadata entry under this key is non-empty
    pub non_empty_meta: Option<String>,
    /// Never return these users
    pub exclude: Vec<LocalUserId>,
    /// Only return this user
    pub include: Option<LocalUserId>,
}

impl UserFilter {
    /// Creates a new empty filter (matches all users)
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the metadata-presence filter
    pub fn with_non_empty_meta(mut self, key: impl Into<String>) -> Self {
        self.non_empty_meta = Some(key.into());
        self
    }

    /// Adds ids to the exclusion list
    pub fn excluding(mut self, ids: impl IntoIterator<Item = LocalUserId>) -> Self {
        self.exclude.extend(ids);
        self
    }

    /// Restricts the query to a single id
    pub fn only(mut self, id: LocalUserId) -> Self {
        self.include = Some(id);
        self
    }

    /// Returns true if `user` satisfies every criterion
    ///
    /// Adapters that cannot push a criterion down to their query language
    /// can use this to post-filter.
    pub fn matches(&self, user: &LocalUser) -> bool {
        if self.exclude.contains(&user.id()) {
            return false;
        }
        if let Some(id) = self.include {
            if user.id() != id {
                return false;
            }
        }
        if let Some(key) = &self.non_empty_meta {
            let present = user
                .metadata()
                .get(key)
                .is_some_and(|v| !v.trim().is_empty());
            if !present {
                return false;
            }
        }
        true
    }
}

/// Port trait for the local user store
#[async_trait::async_trait]
pub trait IUserStore: Send + Sync {
    /// Queries users matching the filter, ordered by ascending id
    async fn query_users(&self, filter: &UserFilter) -> anyhow::Result<Vec<LocalUser>>;

    /// Retrieves a user by id
    async fn get_user(&self, id: LocalUserId) -> anyhow::Result<Option<LocalUser>>;

    /// Retrieves a user by login (case-insensitive)
    async fn find_by_login(&self, login: &str) -> anyhow::Result<Option<LocalUser>>;

    /// Reads one metadata value
    async fn read_metadata(&self, id: LocalUserId, key: &str) -> anyhow::Result<Option<String>>;

    /// Writes one metadata value (insert or update)
    async fn write_metadata(&self, id: LocalUserId, key: &str, value: &str)
        -> anyhow::Result<()>;

    /// Creates a user with the given login and returns it
    async fn create_user(&self, login: &str) -> anyhow::Result<LocalUser>;
}
