//! Local user records
//!
//! A [`LocalUser`] is a record of the local user store: an id, a login and
//! a flat metadata map. The engine keeps its own bookkeeping (stored
//! objectGUID, sAMAccountName mirror, ...) in that map under [`MetaKey`]s.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{LocalField, LocalUserId, MetaKey, ObjectGuid};

/// A user record of the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    id: LocalUserId,
    login: String,
    metadata: BTreeMap<String, String>,
}

impl LocalUser {
    /// Creates a user with empty metadata
    ///
    /// # Errors
    /// Returns `DomainError::InvalidLogin` if the login is blank
    pub fn new(id: LocalUserId, login: impl Into<String>) -> Result<Self, DomainError> {
        let login = login.into();
        if login.trim().is_empty() {
            return Err(DomainError::InvalidLogin("login cannot be empty".to_string()));
        }
        Ok(Self {
            id,
            login,
            metadata: BTreeMap::new(),
        })
    }

    /// Builder-style metadata insert, used when loading from storage
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> LocalUserId {
        self.id
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    /// Raw metadata map
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Reads an engine-owned metadata entry
    pub fn meta(&self, key: MetaKey) -> Option<&str> {
        self.metadata.get(key.as_str()).map(String::as_str)
    }

    /// Reads a mapped profile field
    pub fn field(&self, field: &LocalField) -> Option<&str> {
        self.metadata.get(field.as_str()).map(String::as_str)
    }

    /// Sets a metadata entry in memory (the store is written separately)
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// The stored objectGUID, if present and well-formed
    pub fn object_guid(&self) -> Option<ObjectGuid> {
        self.meta(MetaKey::ObjectGuid)
            .filter(|v| !v.trim().is_empty())
            .and_then(|v| ObjectGuid::new(v).ok())
    }

    /// The sAMAccountName mirror, if non-empty
    pub fn account_name(&self) -> Option<&str> {
        self.meta(MetaKey::SamAccountName)
            .filter(|v| !v.trim().is_empty())
    }

    /// Returns true if the user carries a non-empty account-name marker,
    /// i.e. it originates from the directory
    pub fn is_directory_user(&self) -> bool {
        self.account_name().is_some()
    }
}

/// Local user ids the engine must never read for synchronization or modify
///
/// By default only the superuser record (id 1) is reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservedIdentitySet(BTreeSet<LocalUserId>);

impl ReservedIdentitySet {
    /// Id of the superuser record in a fresh local store
    pub const SUPERUSER: LocalUserId = LocalUserId::new(1);

    /// Creates a set from the given ids
    pub fn new(ids: impl IntoIterator<Item = LocalUserId>) -> Self {
        Self(ids.into_iter().collect())
    }

    /// Returns true if the id is reserved
    pub fn contains(&self, id: LocalUserId) -> bool {
        self.0.contains(&id)
    }

    /// Iterates the reserved ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = LocalUserId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ReservedIdentitySet {
    fn default() -> Self {
        Self::new([Self::SUPERUSER])
    }
}
