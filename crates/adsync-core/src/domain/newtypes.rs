//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for identifiers and keys
//! used throughout the synchronization engine. Each newtype ensures data
//! validity at construction time, so string-keyed lookups cannot silently
//! miss because of a typo or a case difference.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// LocalUserId
// ============================================================================

/// Identifier of a user record in the local user store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalUserId(u64);

impl LocalUserId {
    /// Create a LocalUserId from a raw store identifier
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for LocalUserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalUserId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid LocalUserId '{s}': {e}")))
    }
}

impl From<u64> for LocalUserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ============================================================================
// ObjectGuid
// ============================================================================

/// Directory-assigned immutable identifier of a principal
///
/// Always held in canonical lower-case form. Directory GUIDs are
/// case-insensitive, so two spellings that differ only by case produce the
/// same `ObjectGuid`.
///
/// Accepted inputs:
/// - hyphenated UUID text, optionally wrapped in braces
/// - 32 hex digits without separators
/// - the 16-byte binary attribute value as returned by Active Directory
///   (mixed-endian layout, see [`ObjectGuid::from_bytes`])
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectGuid(String);

impl ObjectGuid {
    /// Parse a textual GUID
    ///
    /// # Errors
    /// Returns `DomainError::InvalidGuid` if the value is empty or not a GUID
    pub fn new(value: impl AsRef<str>) -> Result<Self, DomainError> {
        let raw = value.as_ref().trim();
        let trimmed = raw.trim_start_matches('{').trim_end_matches('}');

        if trimmed.is_empty() {
            return Err(DomainError::InvalidGuid("GUID cannot be empty".to_string()));
        }

        Uuid::parse_str(trimmed)
            .map(|uuid| Self(uuid.hyphenated().to_string()))
            .map_err(|e| DomainError::InvalidGuid(format!("'{raw}': {e}")))
    }

    /// Decode the binary `objectGUID` attribute value
    ///
    /// Active Directory stores the first three GUID fields little-endian,
    /// which is exactly the layout `Uuid::from_bytes_le` expects.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidGuid` unless exactly 16 bytes are given
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DomainError> {
        let array: [u8; 16] = bytes.try_into().map_err(|_| {
            DomainError::InvalidGuid(format!("expected 16 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(Uuid::from_bytes_le(array).hyphenated().to_string()))
    }

    /// Re-encode in the binary layout used by the directory
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 16] {
        // The inner string is always a valid hyphenated UUID.
        Uuid::parse_str(&self.0)
            .map(|uuid| uuid.to_bytes_le())
            .unwrap_or_default()
    }

    /// Get the canonical lower-case string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObjectGuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectGuid {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ObjectGuid {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ObjectGuid> for String {
    fn from(guid: ObjectGuid) -> Self {
        guid.0
    }
}

// ============================================================================
// AttributeName
// ============================================================================

/// A directory attribute descriptor (e.g. `sAMAccountName`, `mail`)
///
/// LDAP attribute names are case-insensitive. The original spelling is kept
/// for writes and display; equality, ordering and hashing use the
/// lower-cased form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributeName {
    name: String,
    key: String,
}

impl AttributeName {
    /// Validate an attribute descriptor (RFC 4512 `descr` or numeric OID)
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAttributeName` on an empty or malformed name
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into().trim().to_string();

        if name.is_empty() {
            return Err(DomainError::InvalidAttributeName(
                "attribute name cannot be empty".to_string(),
            ));
        }

        let is_descr = name.starts_with(|c: char| c.is_ascii_alphabetic())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        let is_oid = name.chars().all(|c| c.is_ascii_digit() || c == '.')
            && !name.starts_with('.')
            && !name.ends_with('.')
            && !name.contains("..");

        if !is_descr && !is_oid {
            return Err(DomainError::InvalidAttributeName(format!(
                "'{name}' is neither a descriptor nor a numeric OID"
            )));
        }

        let key = name.to_ascii_lowercase();
        Ok(Self { name, key })
    }

    /// Spelling as configured
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Lower-cased lookup key
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The `objectGUID` attribute
    #[must_use]
    pub fn object_guid() -> Self {
        Self::known("objectGUID")
    }

    /// The `sAMAccountName` attribute
    #[must_use]
    pub fn sam_account_name() -> Self {
        Self::known("sAMAccountName")
    }

    /// The `userAccountControl` attribute
    #[must_use]
    pub fn user_account_control() -> Self {
        Self::known("userAccountControl")
    }

    fn known(name: &str) -> Self {
        Self {
            name: name.to_string(),
            key: name.to_ascii_lowercase(),
        }
    }
}

impl PartialEq for AttributeName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for AttributeName {}

impl Hash for AttributeName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for AttributeName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AttributeName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl Display for AttributeName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl FromStr for AttributeName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AttributeName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<AttributeName> for String {
    fn from(name: AttributeName) -> Self {
        name.name
    }
}

// ============================================================================
// LocalField and MetaKey
// ============================================================================

/// Prefix reserved for metadata written by the engine itself
pub const RESERVED_META_PREFIX: &str = "adsync_";

/// Name of a profile field in the local user store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocalField(String);

impl LocalField {
    /// Validate a local field name
    ///
    /// # Errors
    /// Returns `DomainError::InvalidField` if the name is empty, contains
    /// characters outside `[A-Za-z0-9_.-]`, or uses the reserved prefix
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into().trim().to_string();

        if name.is_empty() {
            return Err(DomainError::InvalidField(
                "field name cannot be empty".to_string(),
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(DomainError::InvalidField(format!(
                "'{name}' contains invalid characters"
            )));
        }
        if name.starts_with(RESERVED_META_PREFIX) {
            return Err(DomainError::InvalidField(format!(
                "'{name}' uses the reserved prefix '{RESERVED_META_PREFIX}'"
            )));
        }

        Ok(Self(name))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LocalField {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LocalField {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<LocalField> for String {
    fn from(field: LocalField) -> Self {
        field.0
    }
}

/// Metadata keys the engine owns on every synchronized local user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaKey {
    /// Stored directory objectGUID
    ObjectGuid,
    /// Mirror of the directory sAMAccountName; its presence marks the user
    /// as originating from the directory
    SamAccountName,
    /// `"1"` when the directory account is disabled
    Disabled,
    /// RFC 3339 timestamp of the last successful synchronization
    LastSyncedAt,
}

impl MetaKey {
    /// Storage key for this metadata entry
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetaKey::ObjectGuid => "adsync_object_guid",
            MetaKey::SamAccountName => "adsync_samaccountname",
            MetaKey::Disabled => "adsync_disabled",
            MetaKey::LastSyncedAt => "adsync_last_synced_at",
        }
    }
}

impl Display for MetaKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
