//! Directory principals
//!
//! A [`DirectoryPrincipal`] is one entry read from the directory, with its
//! multi-valued attributes held in a case-insensitive [`AttributeMap`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::newtypes::{AttributeName, ObjectGuid};

/// Multi-valued attribute map keyed by case-insensitive attribute name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMap {
    values: BTreeMap<AttributeName, Vec<String>>,
}

impl AttributeMap {
    /// Creates an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all values of an attribute
    pub fn insert(&mut self, name: AttributeName, values: Vec<String>) {
        self.values.insert(name, values);
    }

    /// Builder-style [`insert`](Self::insert)
    #[must_use]
    pub fn with(mut self, name: AttributeName, values: Vec<String>) -> Self {
        self.insert(name, values);
        self
    }

    /// All values of an attribute (`None` if the key is absent)
    pub fn get(&self, name: &AttributeName) -> Option<&[String]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// The first value slot of an attribute
    pub fn first(&self, name: &AttributeName) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns true if the attribute is present (even with empty values)
    pub fn contains(&self, name: &AttributeName) -> bool {
        self.values.contains_key(name)
    }

    /// Removes an attribute, returning its values
    pub fn remove(&mut self, name: &AttributeName) -> Option<Vec<String>> {
        self.values.remove(name)
    }

    /// Iterates over attributes in key order
    pub fn iter(&self) -> impl Iterator<Item = (&AttributeName, &[String])> {
        self.values.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the map has no attributes
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An entry read from the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryPrincipal {
    dn: String,
    object_guid: Option<ObjectGuid>,
    sam_account_name: Option<String>,
    attributes: AttributeMap,
}

impl DirectoryPrincipal {
    /// Creates a principal from its DN and attribute map
    ///
    /// The identity fields are lifted from the map: `objectGUID` is parsed
    /// when it holds a textual GUID (adapters that receive binary values
    /// use [`with_object_guid`](Self::with_object_guid)), and
    /// `sAMAccountName` is taken from the first non-empty slot.
    pub fn new(dn: impl Into<String>, attributes: AttributeMap) -> Self {
        let object_guid = attributes
            .first(&AttributeName::object_guid())
            .and_then(|v| ObjectGuid::new(v).ok());
        let sam_account_name = attributes
            .first(&AttributeName::sam_account_name())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Self {
            dn: dn.into(),
            object_guid,
            sam_account_name,
            attributes,
        }
    }

    /// Overrides the objectGUID
    #[must_use]
    pub fn with_object_guid(mut self, guid: ObjectGuid) -> Self {
        self.object_guid = Some(guid);
        self
    }

    /// Distinguished name of the entry
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Stable directory identifier, if the entry carries one
    pub fn object_guid(&self) -> Option<&ObjectGuid> {
        self.object_guid.as_ref()
    }

    /// Login name in the directory
    pub fn sam_account_name(&self) -> Option<&str> {
        self.sam_account_name.as_deref()
    }

    /// All attributes of the entry
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Returns true if `userAccountControl` has the ACCOUNTDISABLE bit set
    ///
    /// Missing or unparseable values count as enabled.
    pub fn is_disabled(&self) -> bool {
        const ACCOUNTDISABLE: u32 = 0x0002;
        self.attributes
            .first(&AttributeName::user_account_control())
            .and_then(|v| v.trim().parse::<u32>().ok())
            .map(|uac| uac & ACCOUNTDISABLE != 0)
            .unwrap_or(false)
    }

    /// Human-readable identifier used in reports
    ///
    /// Prefers sAMAccountName, then objectGUID, then the DN.
    pub fn display_id(&self) -> String {
        self.sam_account_name
            .clone()
            .or_else(|| self.object_guid.as_ref().map(ToString::to_string))
            .unwrap_or_else(|| self.dn.clone())
    }
}
