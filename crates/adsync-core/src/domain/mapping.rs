//! Field mapping types
//!
//! A [`FieldMapping`] ties a directory attribute to a local profile field.
//! Mappings are compiled from the configuration table once, at load time,
//! so the engine only ever handles validated names.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::newtypes::{AttributeName, LocalField};

/// Which way a mapped value flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingDirection {
    /// Directory to local store only (read-only from the local side)
    Import,
    /// Local store to directory only (write-only toward the directory)
    Export,
    /// Both ways
    Both,
}

impl MappingDirection {
    pub fn imports(&self) -> bool {
        matches!(self, MappingDirection::Import | MappingDirection::Both)
    }

    pub fn exports(&self) -> bool {
        matches!(self, MappingDirection::Export | MappingDirection::Both)
    }
}

/// How multiple directory values are folded into one local value
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MultiValuePolicy {
    /// The attribute must hold at most one value
    Single,
    /// Take the first value slot, ignore the rest
    #[default]
    First,
    /// Join all non-empty values with a separator
    Join { separator: String },
    /// Keep every non-empty value, one per line
    All,
}

impl MultiValuePolicy {
    /// Separator used when folding several values, if any
    pub fn separator(&self) -> Option<&str> {
        match self {
            MultiValuePolicy::Single | MultiValuePolicy::First => None,
            MultiValuePolicy::Join { separator } => Some(separator),
            MultiValuePolicy::All => Some("\n"),
        }
    }
}

/// Value transform applied in both directions before comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    #[default]
    None,
    Trim,
    Lowercase,
    Uppercase,
}

impl Transform {
    pub fn apply(&self, value: &str) -> String {
        match self {
            Transform::None => value.to_string(),
            Transform::Trim => value.trim().to_string(),
            Transform::Lowercase => value.to_lowercase(),
            Transform::Uppercase => value.to_uppercase(),
        }
    }
}

/// Decides whether the directory may overwrite a local value on import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The directory value always replaces the local one
    #[default]
    DirectoryWins,
    /// A field already present locally is never overwritten, even when blank
    LocalWins,
    /// The directory only fills fields that are absent or blank locally
    KeepLocalIfSet,
}

/// A validated mapping between one directory attribute and one local field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub attribute: AttributeName,
    pub field: LocalField,
    pub direction: MappingDirection,
    pub multi_value: MultiValuePolicy,
    pub transform: Transform,
    pub required: bool,
}

impl FieldMapping {
    /// A bidirectional, optional, first-slot mapping without transform
    pub fn new(attribute: AttributeName, field: LocalField) -> Self {
        Self {
            attribute,
            field,
            direction: MappingDirection::Both,
            multi_value: MultiValuePolicy::First,
            transform: Transform::None,
            required: false,
        }
    }

    #[must_use]
    pub fn direction(mut self, direction: MappingDirection) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn multi_value(mut self, policy: MultiValuePolicy) -> Self {
        self.multi_value = policy;
        self
    }

    #[must_use]
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// A change to one local field produced by an import diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDiff {
    pub field: String,
    pub old: Option<String>,
    pub new: String,
}

impl fmt::Display for AttributeDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.old {
            Some(old) => write!(f, "{}: '{}' -> '{}'", self.field, old, self.new),
            None => write!(f, "{}: (unset) -> '{}'", self.field, self.new),
        }
    }
}

/// A change to one directory attribute produced by an export diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DirectoryChange {
    /// Replace all values of the attribute
    Replace {
        attribute: AttributeName,
        values: Vec<String>,
    },
    /// Remove all values of the attribute
    Clear { attribute: AttributeName },
}

impl DirectoryChange {
    pub fn attribute(&self) -> &AttributeName {
        match self {
            DirectoryChange::Replace { attribute, .. } | DirectoryChange::Clear { attribute } => {
                attribute
            }
        }
    }
}

impl fmt::Display for DirectoryChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryChange::Replace { attribute, values } => {
                write!(f, "{attribute} := '{}'", values.join("', '"))
            }
            DirectoryChange::Clear { attribute } => write!(f, "{attribute} := (cleared)"),
        }
    }
}
