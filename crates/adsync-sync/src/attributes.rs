//! Attribute mapping between directory entries and local users
//!
//! The [`AttributeService`] applies the configured [`FieldMapping`] table:
//! on import it turns a principal's attributes into [`AttributeDiff`]s
//! against the stored user, on export it turns the user's fields into
//! [`DirectoryChange`]s against the entry. Both directions fold and
//! transform values the same way, so exporting what was just imported
//! yields no change.

use adsync_core::domain::{
    AttributeDiff, AttributeMap, AttributeMappingError, AttributeName, ConflictPolicy,
    DirectoryChange, DirectoryPrincipal, FieldMapping, LocalUser, MultiValuePolicy,
};
use tracing::trace;

/// Returns true if `key` is absent from `map` or its first value slot is empty
///
/// Only the empty string is empty: `"0"` and whitespace are values.
pub fn is_attribute_value_empty(map: &AttributeMap, key: &AttributeName) -> bool {
    map.get(key)
        .and_then(|values| values.first())
        .map_or(true, |first| first.is_empty())
}

/// Applies the field mapping table in both directions
#[derive(Debug, Clone)]
pub struct AttributeService {
    mappings: Vec<FieldMapping>,
    conflict_policy: ConflictPolicy,
    span: tracing::Span,
}

impl AttributeService {
    pub fn new(mappings: Vec<FieldMapping>) -> Self {
        Self {
            mappings,
            conflict_policy: ConflictPolicy::default(),
            span: tracing::info_span!("attributes"),
        }
    }

    #[must_use]
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.conflict_policy
    }

    /// Attributes a search must return for the mappings to work
    pub fn requested_attributes(&self) -> Vec<AttributeName> {
        let mut attributes = vec![
            AttributeName::object_guid(),
            AttributeName::sam_account_name(),
            AttributeName::user_account_control(),
        ];
        for mapping in &self.mappings {
            if !attributes.contains(&mapping.attribute) {
                attributes.push(mapping.attribute.clone());
            }
        }
        attributes
    }

    /// Computes the local field updates for `principal`
    ///
    /// `user` is the stored record, or `None` for a user about to be
    /// created. Only fields whose value would actually change are returned.
    ///
    /// # Errors
    /// - `MissingRequired` if a required mapping has an empty first slot
    /// - `MalformedMultiValue` if a single-valued mapping receives several values
    pub fn map_directory_to_local(
        &self,
        principal: &DirectoryPrincipal,
        user: Option<&LocalUser>,
    ) -> Result<Vec<AttributeDiff>, AttributeMappingError> {
        let attributes = principal.attributes();
        let mut diffs = Vec::new();

        for mapping in self.mappings.iter().filter(|m| m.direction.imports()) {
            if mapping.required && is_attribute_value_empty(attributes, &mapping.attribute) {
                return Err(AttributeMappingError::MissingRequired {
                    attribute: mapping.attribute.clone(),
                });
            }

            let incoming = fold_import(mapping, attributes.get(&mapping.attribute))?;
            let stored = user.and_then(|u| u.field(&mapping.field));

            if !self.may_write(stored, &incoming) {
                trace!(
                    parent: &self.span,
                    field = %mapping.field,
                    "Keeping local value"
                );
                continue;
            }
            diffs.push(AttributeDiff {
                field: mapping.field.to_string(),
                old: stored.map(str::to_string),
                new: incoming,
            });
        }
        Ok(diffs)
    }

    fn may_write(&self, stored: Option<&str>, incoming: &str) -> bool {
        if stored.unwrap_or("") == incoming {
            return false;
        }
        match self.conflict_policy {
            ConflictPolicy::DirectoryWins => true,
            ConflictPolicy::LocalWins => stored.is_none() && !incoming.is_empty(),
            ConflictPolicy::KeepLocalIfSet => {
                stored.map_or(true, |v| v.trim().is_empty()) && !incoming.is_empty()
            }
        }
    }

    /// Computes the directory changes that bring `principal` in line with `user`
    ///
    /// Empty local values clear the attribute; values equal to what the
    /// directory already holds produce nothing.
    ///
    /// # Errors
    /// `MissingRequired` if a required mapping has no local value; nothing
    /// is returned for the other mappings in that case.
    pub fn map_local_to_directory(
        &self,
        user: &LocalUser,
        principal: &DirectoryPrincipal,
    ) -> Result<Vec<DirectoryChange>, AttributeMappingError> {
        let attributes = principal.attributes();
        let mut changes = Vec::new();

        for mapping in self.mappings.iter().filter(|m| m.direction.exports()) {
            let outgoing = split_export(mapping, user.field(&mapping.field).unwrap_or(""));
            let current = attributes.get(&mapping.attribute).unwrap_or(&[]);

            if outgoing.is_empty() && mapping.required {
                return Err(AttributeMappingError::MissingRequired {
                    attribute: mapping.attribute.clone(),
                });
            }
            if outgoing.is_empty() {
                if current.iter().any(|v| !v.is_empty()) {
                    changes.push(DirectoryChange::Clear {
                        attribute: mapping.attribute.clone(),
                    });
                }
                continue;
            }

            if outgoing != comparable_directory_values(mapping, current) {
                changes.push(DirectoryChange::Replace {
                    attribute: mapping.attribute.clone(),
                    values: outgoing,
                });
            }
        }
        Ok(changes)
    }
}

/// Folds directory values into one local value
fn fold_import(
    mapping: &FieldMapping,
    values: Option<&[String]>,
) -> Result<String, AttributeMappingError> {
    let values = values.unwrap_or(&[]);
    let transform = mapping.transform;

    match &mapping.multi_value {
        MultiValuePolicy::Single => {
            let present: Vec<&String> = values.iter().filter(|v| !v.is_empty()).collect();
            if present.len() > 1 {
                return Err(AttributeMappingError::MalformedMultiValue {
                    attribute: mapping.attribute.clone(),
                    count: present.len(),
                });
            }
            Ok(present.first().map(|v| transform.apply(v)).unwrap_or_default())
        }
        MultiValuePolicy::First => Ok(values
            .first()
            .map(|v| transform.apply(v))
            .unwrap_or_default()),
        policy @ (MultiValuePolicy::Join { .. } | MultiValuePolicy::All) => {
            let separator = policy.separator().unwrap_or("\n");
            let parts: Vec<String> = values
                .iter()
                .map(|v| transform.apply(v))
                .filter(|v| !v.is_empty())
                .collect();
            Ok(parts.join(separator))
        }
    }
}

/// Splits a local value into the directory values it stands for
fn split_export(mapping: &FieldMapping, local: &str) -> Vec<String> {
    let transform = mapping.transform;
    let parts: Vec<&str> = match mapping.multi_value.separator() {
        Some(separator) => local.split(separator).collect(),
        None => vec![local],
    };
    parts
        .into_iter()
        .filter(|v| !v.trim().is_empty())
        .map(|v| transform.apply(v))
        .collect()
}

/// The directory's current values, in the shape [`split_export`] produces
fn comparable_directory_values(mapping: &FieldMapping, current: &[String]) -> Vec<String> {
    let transform = mapping.transform;
    match mapping.multi_value {
        MultiValuePolicy::Single | MultiValuePolicy::First => current
            .first()
            .filter(|v| !v.trim().is_empty())
            .map(|v| vec![transform.apply(v)])
            .unwrap_or_default(),
        MultiValuePolicy::Join { .. } | MultiValuePolicy::All => current
            .iter()
            .filter(|v| !v.trim().is_empty())
            .map(|v| transform.apply(v))
            .collect(),
    }
}
