//! Table and association declarations.
//!
//! # Example
//!
//! ```toml
//! [[tables]]
//! name = "cdr"
//! primary_key_field = "cd_id"
//!
//! [[associations]]
//! child_table = "cdr_notes"
//! child_key_field = "cdh_id"
//! child_link_field = "cdr_id"
//! parent_link_field = "cd_id"
//! parent_table = "cdr"
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// A root table selected for archival by a caller supplied predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct TableDescriptor {
    /// Table name, identical in the live and archive stores.
    pub name: String,

    /// Column that identifies a single row for deletion.
    pub primary_key_field: String,

    /// Boolean expression selecting the rows to archive, in the live
    /// store's SQL dialect. Usually supplied per run rather than in the
    /// file; a run refuses to start while any root table lacks one.
    #[serde(default)]
    pub predicate: Option<String>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, primary_key_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key_field: primary_key_field.into(),
            predicate: None,
        }
    }

    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Validation("table name cannot be empty".into()));
        }
        if self.primary_key_field.is_empty() {
            return Err(ConfigError::Validation(format!(
                "table '{}' has an empty primary_key_field",
                self.name
            )));
        }
        Ok(())
    }
}

/// Rows of `child_table` whose `child_link_field` equals a parent row's
/// `parent_link_field` are archived together with that parent row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct AssociationDescriptor {
    pub child_table: String,

    /// Key used to delete a single child row.
    pub child_key_field: String,

    pub child_link_field: String,

    pub parent_link_field: String,

    /// A root table or the child table of another association.
    pub parent_table: String,
}

impl AssociationDescriptor {
    pub fn new(
        child_table: impl Into<String>,
        child_key_field: impl Into<String>,
        child_link_field: impl Into<String>,
        parent_link_field: impl Into<String>,
        parent_table: impl Into<String>,
    ) -> Self {
        Self {
            child_table: child_table.into(),
            child_key_field: child_key_field.into(),
            child_link_field: child_link_field.into(),
            parent_link_field: parent_link_field.into(),
            parent_table: parent_table.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("child_table", &self.child_table),
            ("child_key_field", &self.child_key_field),
            ("child_link_field", &self.child_link_field),
            ("parent_link_field", &self.parent_link_field),
            ("parent_table", &self.parent_table),
        ];
        if let Some((field, _)) = fields.iter().find(|(_, value)| value.is_empty()) {
            return Err(ConfigError::Validation(format!(
                "association {} -> {} has an empty {field}",
                self.parent_table, self.child_table
            )));
        }
        Ok(())
    }
}
