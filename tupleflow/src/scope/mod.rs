//! Per-stage schema snapshots.
//!
//! A [`Scope`] is never edited field by field: every operator computes a
//! complete replacement from its incoming scopes (see [`propagation`]), and
//! the caller installs it only once the whole computation succeeded.

pub mod propagation;

use crate::errors::{AssemblyError, InvalidPrimaryKeyError};
use crate::fields::{FieldSet, FieldSpec};
use serde::Serialize;
use std::fmt;

/// The live schema of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scope {
    stage: String,
    values_fields: FieldSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    primary_key_fields: Option<FieldSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    grouping_key_fields: Option<FieldSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    grouping_primary_key_fields: Option<FieldSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    grouping_fields: Option<FieldSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    grouped_values: Option<FieldSet>,
}

impl Scope {
    /// Creates a scope with no fields.
    #[must_use]
    pub fn empty(stage: impl Into<String>) -> Self {
        Self::new(stage, FieldSet::empty())
    }

    /// Creates a scope over the given fields, with no keys.
    #[must_use]
    pub fn new(stage: impl Into<String>, values_fields: FieldSet) -> Self {
        Self {
            stage: stage.into(),
            values_fields,
            primary_key_fields: None,
            grouping_key_fields: None,
            grouping_primary_key_fields: None,
            grouping_fields: None,
            grouped_values: None,
        }
    }

    /// Copies this scope for another stage, e.g. a new branch.
    #[must_use]
    pub fn copy_for(&self, stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..self.clone()
        }
    }

    /// The owning stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// The live output fields.
    #[must_use]
    pub fn values_fields(&self) -> &FieldSet {
        &self.values_fields
    }

    /// The declared primary key, if any.
    #[must_use]
    pub fn primary_key_fields(&self) -> Option<&FieldSet> {
        self.primary_key_fields.as_ref()
    }

    /// The key of the last grouping operator, if grouped.
    #[must_use]
    pub fn grouping_key_fields(&self) -> Option<&FieldSet> {
        self.grouping_key_fields.as_ref()
    }

    /// The primary key as of the last `primary` declaration or grouping.
    #[must_use]
    pub fn grouping_primary_key_fields(&self) -> Option<&FieldSet> {
        self.grouping_primary_key_fields.as_ref()
    }

    /// The grouping key plus every aggregate appended since the grouping.
    #[must_use]
    pub fn grouping_fields(&self) -> Option<&FieldSet> {
        self.grouping_fields.as_ref()
    }

    /// The tuple values aggregators may read.
    #[must_use]
    pub fn grouped_values(&self) -> Option<&FieldSet> {
        self.grouped_values.as_ref()
    }

    /// Returns true if an aggregation may be applied.
    #[must_use]
    pub fn is_grouped(&self) -> bool {
        self.grouping_key_fields.is_some()
    }

    /// Returns a copy with no primary key and no grouping primary key.
    #[must_use]
    pub fn without_primary_key(&self) -> Self {
        Self {
            primary_key_fields: None,
            grouping_primary_key_fields: None,
            ..self.clone()
        }
    }

    /// Returns a copy with the primary key replaced.
    ///
    /// `None` clears both the primary key and its grouping snapshot.
    pub fn with_primary_key(&self, key: Option<&FieldSpec>) -> Result<Self, AssemblyError> {
        let key = match key {
            None => None,
            Some(spec) => {
                let normalized = spec
                    .normalize()
                    .map_err(|e| AssemblyError::from_fields(&self.stage, e))?;
                let resolved = normalized.resolve(&self.values_fields).map_err(|_| {
                    InvalidPrimaryKeyError::new(
                        &self.stage,
                        normalized.names(),
                        self.values_fields.names(),
                    )
                })?;
                Some(resolved)
            }
        };
        Ok(Self {
            primary_key_fields: key.clone(),
            grouping_primary_key_fields: key,
            ..self.clone()
        })
    }
}

fn describe(fields: Option<&FieldSet>) -> String {
    fields.map_or_else(|| "none".to_string(), ToString::to_string)
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: values {}, primary key {}, grouping key {}, grouping primary key {}, grouping fields {}",
            self.stage,
            self.values_fields,
            describe(self.primary_key_fields.as_ref()),
            describe(self.grouping_key_fields.as_ref()),
            describe(self.grouping_primary_key_fields.as_ref()),
            describe(self.grouping_fields.as_ref()),
        )
    }
}
