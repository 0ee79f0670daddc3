//! Operation handles.
//!
//! The transforms themselves live outside this crate. Assembly only needs to
//! know, for each handle, what kind of operator it is and which fields it
//! declares; everything else travels opaquely to the execution engine.

mod builtins;
mod expression;

pub use builtins::*;
pub use expression::Expr;

use crate::fields::FieldSet;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::sync::Arc;

/// What an operation does to the tuple stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Computes new fields from arguments.
    Function,
    /// Drops tuples; never changes the schema.
    Filter,
    /// Passes, projects, or renames arguments.
    Identity,
    /// Reduces a group to declared result fields.
    Aggregator,
    /// Emits arbitrary tuples per group.
    Buffer,
    /// Checks each tuple.
    Assertion,
    /// Checks each group.
    GroupAssertion,
}

impl OperationKind {
    /// Returns true for operators applied with `each`.
    #[must_use]
    pub fn is_row_wise(&self) -> bool {
        matches!(
            self,
            Self::Function | Self::Filter | Self::Identity | Self::Assertion
        )
    }

    /// Returns true for operators applied with `every`.
    #[must_use]
    pub fn is_aggregation(&self) -> bool {
        matches!(self, Self::Aggregator | Self::Buffer | Self::GroupAssertion)
    }

    /// Returns true if the operator leaves the schema untouched.
    #[must_use]
    pub fn preserves_schema(&self) -> bool {
        matches!(self, Self::Filter | Self::Assertion | Self::GroupAssertion)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Filter => write!(f, "filter"),
            Self::Identity => write!(f, "identity"),
            Self::Aggregator => write!(f, "aggregator"),
            Self::Buffer => write!(f, "buffer"),
            Self::Assertion => write!(f, "assertion"),
            Self::GroupAssertion => write!(f, "group_assertion"),
        }
    }
}

/// An opaque operation handle.
pub trait Operation: Send + Sync + Debug {
    /// Returns the operation name.
    fn name(&self) -> &str;

    /// Returns the operation kind.
    fn kind(&self) -> OperationKind;

    /// Returns the fields the operation declares as results, if any.
    fn declared_fields(&self) -> Option<&FieldSet>;

    /// Returns the operation parameters for the execution engine.
    fn params(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Returns a serializable snapshot of the handle.
    fn describe(&self) -> OperationSpec {
        OperationSpec {
            name: self.name().to_string(),
            kind: self.kind(),
            declared_fields: self.declared_fields().cloned(),
            params: self.params(),
        }
    }
}

/// A plain operation descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Operation name.
    pub name: String,
    /// Operation kind.
    pub kind: OperationKind,
    /// Declared result fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_fields: Option<FieldSet>,
    /// Parameters handed to the engine.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl OperationSpec {
    /// Creates a new descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            name: name.into(),
            kind,
            declared_fields: None,
            params: serde_json::Value::Null,
        }
    }

    /// Sets the declared fields.
    #[must_use]
    pub fn with_declared_fields(mut self, fields: FieldSet) -> Self {
        self.declared_fields = Some(fields);
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if !self.params.is_object() {
            self.params = serde_json::Value::Object(serde_json::Map::new());
        }
        if let serde_json::Value::Object(map) = &mut self.params {
            map.insert(key.into(), value);
        }
        self
    }

    /// Wraps the descriptor into a shared handle.
    #[must_use]
    pub fn shared(self) -> Arc<dyn Operation> {
        Arc::new(self)
    }
}

impl Operation for OperationSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn declared_fields(&self) -> Option<&FieldSet> {
        self.declared_fields.as_ref()
    }

    fn params(&self) -> serde_json::Value {
        self.params.clone()
    }

    fn describe(&self) -> OperationSpec {
        self.clone()
    }
}

/// Severity at which an assertion is planned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionLevel {
    /// Always evaluated.
    #[default]
    Strict,
    /// Evaluated only when validation is enabled.
    Valid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert!(OperationKind::Function.is_row_wise());
        assert!(OperationKind::Aggregator.is_aggregation());
        assert!(!OperationKind::Buffer.is_row_wise());
        assert!(OperationKind::Filter.preserves_schema());
        assert!(!OperationKind::Identity.preserves_schema());
    }

    #[test]
    fn test_spec_params_accumulate() {
        let spec = OperationSpec::new("x", OperationKind::Function)
            .with_param("a", serde_json::json!(1))
            .with_param("b", serde_json::json!("two"));
        assert_eq!(spec.params, serde_json::json!({"a": 1, "b": "two"}));
    }

    #[test]
    fn test_describe_custom_operation() {
        #[derive(Debug)]
        struct Upper(FieldSet);

        impl Operation for Upper {
            fn name(&self) -> &str {
                "upper"
            }
            fn kind(&self) -> OperationKind {
                OperationKind::Function
            }
            fn declared_fields(&self) -> Option<&FieldSet> {
                Some(&self.0)
            }
        }

        let op = Upper(FieldSet::new(["shout"]).unwrap());
        let spec = op.describe();
        assert_eq!(spec.name, "upper");
        assert_eq!(spec.declared_fields.unwrap().names(), vec!["shout"]);
        assert!(spec.params.is_null());
    }
}
