//! Error types for flow assembly.
//!
//! Every validation failure aborts assembly at the point of detection. Each
//! error carries the stage it was raised for and the offending names, and maps
//! to a stable code with a fix hint for diagnostics.

use crate::fields::FieldSetError;
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for assembly operations.
#[derive(Debug, Clone, Error)]
pub enum AssemblyError {
    /// A stage name collides with a sibling.
    #[error("{0}")]
    DuplicateName(#[from] DuplicateNameError),

    /// A referenced stage does not exist.
    #[error("{0}")]
    UnknownStage(#[from] UnknownStageError),

    /// An operator referenced fields missing from the current scope.
    #[error("{0}")]
    UnknownField(#[from] UnknownFieldError),

    /// A declared primary key is not a subset of the output fields.
    #[error("{0}")]
    InvalidPrimaryKey(#[from] InvalidPrimaryKeyError),

    /// An aggregation was applied without a grouping.
    #[error("{0}")]
    UngroupedAggregation(#[from] UngroupedAggregationError),

    /// A joiner policy token was not recognized.
    #[error("{0}")]
    InvalidJoiner(#[from] InvalidJoinerError),

    /// A rename map referenced names not in the current scope.
    #[error("{0}")]
    InvalidRename(#[from] InvalidRenameError),

    /// An operator would produce duplicate output names.
    #[error("{0}")]
    FieldCollision(#[from] FieldCollisionError),

    /// Merged inputs do not have compatible shapes.
    #[error("{0}")]
    IncompatibleSchema(#[from] IncompatibleSchemaError),

    /// A field specification could not be normalized.
    #[error("{0}")]
    InvalidFieldSpec(#[from] InvalidFieldSpecError),

    /// An operation handle was misused or misconfigured.
    #[error("{0}")]
    InvalidOperation(#[from] InvalidOperationError),

    /// An option value was malformed.
    #[error("{0}")]
    InvalidOption(#[from] InvalidOptionError),

    /// A flow was completed without any assembly.
    #[error("{0}")]
    EmptyFlow(#[from] EmptyFlowError),

    /// The produced graph contains a cycle.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),
}

impl AssemblyError {
    /// Wraps a field-algebra failure with the stage it occurred in.
    #[must_use]
    pub fn from_fields(stage: impl Into<String>, err: FieldSetError) -> Self {
        let stage = stage.into();
        match err {
            FieldSetError::Missing(names) => UnknownFieldError::new(stage, names).into(),
            FieldSetError::Duplicate(names) => FieldCollisionError::new(stage, names).into(),
            FieldSetError::PositionOutOfRange { position, width } => UnknownFieldError::new(
                stage,
                vec![format!("#{position} (width {width})")],
            )
            .into(),
            FieldSetError::Malformed(message) => InvalidFieldSpecError::new(message).into(),
        }
    }

    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateName(_) => "ASSEMBLY-001-DUPLICATE_NAME",
            Self::UnknownStage(_) => "ASSEMBLY-002-UNKNOWN_STAGE",
            Self::UnknownField(_) => "ASSEMBLY-003-UNKNOWN_FIELD",
            Self::InvalidPrimaryKey(_) => "ASSEMBLY-004-INVALID_PRIMARY_KEY",
            Self::UngroupedAggregation(_) => "ASSEMBLY-005-UNGROUPED_AGGREGATION",
            Self::InvalidJoiner(_) => "ASSEMBLY-006-INVALID_JOINER",
            Self::InvalidRename(_) => "ASSEMBLY-007-INVALID_RENAME",
            Self::FieldCollision(_) => "ASSEMBLY-008-FIELD_COLLISION",
            Self::IncompatibleSchema(_) => "ASSEMBLY-009-INCOMPATIBLE_SCHEMA",
            Self::InvalidFieldSpec(_) => "ASSEMBLY-010-INVALID_FIELD_SPEC",
            Self::InvalidOperation(_) => "ASSEMBLY-011-INVALID_OPERATION",
            Self::InvalidOption(_) => "ASSEMBLY-012-INVALID_OPTION",
            Self::EmptyFlow(_) => "ASSEMBLY-013-EMPTY_FLOW",
            Self::CycleDetected(_) => "ASSEMBLY-014-CYCLE",
        }
    }

    /// Returns a hint for fixing the error, if one is known.
    #[must_use]
    pub fn fix_hint(&self) -> Option<&'static str> {
        ErrorSuggestions::get(self.code())
    }

    /// Returns the stage the error was raised for, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::DuplicateName(e) => Some(&e.name),
            Self::UnknownStage(e) => Some(&e.stage),
            Self::UnknownField(e) => Some(&e.stage),
            Self::InvalidPrimaryKey(e) => Some(&e.stage),
            Self::UngroupedAggregation(e) => Some(&e.stage),
            Self::InvalidJoiner(e) => e.stage.as_deref(),
            Self::InvalidRename(e) => Some(&e.stage),
            Self::FieldCollision(e) => Some(&e.stage),
            Self::IncompatibleSchema(e) => Some(&e.stage),
            Self::InvalidOperation(e) => e.stage.as_deref(),
            Self::InvalidOption(e) => e.stage.as_deref(),
            Self::InvalidFieldSpec(_) | Self::EmptyFlow(_) | Self::CycleDetected(_) => None,
        }
    }

    /// Attaches a stage name to errors raised before one was known.
    #[must_use]
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            Self::InvalidJoiner(mut e) if e.stage.is_none() => {
                e.stage = Some(stage.to_string());
                e.into()
            }
            Self::InvalidOperation(mut e) if e.stage.is_none() => {
                e.stage = Some(stage.to_string());
                e.into()
            }
            Self::InvalidOption(mut e) if e.stage.is_none() => {
                e.stage = Some(stage.to_string());
                e.into()
            }
            other => other,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Some(stage) = self.stage() {
            map.insert("stage".to_string(), serde_json::json!(stage));
        }
        if let Some(hint) = self.fix_hint() {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        map
    }
}

/// Error raised when a stage name collides with an existing sibling.
#[derive(Debug, Clone, Error)]
#[error("Stage '{name}' already exists under '{parent}'")]
pub struct DuplicateNameError {
    /// The colliding name.
    pub name: String,
    /// The parent the stage was declared under.
    pub parent: String,
}

impl DuplicateNameError {
    /// Creates a new duplicate name error.
    #[must_use]
    pub fn new(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
        }
    }
}

/// Error raised when a join, union or lookup references a missing stage.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' references unknown stage '{referenced}'")]
pub struct UnknownStageError {
    /// The stage performing the lookup.
    pub stage: String,
    /// The name that could not be resolved.
    pub referenced: String,
}

impl UnknownStageError {
    /// Creates a new unknown stage error.
    #[must_use]
    pub fn new(stage: impl Into<String>, referenced: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            referenced: referenced.into(),
        }
    }
}

/// Error raised when an operator references fields absent from the scope.
#[derive(Debug, Clone, Error)]
#[error("Unknown fields in stage '{stage}': [{}]", fields.join(", "))]
pub struct UnknownFieldError {
    /// The stage whose scope was consulted.
    pub stage: String,
    /// The missing field names.
    pub fields: Vec<String>,
}

impl UnknownFieldError {
    /// Creates a new unknown field error.
    #[must_use]
    pub fn new(stage: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            stage: stage.into(),
            fields,
        }
    }
}

/// Error raised when a primary key is not contained in the output fields.
#[derive(Debug, Clone, Error)]
#[error("Invalid primary key for stage '{stage}': [{}] not in [{}]", key.join(", "), available.join(", "))]
pub struct InvalidPrimaryKeyError {
    /// The stage the key was declared on.
    pub stage: String,
    /// The declared key.
    pub key: Vec<String>,
    /// The fields currently available.
    pub available: Vec<String>,
}

impl InvalidPrimaryKeyError {
    /// Creates a new invalid primary key error.
    #[must_use]
    pub fn new(stage: impl Into<String>, key: Vec<String>, available: Vec<String>) -> Self {
        Self {
            stage: stage.into(),
            key,
            available,
        }
    }
}

/// Error raised when an aggregation has no preceding grouping.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' applies aggregation '{operation}' without a grouping")]
pub struct UngroupedAggregationError {
    /// The stage.
    pub stage: String,
    /// The aggregation operation name.
    pub operation: String,
}

impl UngroupedAggregationError {
    /// Creates a new ungrouped aggregation error.
    #[must_use]
    pub fn new(stage: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            operation: operation.into(),
        }
    }
}

/// Error raised for an unrecognized joiner token or malformed mixed list.
#[derive(Debug, Clone, Error)]
#[error("Invalid joiner: {token}")]
pub struct InvalidJoinerError {
    /// The stage performing the join, when known.
    pub stage: Option<String>,
    /// The offending token or description.
    pub token: String,
}

impl InvalidJoinerError {
    /// Creates a new invalid joiner error.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            stage: None,
            token: token.into(),
        }
    }
}

/// Error raised when a rename map references names not in scope.
#[derive(Debug, Clone, Error)]
#[error("Invalid rename in stage '{stage}': unknown names [{}]", names.join(", "))]
pub struct InvalidRenameError {
    /// The stage.
    pub stage: String,
    /// The names that were not found.
    pub names: Vec<String>,
}

impl InvalidRenameError {
    /// Creates a new invalid rename error.
    #[must_use]
    pub fn new(stage: impl Into<String>, names: Vec<String>) -> Self {
        Self {
            stage: stage.into(),
            names,
        }
    }
}

/// Error raised when an operator would emit the same field name twice.
#[derive(Debug, Clone, Error)]
#[error("Field collision in stage '{stage}': [{}]", fields.join(", "))]
pub struct FieldCollisionError {
    /// The stage.
    pub stage: String,
    /// The colliding names.
    pub fields: Vec<String>,
}

impl FieldCollisionError {
    /// Creates a new field collision error.
    #[must_use]
    pub fn new(stage: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            stage: stage.into(),
            fields,
        }
    }
}

/// Error raised when merged inputs have incompatible shapes.
#[derive(Debug, Clone, Error)]
#[error("Incompatible schema in stage '{stage}': {message}")]
pub struct IncompatibleSchemaError {
    /// The stage.
    pub stage: String,
    /// What did not line up.
    pub message: String,
}

impl IncompatibleSchemaError {
    /// Creates a new incompatible schema error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Error raised when a field specification cannot be normalized.
#[derive(Debug, Clone, Error)]
#[error("Invalid field specification: {message}")]
pub struct InvalidFieldSpecError {
    /// Description of the problem.
    pub message: String,
}

impl InvalidFieldSpecError {
    /// Creates a new invalid field spec error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised when an operation is misused or misconfigured.
#[derive(Debug, Clone, Error)]
#[error("Invalid operation '{operation}': {reason}")]
pub struct InvalidOperationError {
    /// The stage, when known.
    pub stage: Option<String>,
    /// The operation name.
    pub operation: String,
    /// Why it was rejected.
    pub reason: String,
}

impl InvalidOperationError {
    /// Creates a new invalid operation error.
    #[must_use]
    pub fn new(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: None,
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised for malformed option values.
#[derive(Debug, Clone, Error)]
#[error("Invalid option: {message}")]
pub struct InvalidOptionError {
    /// The stage, when known.
    pub stage: Option<String>,
    /// Description of the problem.
    pub message: String,
}

impl InvalidOptionError {
    /// Creates a new invalid option error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            stage: None,
            message: message.into(),
        }
    }

    /// Sets the stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }
}

/// Error raised when completing a flow with no assemblies.
#[derive(Debug, Clone, Error)]
#[error("Flow '{flow}' has no assemblies")]
pub struct EmptyFlowError {
    /// The flow name.
    pub flow: String,
}

impl EmptyFlowError {
    /// Creates a new empty flow error.
    #[must_use]
    pub fn new(flow: impl Into<String>) -> Self {
        Self { flow: flow.into() }
    }
}

/// Error raised when a cycle is detected in the pipe graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipe graph: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The nodes forming the cycle.
    pub cycle_path: Vec<String>,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        Self { cycle_path }
    }
}

/// Provides default suggestions for error codes.
pub struct ErrorSuggestions;

impl ErrorSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "ASSEMBLY-001-DUPLICATE_NAME" => Some(
                "Stage names must be unique among siblings. Rename the branch or assembly.",
            ),
            "ASSEMBLY-002-UNKNOWN_STAGE" => Some(
                "Declare the referenced assembly before the join or union that reads it. \
                 Check for typos in stage names.",
            ),
            "ASSEMBLY-003-UNKNOWN_FIELD" => Some(
                "Call debug_scope() on the stage to list the fields available at this point.",
            ),
            "ASSEMBLY-004-INVALID_PRIMARY_KEY" => Some(
                "Declare the primary key after the operator that produces its fields.",
            ),
            "ASSEMBLY-005-UNGROUPED_AGGREGATION" => Some(
                "Aggregate inside a group_by or join block, or right after a grouping operator.",
            ),
            "ASSEMBLY-006-INVALID_JOINER" => Some(
                "Use inner, left, right, outer, or one inner/outer flag per joined input.",
            ),
            "ASSEMBLY-007-INVALID_RENAME" => Some(
                "Only fields present in the current scope can be renamed.",
            ),
            "ASSEMBLY-008-FIELD_COLLISION" => Some(
                "Rename or discard one of the colliding fields first.",
            ),
            "ASSEMBLY-009-INCOMPATIBLE_SCHEMA" => Some(
                "Project the inputs to the same number of fields before merging them.",
            ),
            "ASSEMBLY-013-EMPTY_FLOW" => Some(
                "Add at least one assembly to the flow before completing it.",
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_message() {
        let err = UnknownFieldError::new("orders", vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Unknown fields in stage 'orders': [a, b]");
    }

    #[test]
    fn test_codes_and_hints() {
        let err: AssemblyError = DuplicateNameError::new("orders", "flow").into();
        assert_eq!(err.code(), "ASSEMBLY-001-DUPLICATE_NAME");
        assert!(err.fix_hint().is_some());
        assert_eq!(err.stage(), Some("orders"));
    }

    #[test]
    fn test_from_fields_maps_variants() {
        let err = AssemblyError::from_fields("s", FieldSetError::Missing(vec!["x".to_string()]));
        assert!(matches!(err, AssemblyError::UnknownField(_)));

        let err = AssemblyError::from_fields("s", FieldSetError::Duplicate(vec!["x".to_string()]));
        assert!(matches!(err, AssemblyError::FieldCollision(_)));
    }

    #[test]
    fn test_in_stage_fills_missing_stage() {
        let err: AssemblyError = InvalidJoinerError::new("sideways").into();
        assert_eq!(err.stage(), None);
        let err = err.in_stage("joined");
        assert_eq!(err.stage(), Some("joined"));
    }

    #[test]
    fn test_to_dict() {
        let err: AssemblyError = UngroupedAggregationError::new("s", "sum").into();
        let dict = err.to_dict();
        assert_eq!(dict.get("code").unwrap(), "ASSEMBLY-005-UNGROUPED_AGGREGATION");
        assert_eq!(dict.get("stage").unwrap(), "s");
    }

    #[test]
    fn test_suggestions() {
        assert!(ErrorSuggestions::get("ASSEMBLY-014-CYCLE").is_none());
        assert!(ErrorSuggestions::get("ASSEMBLY-002-UNKNOWN_STAGE").is_some());
    }
}
