//! Built-in operation descriptors.
//!
//! Each constructor records the operation's kind, declared fields, and
//! parameters. Regex patterns are compiled once here so that a bad pattern
//! fails during assembly rather than at execution.

use super::{AssertionLevel, Expr, Operation, OperationKind, OperationSpec};
use crate::errors::InvalidOperationError;
use crate::fields::{FieldSet, FieldType};
use regex::Regex;
use serde_json::json;
use std::sync::Arc;

fn compile(operation: &str, pattern: &str) -> Result<(), InvalidOperationError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| InvalidOperationError::new(operation, e.to_string()))
}

fn function(name: &str, into: FieldSet) -> OperationSpec {
    OperationSpec::new(name, OperationKind::Function).with_declared_fields(into)
}

fn aggregator(name: &str, into: &str) -> OperationSpec {
    OperationSpec::new(name, OperationKind::Aggregator).with_declared_fields(FieldSet::single(into))
}

/// Passes its arguments through unchanged.
#[must_use]
pub fn identity() -> Arc<dyn Operation> {
    OperationSpec::new("identity", OperationKind::Identity).shared()
}

/// Passes its arguments through under new names, positionally.
#[must_use]
pub fn identity_as(fields: FieldSet) -> Arc<dyn Operation> {
    OperationSpec::new("identity", OperationKind::Identity)
        .with_declared_fields(fields)
        .shared()
}

/// Passes its arguments through, coerced to the given types.
#[must_use]
pub fn identity_cast(fields: FieldSet, types: &[FieldType]) -> Arc<dyn Operation> {
    OperationSpec::new("identity", OperationKind::Identity)
        .with_declared_fields(fields)
        .with_param("types", json!(types))
        .shared()
}

/// Parses the argument with a regex, emitting one field per group.
pub fn regex_parser(pattern: &str, into: FieldSet) -> Result<Arc<dyn Operation>, InvalidOperationError> {
    compile("regex_parser", pattern)?;
    Ok(function("regex_parser", into)
        .with_param("pattern", json!(pattern))
        .shared())
}

/// Splits the argument on a regex into a fixed set of fields.
pub fn regex_splitter(into: FieldSet, pattern: &str) -> Result<Arc<dyn Operation>, InvalidOperationError> {
    compile("regex_splitter", pattern)?;
    Ok(function("regex_splitter", into)
        .with_param("pattern", json!(pattern))
        .shared())
}

/// Splits the argument on a regex, emitting one tuple per piece.
pub fn regex_split_generator(
    into: FieldSet,
    pattern: &str,
) -> Result<Arc<dyn Operation>, InvalidOperationError> {
    compile("regex_split_generator", pattern)?;
    Ok(function("regex_split_generator", into)
        .with_param("pattern", json!(pattern))
        .shared())
}

/// Emits one tuple per regex match in the argument.
pub fn regex_generator(into: FieldSet, pattern: &str) -> Result<Arc<dyn Operation>, InvalidOperationError> {
    compile("regex_generator", pattern)?;
    Ok(function("regex_generator", into)
        .with_param("pattern", json!(pattern))
        .shared())
}

/// Replaces regex matches in the argument.
pub fn regex_replace(
    into: &str,
    pattern: &str,
    replacement: &str,
) -> Result<Arc<dyn Operation>, InvalidOperationError> {
    compile("regex_replace", pattern)?;
    Ok(function("regex_replace", FieldSet::single(into))
        .with_param("pattern", json!(pattern))
        .with_param("replacement", json!(replacement))
        .shared())
}

/// Keeps or removes tuples whose arguments match a regex.
pub fn regex_filter(pattern: &str, remove_match: bool) -> Result<Arc<dyn Operation>, InvalidOperationError> {
    compile("regex_filter", pattern)?;
    Ok(OperationSpec::new("regex_filter", OperationKind::Filter)
        .with_param("pattern", json!(pattern))
        .with_param("remove_match", json!(remove_match))
        .shared())
}

/// Parses the argument as a date.
#[must_use]
pub fn date_parser(into: &str, pattern: &str) -> Arc<dyn Operation> {
    function("date_parser", FieldSet::single(into))
        .with_param("pattern", json!(pattern))
        .shared()
}

/// Formats the argument as a date string.
#[must_use]
pub fn date_formatter(into: &str, pattern: &str, timezone: Option<&str>) -> Arc<dyn Operation> {
    function("date_formatter", FieldSet::single(into))
        .with_param("pattern", json!(pattern))
        .with_param("timezone", json!(timezone.unwrap_or("UTC")))
        .shared()
}

/// Inserts a constant value.
#[must_use]
pub fn insert_function(name: &str, value: serde_json::Value) -> Arc<dyn Operation> {
    function("insert", FieldSet::single(name))
        .with_param("value", value)
        .shared()
}

/// Evaluates an expression into a new field.
#[must_use]
pub fn expression_function(into: &str, expr: &Expr) -> Arc<dyn Operation> {
    function("expression_function", FieldSet::single(into))
        .with_param("expression", json!(expr.expression))
        .with_param("parameters", json!(expr.parameters))
        .shared()
}

/// Removes tuples for which an expression holds.
#[must_use]
pub fn expression_filter(expr: &Expr) -> Arc<dyn Operation> {
    OperationSpec::new("expression_filter", OperationKind::Filter)
        .with_param("expression", json!(expr.expression))
        .with_param("parameters", json!(expr.parameters))
        .shared()
}

/// Joins the arguments into a single delimited field.
#[must_use]
pub fn field_joiner(into: &str, delimiter: &str) -> Arc<dyn Operation> {
    function("field_joiner", FieldSet::single(into))
        .with_param("delimiter", json!(delimiter))
        .shared()
}

/// Removes tuples whose arguments are null.
#[must_use]
pub fn filter_null() -> Arc<dyn Operation> {
    OperationSpec::new("filter_null", OperationKind::Filter).shared()
}

/// Removes tuples whose arguments are not null.
#[must_use]
pub fn filter_not_null() -> Arc<dyn Operation> {
    OperationSpec::new("filter_not_null", OperationKind::Filter).shared()
}

/// Prints tuples as they pass.
#[must_use]
pub fn debug_filter(print_fields: bool, tuple_interval: u32, fields_interval: u32) -> Arc<dyn Operation> {
    OperationSpec::new("debug", OperationKind::Filter)
        .with_param("print_fields", json!(print_fields))
        .with_param("tuple_interval", json!(tuple_interval))
        .with_param("fields_interval", json!(fields_interval))
        .shared()
}

/// Asserts every tuple has exactly `size` fields.
#[must_use]
pub fn assert_size_equals(size: usize, level: AssertionLevel) -> Arc<dyn Operation> {
    OperationSpec::new("assert_size_equals", OperationKind::Assertion)
        .with_param("size", json!(size))
        .with_param("level", json!(level))
        .shared()
}

/// Asserts no argument is null.
#[must_use]
pub fn assert_not_null(level: AssertionLevel) -> Arc<dyn Operation> {
    OperationSpec::new("assert_not_null", OperationKind::Assertion)
        .with_param("level", json!(level))
        .shared()
}

/// Asserts every group has exactly `size` tuples.
#[must_use]
pub fn assert_group_size_equals(size: usize, level: AssertionLevel) -> Arc<dyn Operation> {
    OperationSpec::new("assert_group_size_equals", OperationKind::GroupAssertion)
        .with_param("size", json!(size))
        .with_param("level", json!(level))
        .shared()
}

/// Keeps the first value of the group.
#[must_use]
pub fn first_function(into: &str) -> Arc<dyn Operation> {
    aggregator("first", into).shared()
}

/// Keeps the last value of the group.
#[must_use]
pub fn last_function(into: &str) -> Arc<dyn Operation> {
    aggregator("last", into).shared()
}

/// Minimum of the group.
#[must_use]
pub fn min_function(into: &str) -> Arc<dyn Operation> {
    aggregator("min", into).shared()
}

/// Maximum of the group.
#[must_use]
pub fn max_function(into: &str) -> Arc<dyn Operation> {
    aggregator("max", into).shared()
}

/// Average of the group.
#[must_use]
pub fn average_function(into: &str) -> Arc<dyn Operation> {
    aggregator("average", into).shared()
}

/// Number of tuples in the group.
#[must_use]
pub fn count_function(into: &str) -> Arc<dyn Operation> {
    aggregator("count", into).shared()
}

/// Sum of the group, as `ty`.
#[must_use]
pub fn sum_function(into: &str, ty: FieldType) -> Arc<dyn Operation> {
    aggregator("sum", into)
        .with_param("type", json!(ty))
        .shared()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_rejected_at_construction() {
        let err = regex_parser("(unclosed", FieldSet::single("x")).unwrap_err();
        assert_eq!(err.operation, "regex_parser");
        assert!(regex_filter("[a-z]+", true).is_ok());
    }

    #[test]
    fn test_aggregators_declare_output() {
        let op = sum_function("total", FieldType::Long);
        assert_eq!(op.kind(), OperationKind::Aggregator);
        assert_eq!(op.declared_fields().unwrap().names(), vec!["total"]);
        assert_eq!(op.params()["type"], json!("long"));
    }

    #[test]
    fn test_identity_variants() {
        assert!(identity().declared_fields().is_none());
        let cast = identity_cast(FieldSet::single("n"), &[FieldType::Int]);
        assert_eq!(cast.params()["types"], json!(["int"]));
        assert_eq!(cast.kind(), OperationKind::Identity);
    }

    #[test]
    fn test_expression_function_params() {
        let expr = Expr::parse("$a:int * 2").unwrap();
        let op = expression_function("double_a", &expr);
        assert_eq!(op.params()["expression"], json!("a * 2"));
        assert_eq!(op.params()["parameters"], json!({"a": "int"}));
    }

    #[test]
    fn test_assertions() {
        let op = assert_group_size_equals(2, AssertionLevel::Valid);
        assert_eq!(op.kind(), OperationKind::GroupAssertion);
        assert_eq!(op.params()["level"], json!("valid"));
    }
}
