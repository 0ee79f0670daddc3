//! Test assertions for stage scopes.

use crate::errors::AssemblyError;
use crate::flow::Flow;
use crate::scope::Scope;

fn scope<'a>(flow: &'a Flow, stage: &str) -> &'a Scope {
    flow.scope(stage)
        .unwrap_or_else(|| panic!("Expected stage '{stage}' to exist in flow '{}'", flow.name()))
}

/// Asserts the stage's output fields, in order.
pub fn assert_values_fields(flow: &Flow, stage: &str, expected: &[&str]) {
    let actual = scope(flow, stage).values_fields().names();
    assert_eq!(
        actual, expected,
        "Expected fields {expected:?} for stage '{stage}', got {actual:?}"
    );
}

/// Asserts the stage's primary key.
pub fn assert_primary_key(flow: &Flow, stage: &str, expected: &[&str]) {
    let actual = scope(flow, stage).primary_key_fields().map(|k| k.names());
    assert_eq!(
        actual.as_deref(),
        Some(expected.iter().map(ToString::to_string).collect::<Vec<_>>().as_slice()),
        "Expected primary key {expected:?} for stage '{stage}', got {actual:?}"
    );
}

/// Asserts the stage has no primary key.
pub fn assert_no_primary_key(flow: &Flow, stage: &str) {
    let scope = scope(flow, stage);
    assert!(
        scope.primary_key_fields().is_none(),
        "Expected no primary key for stage '{stage}', got {:?}",
        scope.primary_key_fields()
    );
}

/// Asserts the stage's grouping key.
pub fn assert_grouping_key(flow: &Flow, stage: &str, expected: &[&str]) {
    let actual = scope(flow, stage).grouping_key_fields().map(|k| k.names());
    assert_eq!(
        actual.as_deref(),
        Some(expected.iter().map(ToString::to_string).collect::<Vec<_>>().as_slice()),
        "Expected grouping key {expected:?} for stage '{stage}', got {actual:?}"
    );
}

/// Asserts an assembly result failed with the given code.
pub fn assert_error_code<T: std::fmt::Debug>(result: &Result<T, AssemblyError>, code: &str) {
    match result {
        Err(err) => assert_eq!(
            err.code(),
            code,
            "Expected error code {code}, got {} ({err})",
            err.code()
        ),
        Ok(value) => panic!("Expected error code {code}, got success: {value:?}"),
    }
}
