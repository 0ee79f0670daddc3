//! Typed expression stubs.
//!
//! Expressions reference fields as `$name` or `$name:type`. Parsing strips the
//! markers and records each parameter's type; the expression text itself is
//! opaque to assembly.

use crate::errors::InvalidOperationError;
use crate::fields::FieldType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PARAMETER_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)(?::([A-Za-z]+))?"));

/// A parsed expression and its typed parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expr {
    /// Expression text with parameter markers removed.
    pub expression: String,
    /// Parameter names and their types, sorted by name.
    pub parameters: BTreeMap<String, FieldType>,
}

impl Expr {
    /// Parses an expression, defaulting untyped parameters to `string`.
    pub fn parse(source: &str) -> Result<Self, InvalidOperationError> {
        let pattern = PARAMETER_PATTERN
            .as_ref()
            .map_err(|e| InvalidOperationError::new("expression", e.to_string()))?;
        let mut parameters = BTreeMap::new();
        for caps in pattern.captures_iter(source) {
            let name = caps[1].to_string();
            let ty = match caps.get(2) {
                Some(ty) => ty
                    .as_str()
                    .parse::<FieldType>()
                    .map_err(|e| InvalidOperationError::new("expression", e.message))?,
                None => FieldType::String,
            };
            if let Some(previous) = parameters.insert(name.clone(), ty) {
                if previous != ty {
                    return Err(InvalidOperationError::new(
                        "expression",
                        format!("parameter '{name}' typed both {previous} and {ty}"),
                    ));
                }
            }
        }
        let expression = pattern.replace_all(source, "${1}").into_owned();
        Ok(Self {
            expression,
            parameters,
        })
    }

    /// Returns the logical negation of this expression.
    #[must_use]
    pub fn negate(&self) -> Self {
        Self {
            expression: format!("!({})", self.expression),
            parameters: self.parameters.clone(),
        }
    }

    /// Returns the parameter names in sorted order.
    #[must_use]
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.keys().cloned().collect()
    }
}
