//! Field specifications accepted by operators.
//!
//! Operators accept a single name, a position, or an ordered list of either.
//! All forms are normalized to a [`FieldSet`] before any scope is consulted.

use super::{Field, FieldSet, FieldSetError};
use crate::errors::InvalidFieldSpecError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An unvalidated field specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "Vec<Field>")]
pub enum FieldSpec {
    /// A single name or position.
    One(Field),
    /// An ordered list of names and positions.
    Many(Vec<Field>),
}

impl FieldSpec {
    /// Normalizes the specification into a field set.
    ///
    /// Repeated fields are a malformed specification rather than a collision.
    pub fn normalize(&self) -> Result<FieldSet, FieldSetError> {
        let fields = match self {
            Self::One(field) => vec![field.clone()],
            Self::Many(fields) => fields.clone(),
        };
        FieldSet::new(fields).map_err(|err| match err {
            FieldSetError::Duplicate(names) => FieldSetError::Malformed(format!(
                "field specification repeats [{}]",
                names.join(", ")
            )),
            other => other,
        })
    }

    /// Normalizes, then resolves against the fields in scope.
    pub fn resolve(&self, against: &FieldSet) -> Result<FieldSet, FieldSetError> {
        self.normalize()?.resolve(against)
    }
}

impl From<&str> for FieldSpec {
    fn from(name: &str) -> Self {
        Self::One(name.into())
    }
}

impl From<String> for FieldSpec {
    fn from(name: String) -> Self {
        Self::One(name.into())
    }
}

impl From<i32> for FieldSpec {
    fn from(pos: i32) -> Self {
        Self::One(Field::Position(pos))
    }
}

impl From<Field> for FieldSpec {
    fn from(field: Field) -> Self {
        Self::One(field)
    }
}

impl From<Vec<Field>> for FieldSpec {
    fn from(fields: Vec<Field>) -> Self {
        Self::Many(fields)
    }
}

impl From<Vec<&str>> for FieldSpec {
    fn from(names: Vec<&str>) -> Self {
        Self::Many(names.into_iter().map(Field::from).collect())
    }
}

impl From<Vec<String>> for FieldSpec {
    fn from(names: Vec<String>) -> Self {
        Self::Many(names.into_iter().map(Field::from).collect())
    }
}

impl From<&[&str]> for FieldSpec {
    fn from(names: &[&str]) -> Self {
        Self::Many(names.iter().map(|n| Field::from(*n)).collect())
    }
}

impl<const N: usize> From<[&str; N]> for FieldSpec {
    fn from(names: [&str; N]) -> Self {
        Self::Many(names.into_iter().map(Field::from).collect())
    }
}

impl From<FieldSet> for FieldSpec {
    fn from(set: FieldSet) -> Self {
        Self::Many(set.into())
    }
}

impl From<&FieldSet> for FieldSpec {
    fn from(set: &FieldSet) -> Self {
        Self::Many(set.iter().cloned().collect())
    }
}

impl From<FieldSpec> for Vec<Field> {
    fn from(spec: FieldSpec) -> Self {
        match spec {
            FieldSpec::One(field) => vec![field],
            FieldSpec::Many(fields) => fields,
        }
    }
}

fn field_from_value(value: &serde_json::Value) -> Result<Field, InvalidFieldSpecError> {
    match value {
        serde_json::Value::String(name) => Ok(Field::Name(name.clone())),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .map(Field::Position)
            .ok_or_else(|| InvalidFieldSpecError::new(format!("not a field position: {n}"))),
        other => Err(InvalidFieldSpecError::new(format!(
            "expected a field name or position, got {other}"
        ))),
    }
}

impl TryFrom<&serde_json::Value> for FieldSpec {
    type Error = InvalidFieldSpecError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Array(items) => items
                .iter()
                .map(field_from_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Many),
            other => field_from_value(other).map(Self::One),
        }
    }
}

impl TryFrom<serde_json::Value> for FieldSpec {
    type Error = InvalidFieldSpecError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Self::try_from(&value)
    }
}

/// Selects arguments for, or the output of, a row or aggregation operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Every incoming field, followed by the operation's results.
    #[default]
    All,
    /// Only the operation's results.
    Results,
    /// Only the operation's arguments.
    Args,
    /// The incoming fields with the arguments replaced in place by the results.
    Replace,
    /// The incoming fields minus the arguments, followed by the results.
    Swap,
    /// An explicit selection.
    Fields(FieldSpec),
}

macro_rules! from_field_spec {
    ($target:ident, $variant:ident: $($source:ty),+) => {
        $(
            impl From<$source> for $target {
                fn from(spec: $source) -> Self {
                    Self::$variant(spec.into())
                }
            }
        )+

        impl<const N: usize> From<[&str; N]> for $target {
            fn from(names: [&str; N]) -> Self {
                Self::$variant(names.into())
            }
        }
    };
}

from_field_spec!(Selector, Fields: FieldSpec, &str, String, i32, Field, Vec<&str>, Vec<String>, FieldSet, &FieldSet);

/// Input to output field pairs for composite aggregators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMapping {
    /// Each field aggregates into itself.
    Same(FieldSpec),
    /// Input field name to output field name.
    Pairs(BTreeMap<String, String>),
}

impl FieldMapping {
    /// Resolves the input side against `against`, returning pairs in order.
    ///
    /// Explicit pairs are applied in sorted input-name order.
    pub fn resolve(&self, against: &FieldSet) -> Result<Vec<(Field, Field)>, FieldSetError> {
        match self {
            Self::Same(spec) => Ok(spec
                .resolve(against)?
                .iter()
                .map(|f| (f.clone(), f.clone()))
                .collect()),
            Self::Pairs(map) => {
                let inputs = FieldSet::new(map.keys().map(String::as_str))?.resolve(against)?;
                Ok(inputs
                    .iter()
                    .zip(map.values())
                    .map(|(input, output)| (input.clone(), Field::Name(output.clone())))
                    .collect())
            }
        }
    }
}

from_field_spec!(FieldMapping, Same: FieldSpec, &str, String, i32, Vec<&str>, Vec<String>, FieldSet);

impl FieldMapping {
    /// Builds a mapping from input/output name pairs.
    pub fn pairs<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self::Pairs(
            pairs
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_forms() {
        assert_eq!(FieldSpec::from("a").normalize().unwrap().names(), vec!["a"]);
        assert_eq!(FieldSpec::from(["a", "b"]).normalize().unwrap().names(), vec!["a", "b"]);
        assert_eq!(
            FieldSpec::from(2).normalize().unwrap().get(0),
            Some(&Field::Position(2))
        );
    }

    #[test]
    fn test_normalize_repeated_is_malformed() {
        assert!(matches!(
            FieldSpec::from(["a", "a"]).normalize(),
            Err(FieldSetError::Malformed(_))
        ));
    }

    #[test]
    fn test_from_json_value() {
        let spec = FieldSpec::try_from(&serde_json::json!(["a", 1])).unwrap();
        assert_eq!(spec, FieldSpec::Many(vec![Field::from("a"), Field::Position(1)]));
        assert!(FieldSpec::try_from(&serde_json::json!({"a": 1})).is_err());
        assert!(FieldSpec::try_from(&serde_json::json!(true)).is_err());
        assert!(FieldSpec::try_from(&serde_json::json!([["a"]])).is_err());
        assert!(FieldSpec::try_from(&serde_json::json!(1.5)).is_err());
    }

    #[test]
    fn test_deserialize_through_value() {
        let spec: FieldSpec = serde_json::from_str(r#""name""#).unwrap();
        assert_eq!(spec, FieldSpec::from("name"));
        assert!(serde_json::from_str::<FieldSpec>("null").is_err());
    }

    #[test]
    fn test_mapping_pairs_sorted() {
        let scope = FieldSet::new(["b", "a"]).unwrap();
        let mapping = FieldMapping::pairs([("b", "b_total"), ("a", "a_total")]);
        let pairs = mapping.resolve(&scope).unwrap();
        assert_eq!(pairs[0], (Field::from("a"), Field::from("a_total")));
        assert_eq!(pairs[1], (Field::from("b"), Field::from("b_total")));
    }

    #[test]
    fn test_mapping_same() {
        let scope = FieldSet::new(["x", "y"]).unwrap();
        let pairs = FieldMapping::from(-1).resolve(&scope).unwrap();
        assert_eq!(pairs, vec![(Field::from("y"), Field::from("y"))]);
    }
}
