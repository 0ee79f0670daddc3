//! Ordered sets of unique field names.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Suffix used by [`FieldSet::dedup`] when none is configured.
pub const DEFAULT_DEDUP_SUFFIX: &str = "_";

/// A single field reference: a name or a position.
///
/// Negative positions count from the end of the tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    /// A named field.
    Name(String),
    /// A positional field.
    Position(i32),
}

impl Field {
    /// Returns the name, if this is a named field.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Position(_) => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Position(pos) => write!(f, "{pos}"),
        }
    }
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Field {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&String> for Field {
    fn from(name: &String) -> Self {
        Self::Name(name.clone())
    }
}

impl From<i32> for Field {
    fn from(pos: i32) -> Self {
        Self::Position(pos)
    }
}

/// Failures of the field-set algebra, before a stage is attached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldSetError {
    /// Referenced fields are not present.
    #[error("missing fields: [{}]", .0.join(", "))]
    Missing(Vec<String>),
    /// A field appears more than once.
    #[error("duplicate fields: [{}]", .0.join(", "))]
    Duplicate(Vec<String>),
    /// A position does not address any field.
    #[error("position {position} out of range for {width} fields")]
    PositionOutOfRange {
        /// The requested position.
        position: i32,
        /// The number of fields available.
        width: usize,
    },
    /// The specification itself is malformed.
    #[error("{0}")]
    Malformed(String),
}

/// An ordered set of unique fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Field>", into = "Vec<Field>")]
pub struct FieldSet {
    fields: Vec<Field>,
}

impl FieldSet {
    /// Creates an empty field set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a field set, rejecting duplicates.
    pub fn new<I, F>(fields: I) -> Result<Self, FieldSetError>
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        let fields: Vec<Field> = fields.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        let mut dups = Vec::new();
        for field in &fields {
            if !seen.insert(field) {
                let name = field.to_string();
                if !dups.contains(&name) {
                    dups.push(name);
                }
            }
        }
        if dups.is_empty() {
            Ok(Self { fields })
        } else {
            Err(FieldSetError::Duplicate(dups))
        }
    }

    /// Creates a field set holding one field.
    #[must_use]
    pub fn single(field: impl Into<Field>) -> Self {
        Self {
            fields: vec![field.into()],
        }
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates the fields in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }

    /// Returns the field at an index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn contains(&self, field: &Field) -> bool {
        self.fields.contains(field)
    }

    /// Returns true if a field with this name is present.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name() == Some(name))
    }

    /// Returns the index of a field.
    #[must_use]
    pub fn position_of(&self, field: &Field) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    /// Returns the fields rendered as strings.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(ToString::to_string).collect()
    }

    /// Returns true if every field here is also in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.fields.iter().all(|f| other.contains(f))
    }

    /// Left-priority union: all of `self`, then the fields of `other` not already present.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut fields = self.fields.clone();
        for field in &other.fields {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        Self { fields }
    }

    /// The fields of `self` not present in `other`, in `self`'s order.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|f| !other.contains(f))
                .cloned()
                .collect(),
        }
    }

    /// Concatenates two sets, failing if any field appears in both.
    pub fn append(&self, other: &Self) -> Result<Self, FieldSetError> {
        Self::new(self.fields.iter().chain(other.fields.iter()).cloned())
    }

    /// Merges several sets, renaming later collisions by appending `suffix`
    /// until the name is free. First-seen order and names win.
    #[must_use]
    pub fn dedup<'a, I>(sets: I, suffix: &str) -> Self
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let suffix = if suffix.is_empty() {
            DEFAULT_DEDUP_SUFFIX
        } else {
            suffix
        };
        let mut fields: Vec<Field> = Vec::new();
        for set in sets {
            for field in &set.fields {
                let mut candidate = field.clone();
                while fields.contains(&candidate) {
                    candidate = Field::Name(format!("{candidate}{suffix}"));
                }
                fields.push(candidate);
            }
        }
        Self { fields }
    }

    /// Resolves positions to names and checks that every name exists in `against`.
    pub fn resolve(&self, against: &Self) -> Result<Self, FieldSetError> {
        let mut resolved = Vec::with_capacity(self.fields.len());
        let mut missing = Vec::new();
        for field in &self.fields {
            match field {
                Field::Name(name) => {
                    if against.contains(field) {
                        resolved.push(field.clone());
                    } else {
                        missing.push(name.clone());
                    }
                }
                Field::Position(pos) => {
                    let width = against.len();
                    let index = if *pos < 0 {
                        i64::try_from(width).unwrap_or(i64::MAX) + i64::from(*pos)
                    } else {
                        i64::from(*pos)
                    };
                    let found = usize::try_from(index).ok().and_then(|i| against.get(i));
                    match found {
                        Some(f) => resolved.push(f.clone()),
                        None => {
                            return Err(FieldSetError::PositionOutOfRange {
                                position: *pos,
                                width,
                            })
                        }
                    }
                }
            }
        }
        if !missing.is_empty() {
            return Err(FieldSetError::Missing(missing));
        }
        Self::new(resolved)
    }

    /// Applies a name mapping, keeping unmapped names.
    pub fn rename(&self, map: &BTreeMap<String, String>) -> Result<Self, FieldSetError> {
        Self::new(self.fields.iter().map(|f| match f {
            Field::Name(name) => map
                .get(name)
                .map_or_else(|| f.clone(), |n| Field::Name(n.clone())),
            Field::Position(_) => f.clone(),
        }))
    }
}

impl fmt::Display for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names().join(", "))
    }
}

impl TryFrom<Vec<Field>> for FieldSet {
    type Error = FieldSetError;

    fn try_from(fields: Vec<Field>) -> Result<Self, Self::Error> {
        Self::new(fields)
    }
}

impl From<FieldSet> for Vec<Field> {
    fn from(set: FieldSet) -> Self {
        set.fields
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(names: &[&str]) -> FieldSet {
        FieldSet::new(names.iter().copied()).unwrap()
    }

    #[test]
    fn test_new_rejects_duplicates() {
        let err = FieldSet::new(["a", "b", "a"]).unwrap_err();
        assert_eq!(err, FieldSetError::Duplicate(vec!["a".to_string()]));
    }

    #[test]
    fn test_union_left_priority() {
        let u = set(&["a", "b"]).union(&set(&["c", "a", "d"]));
        assert_eq!(u, set(&["a", "b", "c", "d"]));
    }

    #[test]
    fn test_difference() {
        assert_eq!(set(&["a", "b", "c"]).difference(&set(&["b"])), set(&["a", "c"]));
    }

    #[test]
    fn test_dedup_suffixes_collisions() {
        let merged = FieldSet::dedup([&set(&["id", "name"]), &set(&["id", "id_", "amount"])], "_");
        assert_eq!(merged, set(&["id", "name", "id_", "id__", "amount"]));
    }

    #[test]
    fn test_dedup_idempotent() {
        let once = FieldSet::dedup([&set(&["a", "b"]), &set(&["b", "c"])], "_");
        let twice = FieldSet::dedup([&once], "_");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_dedup_order_sensitive() {
        let a = set(&["k", "x"]);
        let b = set(&["k", "y"]);
        let ab = FieldSet::dedup([&a, &b], "_");
        let ba = FieldSet::dedup([&b, &a], "_");
        assert_ne!(ab, ba);
        assert_eq!(ab.get(0), Some(&Field::from("k")));
        assert_eq!(ab.get(2), Some(&Field::from("k_")));
    }

    #[test]
    fn test_dedup_empty_suffix_falls_back() {
        let merged = FieldSet::dedup([&set(&["a"]), &set(&["a"])], "");
        assert_eq!(merged, set(&["a", "a_"]));
    }

    #[test]
    fn test_resolve_positions() {
        let scope = set(&["a", "b", "c"]);
        let spec = FieldSet::new([Field::Position(0), Field::Position(-1)]).unwrap();
        assert_eq!(spec.resolve(&scope).unwrap(), set(&["a", "c"]));
    }

    #[test]
    fn test_resolve_missing_and_out_of_range() {
        let scope = set(&["a"]);
        assert_eq!(
            set(&["a", "x", "y"]).resolve(&scope).unwrap_err(),
            FieldSetError::Missing(vec!["x".to_string(), "y".to_string()])
        );
        let spec = FieldSet::new([Field::Position(3)]).unwrap();
        assert!(matches!(
            spec.resolve(&scope),
            Err(FieldSetError::PositionOutOfRange { position: 3, width: 1 })
        ));
    }

    #[test]
    fn test_resolve_duplicate_after_positions() {
        let scope = set(&["a", "b"]);
        let spec = FieldSet::new([Field::from("a"), Field::Position(0)]).unwrap();
        assert!(matches!(spec.resolve(&scope), Err(FieldSetError::Duplicate(_))));
    }

    #[test]
    fn test_rename_collision() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "b".to_string());
        assert!(set(&["a", "b"]).rename(&map).is_err());
        assert_eq!(set(&["a", "c"]).rename(&map).unwrap(), set(&["b", "c"]));
    }

    #[test]
    fn test_serde_rejects_duplicates() {
        assert!(serde_json::from_str::<FieldSet>(r#"["a","a"]"#).is_err());
        let parsed: FieldSet = serde_json::from_str(r#"["a",1]"#).unwrap();
        assert_eq!(parsed.get(1), Some(&Field::Position(1)));
    }
}
