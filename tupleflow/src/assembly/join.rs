//! Grouping composers: `group_by` and `join`.
//!
//! Both optionally run a grouping block, after which fields that are
//! unambiguous per group are carried forward with an implicit `first`.
//! An input's non-key fields are unambiguous when its primary key is
//! contained in both its grouping primary key and the key it was grouped
//! on: each group then holds at most one tuple from that input.

use super::aggregations::{Aggregations, NoAggregation};
use super::Assembly;
use crate::errors::{AssemblyError, InvalidJoinerError, InvalidOptionError};
use crate::fields::{Field, FieldSet, FieldSpec};
use crate::graph::PipeKind;
use crate::scope::Scope;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// Row-inclusion policy of a join.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum Joiner {
    /// Only keys present in every input.
    #[default]
    Inner,
    /// Every key of the first input.
    Left,
    /// Every key of the last input.
    Right,
    /// Every key of any input.
    Outer,
    /// Per input: `true` for inner, `false` for outer.
    Mixed(Vec<bool>),
}

impl Joiner {
    /// Builds a mixed joiner from per-input flags.
    #[must_use]
    pub fn mixed(inner: impl IntoIterator<Item = bool>) -> Self {
        Self::Mixed(inner.into_iter().collect())
    }

    fn check_inputs(&self, inputs: usize) -> Result<(), InvalidJoinerError> {
        match self {
            Self::Mixed(flags) if flags.len() != inputs => Err(InvalidJoinerError::new(format!(
                "mixed joiner has {} entries for {inputs} inputs",
                flags.len()
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Joiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "inner"),
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Outer => write!(f, "outer"),
            Self::Mixed(flags) => {
                let flags: Vec<&str> = flags
                    .iter()
                    .map(|inner| if *inner { "inner" } else { "outer" })
                    .collect();
                write!(f, "mixed[{}]", flags.join(", "))
            }
        }
    }
}

impl FromStr for Joiner {
    type Err = InvalidJoinerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "outer" => Ok(Self::Outer),
            other => Err(InvalidJoinerError::new(other)),
        }
    }
}

fn mixed_entry(value: &Value) -> Result<bool, InvalidJoinerError> {
    match value {
        Value::Bool(inner) => Ok(*inner),
        Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
        Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
        Value::String(s) if s == "inner" => Ok(true),
        Value::String(s) if s == "outer" => Ok(false),
        other => Err(InvalidJoinerError::new(format!(
            "invalid mixed joiner entry: {other}"
        ))),
    }
}

impl TryFrom<Value> for Joiner {
    type Error = InvalidJoinerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => s.parse(),
            Value::Array(items) => items
                .iter()
                .map(mixed_entry)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Mixed),
            other => Err(InvalidJoinerError::new(other.to_string())),
        }
    }
}

impl From<Joiner> for Value {
    fn from(joiner: Joiner) -> Self {
        match joiner {
            Joiner::Mixed(flags) => Self::from(flags),
            policy => Self::String(policy.to_string()),
        }
    }
}

/// How each join input is grouped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupingSpec {
    /// The same fields for every input, in listed order.
    Shared(FieldSpec),
    /// Per-stage fields; inputs are taken in sorted stage-name order.
    PerStage(BTreeMap<String, FieldSpec>),
}

impl GroupingSpec {
    /// Builds a per-stage grouping.
    pub fn per_stage<I, K, V>(groupings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldSpec>,
    {
        Self::PerStage(
            groupings
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

macro_rules! shared_grouping_from {
    ($($source:ty),+) => {
        $(
            impl From<$source> for GroupingSpec {
                fn from(spec: $source) -> Self {
                    Self::Shared(spec.into())
                }
            }
        )+
    };
}

shared_grouping_from!(FieldSpec, &str, String, i32, Vec<&str>, Vec<String>, FieldSet);

impl<const N: usize> From<[&str; N]> for GroupingSpec {
    fn from(names: [&str; N]) -> Self {
        Self::Shared(names.into())
    }
}

impl From<BTreeMap<String, FieldSpec>> for GroupingSpec {
    fn from(map: BTreeMap<String, FieldSpec>) -> Self {
        Self::PerStage(map)
    }
}

/// Options for [`Assembly::join`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JoinOptions {
    /// Output field names; defaults to the deduplicated input fields.
    pub declared_fields: Option<FieldSpec>,
    /// Row-inclusion policy.
    pub joiner: Joiner,
}

impl JoinOptions {
    /// Sets explicit output field names.
    #[must_use]
    pub fn with_declared_fields(mut self, fields: impl Into<FieldSpec>) -> Self {
        self.declared_fields = Some(fields.into());
        self
    }

    /// Sets the joiner.
    #[must_use]
    pub fn with_joiner(mut self, joiner: Joiner) -> Self {
        self.joiner = joiner;
        self
    }
}

/// Options for [`Assembly::group_by_sorted`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupByOptions {
    /// Secondary sort; defaults to the grouping fields.
    pub sort_by: Option<FieldSpec>,
    /// Sort descending.
    pub reverse: bool,
}

impl GroupByOptions {
    /// Sets the secondary sort.
    #[must_use]
    pub fn with_sort_by(mut self, fields: impl Into<FieldSpec>) -> Self {
        self.sort_by = Some(fields.into());
        self
    }

    /// Sorts descending.
    #[must_use]
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

impl Assembly<'_> {
    /// Groups the stage on `fields`.
    pub fn group_by(&mut self, fields: impl Into<FieldSpec>) -> Result<&mut Self, AssemblyError> {
        self.group(fields.into(), GroupByOptions::default(), None::<NoAggregation>)
    }

    /// Groups the stage on `fields` with sort options.
    pub fn group_by_sorted(
        &mut self,
        fields: impl Into<FieldSpec>,
        options: GroupByOptions,
    ) -> Result<&mut Self, AssemblyError> {
        self.group(fields.into(), options, None::<NoAggregation>)
    }

    /// Groups the stage and runs a grouping block.
    pub fn group_by_with<F>(
        &mut self,
        fields: impl Into<FieldSpec>,
        options: GroupByOptions,
        block: F,
    ) -> Result<&mut Self, AssemblyError>
    where
        F: FnOnce(&mut Aggregations<'_, '_>) -> Result<(), AssemblyError>,
    {
        self.group(fields.into(), options, Some(block))
    }

    fn group<F>(
        &mut self,
        fields: FieldSpec,
        options: GroupByOptions,
        block: Option<F>,
    ) -> Result<&mut Self, AssemblyError>
    where
        F: FnOnce(&mut Aggregations<'_, '_>) -> Result<(), AssemblyError>,
    {
        let values = self.scope().values_fields().clone();
        let to_err = |e| AssemblyError::from_fields(self.name(), e);
        let grouping = fields.resolve(&values).map_err(to_err)?;
        let sort = match &options.sort_by {
            Some(spec) => spec.resolve(&values).map_err(to_err)?,
            None => grouping.clone(),
        };

        let scope = self.scope().outgoing_group_by(&grouping);
        let kind = PipeKind::GroupBy {
            grouping: grouping.clone(),
            sort,
            reverse: options.reverse,
        };
        let inputs = self.tail_inputs();
        self.install(kind, inputs, scope.clone(), None, false);

        if let Some(block) = block {
            self.aggregate_and_carry_first(block, &[scope], &[grouping], None)?;
        }
        Ok(self)
    }

    /// Joins stages on grouping fields.
    ///
    /// With [`GroupingSpec::PerStage`], `inputs` may be empty; if given, it
    /// must name exactly the mapped stages.
    pub fn join(
        &mut self,
        inputs: &[&str],
        on: impl Into<GroupingSpec>,
        options: JoinOptions,
    ) -> Result<&mut Self, AssemblyError> {
        self.co_group_inputs(inputs, on.into(), options, None::<NoAggregation>)
    }

    /// Joins stages and runs a grouping block over the result.
    pub fn join_with<F>(
        &mut self,
        inputs: &[&str],
        on: impl Into<GroupingSpec>,
        options: JoinOptions,
        block: F,
    ) -> Result<&mut Self, AssemblyError>
    where
        F: FnOnce(&mut Aggregations<'_, '_>) -> Result<(), AssemblyError>,
    {
        self.co_group_inputs(inputs, on.into(), options, Some(block))
    }

    /// Alias of [`Assembly::join`].
    pub fn co_group(
        &mut self,
        inputs: &[&str],
        on: impl Into<GroupingSpec>,
        options: JoinOptions,
    ) -> Result<&mut Self, AssemblyError> {
        self.join(inputs, on, options)
    }

    /// Inner join with default options.
    pub fn inner_join(&mut self, inputs: &[&str], on: impl Into<GroupingSpec>) -> Result<&mut Self, AssemblyError> {
        self.join(inputs, on, JoinOptions::default().with_joiner(Joiner::Inner))
    }

    /// Left join with default options.
    pub fn left_join(&mut self, inputs: &[&str], on: impl Into<GroupingSpec>) -> Result<&mut Self, AssemblyError> {
        self.join(inputs, on, JoinOptions::default().with_joiner(Joiner::Left))
    }

    /// Right join with default options.
    pub fn right_join(&mut self, inputs: &[&str], on: impl Into<GroupingSpec>) -> Result<&mut Self, AssemblyError> {
        self.join(inputs, on, JoinOptions::default().with_joiner(Joiner::Right))
    }

    /// Outer join with default options.
    pub fn outer_join(&mut self, inputs: &[&str], on: impl Into<GroupingSpec>) -> Result<&mut Self, AssemblyError> {
        self.join(inputs, on, JoinOptions::default().with_joiner(Joiner::Outer))
    }

    fn join_groupings(
        &self,
        inputs: &[&str],
        on: GroupingSpec,
    ) -> Result<Vec<(String, FieldSpec)>, AssemblyError> {
        match on {
            GroupingSpec::Shared(spec) => Ok(inputs
                .iter()
                .map(|name| ((*name).to_string(), spec.clone()))
                .collect()),
            GroupingSpec::PerStage(map) => {
                if !inputs.is_empty() {
                    let mut listed: Vec<&str> = inputs.to_vec();
                    listed.sort_unstable();
                    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                    if listed != keys {
                        return Err(InvalidOptionError::new(format!(
                            "join inputs [{}] do not match grouping stages [{}]",
                            inputs.join(", "),
                            keys.join(", ")
                        ))
                        .with_stage(self.name())
                        .into());
                    }
                }
                Ok(map.into_iter().collect())
            }
        }
    }

    fn co_group_inputs<F>(
        &mut self,
        inputs: &[&str],
        on: GroupingSpec,
        options: JoinOptions,
        block: Option<F>,
    ) -> Result<&mut Self, AssemblyError>
    where
        F: FnOnce(&mut Aggregations<'_, '_>) -> Result<(), AssemblyError>,
    {
        let stage = self.name().to_string();
        let specs = self.join_groupings(inputs, on)?;
        if specs.len() < 2 {
            return Err(InvalidOptionError::new(format!(
                "a join needs at least two inputs, got {}",
                specs.len()
            ))
            .with_stage(&stage)
            .into());
        }

        let mut resolved = Vec::with_capacity(specs.len());
        let mut groupings = Vec::with_capacity(specs.len());
        for (name, spec) in specs {
            let input = self.input(&name)?;
            let grouping = spec
                .resolve(input.scope.values_fields())
                .map_err(|e| AssemblyError::from_fields(&input.name, e))?;
            groupings.push(grouping);
            resolved.push(input);
        }
        options
            .joiner
            .check_inputs(resolved.len())
            .map_err(|e| AssemblyError::from(e).in_stage(&stage))?;

        let declared = match &options.declared_fields {
            Some(spec) => spec
                .normalize()
                .map_err(|e| AssemblyError::from_fields(&stage, e))?,
            None => FieldSet::dedup(
                resolved.iter().map(|i| i.scope.values_fields()),
                &self.flow().config().dedup_suffix,
            ),
        };
        let incoming: Vec<Scope> = resolved.iter().map(|i| i.scope.clone()).collect();
        let scope_refs: Vec<&Scope> = incoming.iter().collect();
        let scope = Scope::outgoing_co_group(&stage, &scope_refs, &groupings, &declared)?;

        let kind = PipeKind::CoGroup {
            groupings: groupings.clone(),
            declared: declared.clone(),
            joiner: options.joiner,
        };
        let tails = resolved.iter().map(|i| i.tail).collect();
        self.install(kind, tails, scope, None, false);

        if let Some(block) = block {
            self.aggregate_and_carry_first(block, &incoming, &groupings, Some(&declared))?;
        }
        Ok(self)
    }

    /// Runs a grouping block, then carries unambiguous fields forward.
    ///
    /// `declared`, when given, maps each input's fields positionally onto the
    /// joined output names.
    fn aggregate_and_carry_first<F>(
        &mut self,
        block: F,
        incoming: &[Scope],
        groupings: &[FieldSet],
        declared: Option<&FieldSet>,
    ) -> Result<(), AssemblyError>
    where
        F: FnOnce(&mut Aggregations<'_, '_>) -> Result<(), AssemblyError>,
    {
        block(&mut Aggregations::new(self))?;

        let candidates = first_candidates(incoming, groupings, declared);
        let unique = unique_candidates(self.name(), candidates);

        let aggregated = self.scope().grouping_fields().cloned().unwrap_or_default();
        let remaining: Vec<Field> = unique
            .into_iter()
            .filter(|f| !aggregated.contains(f))
            .collect();
        if remaining.is_empty() {
            warn!(stage = %self.name(), "no fields to carry forward with first");
        } else {
            let remaining = FieldSet::new(remaining)
                .map_err(|e| AssemblyError::from_fields(self.name(), e))?;
            info!(stage = %self.name(), fields = %remaining, "carrying fields forward with first");
            self.first(remaining)?;
        }

        if self.every_applied() {
            let canonical = groupings.first().cloned().unwrap_or_default();
            let scope = self.scope();
            let key = scope.grouping_key_fields().cloned().unwrap_or_default();
            let names: Vec<Field> = scope
                .values_fields()
                .iter()
                .map(|f| {
                    key.position_of(f)
                        .and_then(|i| canonical.get(i))
                        .unwrap_or(f)
                        .clone()
                })
                .collect();
            self.bind_names(names)?;
        }
        Ok(())
    }
}

/// Collects the fields of inputs whose primary key is covered by both their
/// grouping primary key and the key they were grouped on.
///
/// With `declared` of matching width, fields are reported under the joined
/// output names; otherwise under the input's own names.
fn first_candidates(
    incoming: &[Scope],
    groupings: &[FieldSet],
    declared: Option<&FieldSet>,
) -> Vec<Field> {
    let total: usize = incoming.iter().map(|s| s.values_fields().len()).sum();
    let declared = declared.filter(|d| d.len() == total);
    let mut candidates = Vec::new();
    let mut offset = 0;
    for (scope, grouping) in incoming.iter().zip(groupings) {
        let values = scope.values_fields();
        let safe = scope.primary_key_fields().filter(|key| {
            scope
                .grouping_primary_key_fields()
                .is_some_and(|snapshot| key.is_subset_of(snapshot))
                && key.is_subset_of(grouping)
        });
        if let Some(key) = safe {
            for field in values.difference(key).iter() {
                let output = declared
                    .zip(values.position_of(field))
                    .and_then(|(d, i)| d.get(offset + i))
                    .unwrap_or(field);
                candidates.push(output.clone());
            }
        }
        offset += values.len();
    }
    candidates
}

/// Drops repeated candidates, keeping first occurrences.
fn unique_candidates(stage: &str, candidates: Vec<Field>) -> Vec<Field> {
    let mut unique: Vec<Field> = Vec::with_capacity(candidates.len());
    for field in &candidates {
        if !unique.contains(field) {
            unique.push(field.clone());
        }
    }
    if unique.len() != candidates.len() {
        warn!(
            stage = %stage,
            fields = ?candidates,
            "first fields are not unique; duplicates dropped"
        );
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keyed(stage: &str, names: &[&str], key: &str) -> Scope {
        let values = FieldSet::new(names.iter().copied()).unwrap();
        Scope::new(stage, values)
            .with_primary_key(Some(&FieldSpec::from(key)))
            .unwrap()
    }

    #[test]
    fn test_first_candidates_repeated_names_deduplicated() {
        let incoming = [keyed("x", &["id", "name"], "id"), keyed("z", &["id", "name"], "id")];
        let groupings = [FieldSet::single("id"), FieldSet::single("id")];

        let candidates = first_candidates(&incoming, &groupings, None);
        assert_eq!(candidates, vec![Field::from("name"), Field::from("name")]);
        assert_eq!(unique_candidates("joined", candidates), vec![Field::from("name")]);
    }

    #[test]
    fn test_first_candidates_use_declared_names() {
        let incoming = [keyed("x", &["id", "name"], "id"), keyed("z", &["id", "name"], "id")];
        let groupings = [FieldSet::single("id"), FieldSet::single("id")];
        let declared = FieldSet::new(["id", "name", "id_", "name_"]).unwrap();

        let candidates = first_candidates(&incoming, &groupings, Some(&declared));
        assert_eq!(candidates, vec![Field::from("name"), Field::from("name_")]);
    }

    #[test]
    fn test_first_candidates_skip_wider_keys() {
        let incoming = [keyed("y", &["id", "type", "amount"], "id")];
        let wide = Scope::new("w", FieldSet::new(["id", "type"]).unwrap())
            .with_primary_key(Some(&FieldSpec::from(["id", "type"])))
            .unwrap();
        assert_eq!(
            first_candidates(&incoming, &[FieldSet::single("id")], None),
            vec![Field::from("type"), Field::from("amount")]
        );
        assert!(first_candidates(&[wide], &[FieldSet::single("id")], None).is_empty());
    }

    #[test]
    fn test_joiner_tokens() {
        assert_eq!("left".parse::<Joiner>().unwrap(), Joiner::Left);
        assert!("sideways".parse::<Joiner>().is_err());
    }

    #[test]
    fn test_joiner_from_json() {
        let mixed: Joiner = serde_json::from_str(r#"[true, 0, "outer", "inner", 1]"#).unwrap();
        assert_eq!(mixed, Joiner::mixed([true, false, false, true, true]));
        assert!(serde_json::from_str::<Joiner>(r#"[2]"#).is_err());
        assert!(serde_json::from_str::<Joiner>(r#"{"inner": true}"#).is_err());
        assert_eq!(serde_json::to_value(Joiner::Outer).unwrap(), serde_json::json!("outer"));
        assert_eq!(
            serde_json::to_value(Joiner::mixed([true, false])).unwrap(),
            serde_json::json!([true, false])
        );
    }

    #[test]
    fn test_mixed_length_checked() {
        assert!(Joiner::mixed([true]).check_inputs(2).is_err());
        assert!(Joiner::mixed([true, false]).check_inputs(2).is_ok());
        assert!(Joiner::Inner.check_inputs(5).is_ok());
    }

    #[test]
    fn test_join_options_deserialize() {
        let options: JoinOptions =
            serde_json::from_str(r#"{"declared_fields": ["a", "b"], "joiner": "left"}"#).unwrap();
        assert_eq!(options.joiner, Joiner::Left);
        assert_eq!(options.declared_fields, Some(FieldSpec::from(["a", "b"])));
        assert!(serde_json::from_str::<JoinOptions>(r#"{"join": "left"}"#).is_err());
        assert!(serde_json::from_str::<JoinOptions>(r#"{"joiner": "sideways"}"#).is_err());
    }

    #[test]
    fn test_group_by_options_deserialize() {
        let options: GroupByOptions =
            serde_json::from_str(r#"{"sort_by": "ts", "reverse": true}"#).unwrap();
        assert_eq!(options, GroupByOptions::default().with_sort_by("ts").with_reverse(true));
        assert!(serde_json::from_str::<GroupByOptions>(r#"{"order": 1}"#).is_err());
    }

    #[test]
    fn test_grouping_spec_forms() {
        assert_eq!(GroupingSpec::from("id"), GroupingSpec::Shared(FieldSpec::from("id")));
        let per_stage = GroupingSpec::per_stage([("b", "k2"), ("a", "k1")]);
        let GroupingSpec::PerStage(map) = per_stage else {
            panic!("expected per-stage grouping");
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
