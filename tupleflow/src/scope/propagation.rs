//! Outgoing scope computation.
//!
//! One function per operator shape. Each takes the incoming scope(s) and the
//! already-normalized operator inputs, and returns the resolved argument
//! fields together with the complete outgoing scope. Nothing here mutates
//! state; an error leaves the caller's scope table untouched.
//!
//! Key carry-over rules:
//! - the primary key survives only while all of its fields are still output
//! - any row-wise operator ends the grouping
//! - joins and multi-input unions drop the primary key

use super::Scope;
use crate::errors::{
    AssemblyError, IncompatibleSchemaError, InvalidOperationError, InvalidOptionError,
    UngroupedAggregationError,
};
use crate::fields::{Field, FieldSet, Selector};
use crate::operations::{Operation, OperationKind};

/// The argument fields and outgoing scope of a pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// Arguments resolved to names.
    pub arguments: FieldSet,
    /// The schema after the pipe.
    pub scope: Scope,
}

fn fields_err(stage: &str) -> impl Fn(crate::fields::FieldSetError) -> AssemblyError + '_ {
    move |e| AssemblyError::from_fields(stage, e)
}

fn resolve_arguments(stage: &str, selector: &Selector, against: &FieldSet) -> Result<FieldSet, AssemblyError> {
    match selector {
        Selector::All => Ok(against.clone()),
        Selector::Fields(spec) => spec.resolve(against).map_err(fields_err(stage)),
        other => Err(InvalidOptionError::new(format!(
            "{other:?} cannot select arguments; use all or a field list"
        ))
        .with_stage(stage)
        .into()),
    }
}

fn carried_primary_key(incoming: &Scope, output: &FieldSet) -> Option<FieldSet> {
    incoming
        .primary_key_fields
        .as_ref()
        .filter(|key| key.is_subset_of(output))
        .cloned()
}

/// Applies a row-wise output selector.
fn select_row_output(
    stage: &str,
    incoming: &FieldSet,
    arguments: &FieldSet,
    results: &FieldSet,
    selector: &Selector,
) -> Result<FieldSet, AssemblyError> {
    match selector {
        Selector::All => incoming.append(results).map_err(fields_err(stage)),
        Selector::Results => Ok(results.clone()),
        Selector::Args => Ok(arguments.clone()),
        Selector::Replace => {
            if results.len() != arguments.len() {
                return Err(IncompatibleSchemaError::new(
                    stage,
                    format!(
                        "replace needs one result per argument, got {} for {}",
                        results,
                        arguments
                    ),
                )
                .into());
            }
            FieldSet::new(incoming.iter().map(|field| {
                arguments
                    .position_of(field)
                    .and_then(|i| results.get(i))
                    .unwrap_or(field)
                    .clone()
            }))
            .map_err(fields_err(stage))
        }
        Selector::Swap => incoming
            .difference(arguments)
            .append(results)
            .map_err(fields_err(stage)),
        Selector::Fields(spec) => spec
            .resolve(&incoming.union(results))
            .map_err(fields_err(stage)),
    }
}

fn named(stage: &str, fields: &FieldSet) -> Result<(), AssemblyError> {
    match fields.iter().find(|f| matches!(f, Field::Position(_))) {
        Some(field) => Err(IncompatibleSchemaError::new(
            stage,
            format!("declared fields must be names, got position {field}"),
        )
        .into()),
        None => Ok(()),
    }
}

impl Scope {
    /// Computes the scope after a row-wise operator.
    pub fn outgoing_each(
        &self,
        arguments: &Selector,
        operation: &dyn Operation,
        output: &Selector,
    ) -> Result<Outgoing, AssemblyError> {
        let stage = self.stage.as_str();
        let kind = operation.kind();
        if !kind.is_row_wise() {
            let err = InvalidOperationError::new(
                operation.name(),
                format!("{kind} operations must be applied with every"),
            );
            return Err(AssemblyError::from(err).in_stage(stage));
        }

        let arguments = resolve_arguments(stage, arguments, &self.values_fields)?;
        let declared = operation.declared_fields().cloned().unwrap_or_default();
        named(stage, &declared)?;

        let values = if kind.preserves_schema() {
            self.values_fields.clone()
        } else {
            let results = match kind {
                OperationKind::Identity if declared.is_empty() => arguments.clone(),
                OperationKind::Identity => {
                    if declared.len() != arguments.len() {
                        return Err(IncompatibleSchemaError::new(
                            stage,
                            format!("cannot pass {arguments} through as {declared}"),
                        )
                        .into());
                    }
                    declared
                }
                _ => declared,
            };
            select_row_output(stage, &self.values_fields, &arguments, &results, output)?
        };

        let primary_key_fields = carried_primary_key(self, &values);
        let grouping_primary_key_fields = primary_key_fields
            .as_ref()
            .and(self.grouping_primary_key_fields.clone());
        Ok(Outgoing {
            arguments,
            scope: Scope {
                stage: self.stage.clone(),
                values_fields: values,
                primary_key_fields,
                grouping_key_fields: None,
                grouping_primary_key_fields,
                grouping_fields: None,
                grouped_values: None,
            },
        })
    }

    /// Computes the scope after an aggregation.
    pub fn outgoing_every(
        &self,
        arguments: &Selector,
        operation: &dyn Operation,
        output: &Selector,
    ) -> Result<Outgoing, AssemblyError> {
        let stage = self.stage.as_str();
        let kind = operation.kind();
        if !kind.is_aggregation() {
            let err = InvalidOperationError::new(
                operation.name(),
                format!("{kind} operations must be applied with each"),
            );
            return Err(AssemblyError::from(err).in_stage(stage));
        }
        let key = self
            .grouping_key_fields
            .clone()
            .ok_or_else(|| UngroupedAggregationError::new(stage, operation.name()))?;
        let grouped_values = self
            .grouped_values
            .clone()
            .unwrap_or_else(|| self.values_fields.clone());

        let arguments = resolve_arguments(stage, arguments, &grouped_values)?;
        let running = self.grouping_fields.clone().unwrap_or_else(|| key.clone());

        let values = if kind.preserves_schema() {
            running
        } else {
            let results = operation.declared_fields().cloned().unwrap_or_default();
            named(stage, &results)?;
            match output {
                Selector::All => running.append(&results).map_err(fields_err(stage))?,
                Selector::Results => results,
                Selector::Fields(spec) => spec
                    .resolve(&running.union(&results))
                    .map_err(fields_err(stage))?,
                other => {
                    return Err(InvalidOptionError::new(format!(
                        "{other:?} is not a valid aggregation output; use all, results or a field list"
                    ))
                    .with_stage(stage)
                    .into())
                }
            }
        };

        Ok(Outgoing {
            arguments,
            scope: Scope {
                stage: self.stage.clone(),
                primary_key_fields: carried_primary_key(self, &values),
                grouping_key_fields: Some(key),
                grouping_primary_key_fields: self.grouping_primary_key_fields.clone(),
                grouping_fields: Some(values.clone()),
                grouped_values: Some(grouped_values),
                values_fields: values,
            },
        })
    }

    /// Computes the scope after grouping on already-resolved fields.
    #[must_use]
    pub fn outgoing_group_by(&self, grouping: &FieldSet) -> Scope {
        Scope {
            stage: self.stage.clone(),
            values_fields: self.values_fields.clone(),
            primary_key_fields: self.primary_key_fields.clone(),
            grouping_key_fields: Some(grouping.clone()),
            grouping_primary_key_fields: self.primary_key_fields.clone(),
            grouping_fields: Some(grouping.clone()),
            grouped_values: Some(self.values_fields.clone()),
        }
    }

    /// Computes the scope of a join stage.
    ///
    /// `groupings[i]` must already be resolved against `inputs[i]`. The
    /// outgoing grouping key is the first input's key, named as in `declared`.
    pub fn outgoing_co_group(
        stage: &str,
        inputs: &[&Scope],
        groupings: &[FieldSet],
        declared: &FieldSet,
    ) -> Result<Scope, AssemblyError> {
        let (Some(first), Some(first_key)) = (inputs.first(), groupings.first()) else {
            return Err(InvalidOptionError::new("a join needs at least two inputs")
                .with_stage(stage)
                .into());
        };
        if let Some(mismatch) = groupings.iter().find(|g| g.len() != first_key.len()) {
            return Err(IncompatibleSchemaError::new(
                stage,
                format!("grouping keys differ in width: {first_key} and {mismatch}"),
            )
            .into());
        }
        let width: usize = inputs.iter().map(|s| s.values_fields.len()).sum();
        if declared.len() != width {
            return Err(IncompatibleSchemaError::new(
                stage,
                format!(
                    "declared fields {declared} must name all {width} incoming fields"
                ),
            )
            .into());
        }
        named(stage, declared)?;

        let key = FieldSet::new(
            first_key
                .iter()
                .filter_map(|f| first.values_fields.position_of(f))
                .filter_map(|i| declared.get(i))
                .cloned(),
        )
        .map_err(fields_err(stage))?;

        Ok(Scope {
            stage: stage.to_string(),
            values_fields: declared.clone(),
            primary_key_fields: None,
            grouping_key_fields: Some(key.clone()),
            grouping_primary_key_fields: None,
            grouping_fields: Some(key),
            grouped_values: Some(declared.clone()),
        })
    }

    /// Computes the scope of a union stage.
    ///
    /// The grouping is the first field of the first input.
    pub fn outgoing_union(stage: &str, inputs: &[&Scope]) -> Result<Scope, AssemblyError> {
        let Some(first) = inputs.first() else {
            return Err(InvalidOptionError::new("a union needs at least one input")
                .with_stage(stage)
                .into());
        };
        if let Some(other) = inputs
            .iter()
            .find(|s| s.values_fields.len() != first.values_fields.len())
        {
            return Err(IncompatibleSchemaError::new(
                stage,
                format!(
                    "cannot union {} ({}) with {} ({})",
                    first.stage, first.values_fields, other.stage, other.values_fields
                ),
            )
            .into());
        }
        let Some(head) = first.values_fields.get(0) else {
            return Err(IncompatibleSchemaError::new(stage, "cannot union inputs with no fields").into());
        };
        let grouping = FieldSet::single(head.clone());
        let single = inputs.len() == 1;

        Ok(Scope {
            stage: stage.to_string(),
            values_fields: first.values_fields.clone(),
            primary_key_fields: first.primary_key_fields.clone().filter(|_| single),
            grouping_key_fields: Some(grouping.clone()),
            grouping_primary_key_fields: first.grouping_primary_key_fields.clone().filter(|_| single),
            grouping_fields: Some(grouping),
            grouped_values: Some(first.values_fields.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{
        count_function, expression_filter, first_function, identity, identity_as,
        insert_function, Expr, OperationSpec,
    };
    use pretty_assertions::assert_eq;

    fn fields(names: &[&str]) -> FieldSet {
        FieldSet::new(names.iter().copied()).unwrap()
    }

    fn keyed(stage: &str, names: &[&str], key: &str) -> Scope {
        Scope::new(stage, fields(names))
            .with_primary_key(Some(&key.into()))
            .unwrap()
    }

    #[test]
    fn test_each_function_appends_results() {
        let scope = keyed("s", &["a", "b"], "a");
        let op = insert_function("c", serde_json::json!(1));
        let out = scope
            .outgoing_each(&Selector::All, op.as_ref(), &Selector::All)
            .unwrap();
        assert_eq!(out.scope.values_fields().names(), vec!["a", "b", "c"]);
        assert_eq!(out.scope.primary_key_fields(), Some(&fields(&["a"])));
    }

    #[test]
    fn test_each_collision_fails() {
        let scope = Scope::new("s", fields(&["a", "b"]));
        let op = identity();
        let err = scope
            .outgoing_each(&"a".into(), op.as_ref(), &Selector::All)
            .unwrap_err();
        assert!(matches!(err, AssemblyError::FieldCollision(_)));
    }

    #[test]
    fn test_each_filter_keeps_schema() {
        let scope = keyed("s", &["a", "b"], "b");
        let op = expression_filter(&Expr::parse("$a > 0").unwrap());
        let out = scope
            .outgoing_each(&"a".into(), op.as_ref(), &Selector::Results)
            .unwrap();
        assert_eq!(out.scope.values_fields(), scope.values_fields());
        assert_eq!(out.scope.primary_key_fields(), scope.primary_key_fields());
        assert_eq!(out.arguments, fields(&["a"]));
    }

    #[test]
    fn test_each_drops_key_when_projected_away() {
        let scope = keyed("s", &["a", "b"], "a");
        let op = identity();
        let out = scope
            .outgoing_each(&"b".into(), op.as_ref(), &Selector::Results)
            .unwrap();
        assert_eq!(out.scope.values_fields().names(), vec!["b"]);
        assert!(out.scope.primary_key_fields().is_none());
        assert!(out.scope.grouping_primary_key_fields().is_none());
    }

    #[test]
    fn test_each_replace_and_swap() {
        let scope = Scope::new("s", fields(&["a", "b", "c"]));
        let rename = identity_as(fields(&["x"]));
        let replaced = scope
            .outgoing_each(&"b".into(), rename.as_ref(), &Selector::Replace)
            .unwrap();
        assert_eq!(replaced.scope.values_fields().names(), vec!["a", "x", "c"]);

        let swapped = scope
            .outgoing_each(&"b".into(), rename.as_ref(), &Selector::Swap)
            .unwrap();
        assert_eq!(swapped.scope.values_fields().names(), vec!["a", "c", "x"]);
    }

    #[test]
    fn test_each_identity_width_mismatch() {
        let scope = Scope::new("s", fields(&["a", "b"]));
        let op = identity_as(fields(&["x"]));
        let err = scope
            .outgoing_each(&Selector::All, op.as_ref(), &Selector::Results)
            .unwrap_err();
        assert!(matches!(err, AssemblyError::IncompatibleSchema(_)));
    }

    #[test]
    fn test_each_rejects_aggregator() {
        let scope = Scope::new("s", fields(&["a"]));
        let op = count_function("n");
        let err = scope
            .outgoing_each(&Selector::All, op.as_ref(), &Selector::All)
            .unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidOperation(_)));
    }

    #[test]
    fn test_every_requires_grouping() {
        let scope = Scope::new("s", fields(&["a"]));
        let op = count_function("n");
        let err = scope
            .outgoing_every(&Selector::All, op.as_ref(), &Selector::All)
            .unwrap_err();
        assert!(matches!(err, AssemblyError::UngroupedAggregation(_)));
    }

    #[test]
    fn test_every_accumulates_grouping_fields() {
        let grouped = Scope::new("s", fields(&["k", "v"])).outgoing_group_by(&fields(&["k"]));
        let count = count_function("n");
        let after_count = grouped
            .outgoing_every(&"k".into(), count.as_ref(), &Selector::All)
            .unwrap()
            .scope;
        assert_eq!(after_count.values_fields().names(), vec!["k", "n"]);

        let first = first_function("v");
        let after_first = after_count
            .outgoing_every(&"v".into(), first.as_ref(), &Selector::All)
            .unwrap()
            .scope;
        assert_eq!(after_first.values_fields().names(), vec!["k", "n", "v"]);
        assert_eq!(after_first.grouping_fields(), Some(after_first.values_fields()));
        assert_eq!(after_first.grouping_key_fields(), Some(&fields(&["k"])));
    }

    #[test]
    fn test_every_arguments_resolve_against_tuple_values() {
        let grouped = Scope::new("s", fields(&["k", "v"])).outgoing_group_by(&fields(&["k"]));
        let op = first_function("w");
        let out = grouped
            .outgoing_every(&"v".into(), op.as_ref(), &Selector::All)
            .unwrap();
        assert_eq!(out.arguments, fields(&["v"]));
    }

    #[test]
    fn test_group_by_snapshots_primary_key() {
        let scope = keyed("s", &["k", "v"], "k").outgoing_group_by(&fields(&["k"]));
        assert_eq!(scope.grouping_primary_key_fields(), Some(&fields(&["k"])));
        assert_eq!(scope.values_fields().names(), vec!["k", "v"]);
    }

    #[test]
    fn test_co_group_maps_left_key() {
        let left = Scope::new("l", fields(&["id", "x"]));
        let right = Scope::new("r", fields(&["id", "y"]));
        let declared = FieldSet::dedup([left.values_fields(), right.values_fields()], "_");
        let scope = Scope::outgoing_co_group(
            "j",
            &[&left, &right],
            &[fields(&["id"]), fields(&["id"])],
            &declared,
        )
        .unwrap();
        assert_eq!(scope.values_fields().names(), vec!["id", "x", "id_", "y"]);
        assert_eq!(scope.grouping_key_fields(), Some(&fields(&["id"])));
        assert!(scope.primary_key_fields().is_none());
    }

    #[test]
    fn test_co_group_key_width_mismatch() {
        let left = Scope::new("l", fields(&["a", "b"]));
        let right = Scope::new("r", fields(&["c", "d"]));
        let err = Scope::outgoing_co_group(
            "j",
            &[&left, &right],
            &[fields(&["a", "b"]), fields(&["c"])],
            &fields(&["a", "b", "c", "d"]),
        )
        .unwrap_err();
        assert!(matches!(err, AssemblyError::IncompatibleSchema(_)));
    }

    #[test]
    fn test_union_groups_on_first_field() {
        let a = keyed("a", &["x", "y"], "x");
        let b = Scope::new("b", fields(&["p", "q"]));
        let scope = Scope::outgoing_union("u", &[&a, &b]).unwrap();
        assert_eq!(scope.values_fields().names(), vec!["x", "y"]);
        assert_eq!(scope.grouping_key_fields(), Some(&fields(&["x"])));
        assert!(scope.primary_key_fields().is_none());

        let single = Scope::outgoing_union("u", &[&a]).unwrap();
        assert_eq!(single.primary_key_fields(), Some(&fields(&["x"])));
    }

    #[test]
    fn test_union_width_mismatch() {
        let a = Scope::new("a", fields(&["x", "y", "z"]));
        let b = Scope::new("b", fields(&["p", "q", "r", "s"]));
        let err = Scope::outgoing_union("u", &[&a, &b]).unwrap_err();
        assert!(matches!(err, AssemblyError::IncompatibleSchema(_)));
    }

    #[test]
    fn test_declared_positions_rejected() {
        let scope = Scope::new("s", fields(&["a"]));
        let op = OperationSpec::new("f", OperationKind::Function)
            .with_declared_fields(FieldSet::new([0]).unwrap());
        assert!(scope
            .outgoing_each(&Selector::All, &op, &Selector::All)
            .is_err());
    }
}
