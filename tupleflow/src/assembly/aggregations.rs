//! Aggregation operators and the restricted grouping-block builder.

use super::Assembly;
use crate::errors::{AssemblyError, InvalidOperationError, UngroupedAggregationError};
use crate::fields::{FieldMapping, FieldType, Selector};
use crate::operations::{
    assert_group_size_equals, average_function, count_function, first_function, last_function,
    max_function, min_function, sum_function, AssertionLevel, Operation, OperationKind,
};
use crate::scope::Scope;
use std::sync::Arc;
use tracing::warn;

/// The type of an absent grouping block.
pub type NoAggregation = fn(&mut Aggregations<'_, '_>) -> Result<(), AssemblyError>;

impl Assembly<'_> {
    fn require_grouping(&self, operation: &str) -> Result<(), AssemblyError> {
        if self.scope().is_grouped() {
            Ok(())
        } else {
            Err(UngroupedAggregationError::new(self.name(), operation).into())
        }
    }

    fn composite_aggregator<F>(
        &mut self,
        function: &str,
        mapping: FieldMapping,
        make: F,
    ) -> Result<&mut Self, AssemblyError>
    where
        F: Fn(&str) -> Arc<dyn Operation>,
    {
        self.require_grouping(function)?;
        let scope = self.scope();
        let against = scope
            .grouped_values()
            .unwrap_or_else(|| scope.values_fields())
            .clone();
        let pairs = mapping
            .resolve(&against)
            .map_err(|e| AssemblyError::from_fields(self.name(), e))?;
        if pairs.is_empty() {
            warn!(
                stage = %self.name(),
                aggregator = function,
                "composite aggregator invoked on 0 fields; ignored"
            );
        }
        for (input, output) in pairs {
            self.every(input, make(&output.to_string()), Selector::All)?;
        }
        Ok(self)
    }

    /// Keeps the first value of each field per group.
    pub fn first(&mut self, fields: impl Into<FieldMapping>) -> Result<&mut Self, AssemblyError> {
        self.composite_aggregator("first", fields.into(), first_function)
    }

    /// Keeps the last value of each field per group.
    pub fn last(&mut self, fields: impl Into<FieldMapping>) -> Result<&mut Self, AssemblyError> {
        self.composite_aggregator("last", fields.into(), last_function)
    }

    /// Minimum of each field per group.
    pub fn min(&mut self, fields: impl Into<FieldMapping>) -> Result<&mut Self, AssemblyError> {
        self.composite_aggregator("min", fields.into(), min_function)
    }

    /// Maximum of each field per group.
    pub fn max(&mut self, fields: impl Into<FieldMapping>) -> Result<&mut Self, AssemblyError> {
        self.composite_aggregator("max", fields.into(), max_function)
    }

    /// Average of each field per group.
    pub fn average(&mut self, fields: impl Into<FieldMapping>) -> Result<&mut Self, AssemblyError> {
        self.composite_aggregator("average", fields.into(), average_function)
    }

    /// Sums each field per group as `ty`.
    pub fn sum(
        &mut self,
        fields: impl Into<FieldMapping>,
        ty: FieldType,
    ) -> Result<&mut Self, AssemblyError> {
        self.composite_aggregator("sum", fields.into(), |into| sum_function(into, ty))
    }

    /// Counts the tuples of each group into `name`, or `count`.
    pub fn count(&mut self, name: Option<&str>) -> Result<&mut Self, AssemblyError> {
        self.require_grouping("count")?;
        let key = self
            .scope()
            .grouping_key_fields()
            .cloned()
            .unwrap_or_default();
        self.every(&key, count_function(name.unwrap_or("count")), Selector::All)
    }

    /// Applies a group assertion.
    pub fn assert_group(&mut self, assertion: Arc<dyn Operation>) -> Result<&mut Self, AssemblyError> {
        if assertion.kind() != OperationKind::GroupAssertion {
            let err = InvalidOperationError::new(assertion.name(), "not a group assertion");
            return Err(AssemblyError::from(err).in_stage(self.name()));
        }
        self.every(Selector::All, assertion, Selector::All)
    }

    /// Asserts every group holds `size` tuples.
    pub fn assert_group_size_equals(
        &mut self,
        size: usize,
        level: AssertionLevel,
    ) -> Result<&mut Self, AssemblyError> {
        self.assert_group(assert_group_size_equals(size, level))
    }
}

/// Builder available inside a grouping block.
///
/// Only aggregation operators are reachable; row-wise operators cannot be
/// called on a group.
#[derive(Debug)]
pub struct Aggregations<'a, 'f> {
    assembly: &'a mut Assembly<'f>,
}

impl<'a, 'f> Aggregations<'a, 'f> {
    pub(crate) fn new(assembly: &'a mut Assembly<'f>) -> Self {
        Self { assembly }
    }

    /// The stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.assembly.name()
    }

    /// The current schema.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        self.assembly.scope()
    }

    /// See [`Assembly::every`].
    pub fn every(
        &mut self,
        arguments: impl Into<Selector>,
        operation: Arc<dyn Operation>,
        output: impl Into<Selector>,
    ) -> Result<&mut Self, AssemblyError> {
        self.assembly.every(arguments, operation, output)?;
        Ok(self)
    }

    /// See [`Assembly::first`].
    pub fn first(&mut self, fields: impl Into<FieldMapping>) -> Result<&mut Self, AssemblyError> {
        self.assembly.first(fields)?;
        Ok(self)
    }

    /// See [`Assembly::last`].
    pub fn last(&mut self, fields: impl Into<FieldMapping>) -> Result<&mut Self, AssemblyError> {
        self.assembly.last(fields)?;
        Ok(self)
    }

    /// See [`Assembly::min`].
    pub fn min(&mut self, fields: impl Into<FieldMapping>) -> Result<&mut Self, AssemblyError> {
        self.assembly.min(fields)?;
        Ok(self)
    }

    /// See [`Assembly::max`].
    pub fn max(&mut self, fields: impl Into<FieldMapping>) -> Result<&mut Self, AssemblyError> {
        self.assembly.max(fields)?;
        Ok(self)
    }

    /// See [`Assembly::average`].
    pub fn average(&mut self, fields: impl Into<FieldMapping>) -> Result<&mut Self, AssemblyError> {
        self.assembly.average(fields)?;
        Ok(self)
    }

    /// See [`Assembly::sum`].
    pub fn sum(
        &mut self,
        fields: impl Into<FieldMapping>,
        ty: FieldType,
    ) -> Result<&mut Self, AssemblyError> {
        self.assembly.sum(fields, ty)?;
        Ok(self)
    }

    /// See [`Assembly::count`].
    pub fn count(&mut self, name: Option<&str>) -> Result<&mut Self, AssemblyError> {
        self.assembly.count(name)?;
        Ok(self)
    }

    /// See [`Assembly::assert_group`].
    pub fn assert_group(&mut self, assertion: Arc<dyn Operation>) -> Result<&mut Self, AssemblyError> {
        self.assembly.assert_group(assertion)?;
        Ok(self)
    }

    /// See [`Assembly::assert_group_size_equals`].
    pub fn assert_group_size_equals(
        &mut self,
        size: usize,
        level: AssertionLevel,
    ) -> Result<&mut Self, AssemblyError> {
        self.assembly.assert_group_size_equals(size, level)?;
        Ok(self)
    }

    /// See [`Assembly::debug_scope`].
    pub fn debug_scope(&mut self) -> &mut Self {
        self.assembly.debug_scope();
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::assembly::GroupByOptions;
    use crate::errors::AssemblyError;
    use crate::fields::{FieldMapping, FieldType};
    use crate::flow::Flow;
    use crate::testing::assert_values_fields;

    fn grouped_flow() -> Flow {
        let mut flow = Flow::new("f");
        flow.source("sales", ["region", "item", "qty", "price"]).unwrap();
        flow
    }

    #[test]
    fn test_aggregation_without_grouping_fails() {
        let mut flow = grouped_flow();
        let err = flow
            .assembly("sales", |a| {
                a.count(None)?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::UngroupedAggregation(ref e) if e.operation == "count"));

        let mut flow = grouped_flow();
        let err = flow
            .assembly("sales", |a| {
                a.first("item")?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::UngroupedAggregation(_)));
    }

    #[test]
    fn test_group_by_block_aggregates() {
        let mut flow = grouped_flow();
        flow.assembly("sales", |a| {
            a.group_by_with("region", GroupByOptions::default(), |g| {
                g.count(None)?
                    .sum(FieldMapping::pairs([("qty", "total_qty")]), FieldType::Long)?
                    .max("price")?;
                Ok(())
            })?;
            assert!(!a.every_applied());
            Ok(())
        })
        .unwrap();
        assert_values_fields(&flow, "sales", &["region", "count", "total_qty", "price"]);

        let kinds: Vec<&str> = flow
            .graph()
            .stage_nodes("sales")
            .map(|n| n.kind.label())
            .collect();
        assert_eq!(kinds, vec!["head", "group_by", "every", "every", "every", "each"]);
    }

    #[test]
    fn test_composite_over_several_fields() {
        let mut flow = grouped_flow();
        flow.assembly("sales", |a| {
            a.group_by("region")?
                .min(["qty", "price"])?
                .average(FieldMapping::pairs([("price", "avg_price")]))?;
            Ok(())
        })
        .unwrap();
        assert_values_fields(&flow, "sales", &["region", "qty", "price", "avg_price"]);
    }

    #[test]
    fn test_empty_composite_is_noop() {
        let mut flow = grouped_flow();
        flow.assembly("sales", |a| {
            a.group_by("region")?.last(Vec::<String>::new())?;
            assert!(!a.every_applied());
            Ok(())
        })
        .unwrap();
        assert_values_fields(&flow, "sales", &["region", "item", "qty", "price"]);
    }

    #[test]
    fn test_row_operator_ends_grouping() {
        let mut flow = grouped_flow();
        let err = flow
            .assembly("sales", |a| {
                a.group_by("region")?.count(None)?.pass()?.count(None)?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::UngroupedAggregation(_)));
    }

    #[test]
    fn test_assert_group_keeps_fields() {
        let mut flow = grouped_flow();
        flow.assembly("sales", |a| {
            a.group_by("region")?
                .assert_group_size_equals(3, crate::operations::AssertionLevel::Valid)?
                .count(Some("n"))?;
            Ok(())
        })
        .unwrap();
        assert_values_fields(&flow, "sales", &["region", "n"]);
    }
}
