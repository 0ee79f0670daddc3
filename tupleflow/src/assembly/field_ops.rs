//! Field-algebra operators.
//!
//! All of these are identity pipes; they differ only in which fields they
//! select and what they call them.

use super::Assembly;
use crate::errors::{AssemblyError, InvalidRenameError};
use crate::fields::{FieldSet, FieldSpec, FieldType, Selector};
use crate::graph::PipeKind;
use crate::operations::{identity, identity_as, identity_cast};
use std::collections::BTreeMap;

impl Assembly<'_> {
    pub(super) fn field_set(&self, spec: impl Into<FieldSpec>) -> Result<FieldSet, AssemblyError> {
        spec.into()
            .normalize()
            .map_err(|e| AssemblyError::from_fields(self.name(), e))
    }

    /// Keeps only the given fields, in the given order.
    pub fn project(&mut self, fields: impl Into<FieldSpec>) -> Result<&mut Self, AssemblyError> {
        self.each(Selector::Fields(fields.into()), identity(), Selector::Results)
    }

    /// Removes the given fields.
    pub fn discard(&mut self, fields: impl Into<FieldSpec>) -> Result<&mut Self, AssemblyError> {
        let values = self.scope().values_fields().clone();
        let dropped = fields
            .into()
            .resolve(&values)
            .map_err(|e| AssemblyError::from_fields(self.name(), e))?;
        self.project(values.difference(&dropped))
    }

    /// Renames fields, keeping their positions.
    ///
    /// A primary key is re-declared under the new names in the same step.
    pub fn rename<I, K, V>(&mut self, mapping: I) -> Result<&mut Self, AssemblyError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mapping: BTreeMap<String, String> = mapping
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let scope = self.scope();
        let unknown: Vec<String> = mapping
            .keys()
            .filter(|name| !scope.values_fields().contains_name(name))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(InvalidRenameError::new(self.name(), unknown).into());
        }

        let to_err = |e| AssemblyError::from_fields(scope.stage(), e);
        let renamed = scope.values_fields().rename(&mapping).map_err(to_err)?;
        let key = scope
            .primary_key_fields()
            .map(|k| k.rename(&mapping))
            .transpose()
            .map_err(to_err)?;

        let operation = identity_as(renamed);
        let outgoing = scope.outgoing_each(&Selector::All, operation.as_ref(), &Selector::Results)?;
        let key_spec = key.map(FieldSpec::from);
        let scope = outgoing.scope.with_primary_key(key_spec.as_ref())?;

        let kind = PipeKind::Each {
            arguments: outgoing.arguments,
            operation: operation.describe(),
            output: Selector::Results,
        };
        let inputs = self.tail_inputs();
        self.install(kind, inputs, scope, Some(operation), false);
        Ok(self)
    }

    /// Assigns new names to the fields, positionally.
    pub fn bind_names(&mut self, names: impl Into<FieldSpec>) -> Result<&mut Self, AssemblyError> {
        let names = self.field_set(names)?;
        self.each(Selector::All, identity_as(names), Selector::Results)
    }

    /// Coerces fields to new types, keeping names and positions.
    pub fn cast<I, K>(&mut self, types: I) -> Result<&mut Self, AssemblyError>
    where
        I: IntoIterator<Item = (K, FieldType)>,
        K: Into<String>,
    {
        let types: BTreeMap<String, FieldType> =
            types.into_iter().map(|(k, t)| (k.into(), t)).collect();
        let fields = self.field_set(types.keys().cloned().collect::<Vec<_>>())?;
        let kinds: Vec<FieldType> = types.values().copied().collect();
        self.each(&fields, identity_cast(fields.clone(), &kinds), Selector::Replace)
    }

    /// Copies `from` into new fields named `into`, keeping the originals.
    pub fn copy(
        &mut self,
        from: impl Into<Selector>,
        into: impl Into<FieldSpec>,
    ) -> Result<&mut Self, AssemblyError> {
        let into = self.field_set(into)?;
        self.each(from, identity_as(into), Selector::All)
    }

    /// A pipe that changes nothing.
    pub fn pass(&mut self) -> Result<&mut Self, AssemblyError> {
        self.each(Selector::All, identity(), Selector::Results)
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::AssemblyError;
    use crate::fields::FieldType;
    use crate::flow::Flow;
    use pretty_assertions::assert_eq;

    fn flow() -> Flow {
        let mut flow = Flow::new("f");
        flow.source("s", ["id", "name", "score"]).unwrap();
        flow
    }

    fn values(flow: &Flow, stage: &str) -> Vec<String> {
        flow.scope(stage).unwrap().values_fields().names()
    }

    #[test]
    fn test_project_and_discard() {
        let mut flow = flow();
        flow.assembly("s", |a| {
            a.project(["score", "id"])?;
            a.branch("b", |b| {
                b.discard("score")?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
        assert_eq!(values(&flow, "s"), vec!["score", "id"]);
        assert_eq!(values(&flow, "b"), vec!["id"]);
    }

    #[test]
    fn test_project_unknown_field() {
        let mut flow = flow();
        let err = flow
            .assembly("s", |a| {
                a.project(["id", "nope"])?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::UnknownField(ref e) if e.fields == vec!["nope"]));
        assert_eq!(values(&flow, "s"), vec!["id", "name", "score"]);
    }

    #[test]
    fn test_rename_carries_primary_key() {
        let mut flow = flow();
        flow.assembly("s", |a| {
            a.primary("id")?.rename([("id", "key")])?;
            Ok(())
        })
        .unwrap();
        let scope = flow.scope("s").unwrap();
        assert_eq!(scope.values_fields().names(), vec!["key", "name", "score"]);
        assert_eq!(scope.primary_key_fields().unwrap().names(), vec!["key"]);
        assert_eq!(scope.grouping_primary_key_fields().unwrap().names(), vec!["key"]);
    }

    #[test]
    fn test_rename_round_trip_restores_scope() {
        let mut flow = flow();
        flow.assembly("s", |a| {
            a.primary(["id", "name"])?;
            let before = a.scope().clone();
            a.rename([("id", "a"), ("name", "b")])?
                .rename([("a", "id"), ("b", "name")])?;
            assert_eq!(a.scope().values_fields(), before.values_fields());
            assert_eq!(a.scope().primary_key_fields(), before.primary_key_fields());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_rename_errors() {
        let mut flow = flow();
        let err = flow
            .assembly("s", |a| {
                a.rename([("missing", "x")])?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidRename(ref e) if e.names == vec!["missing"]));

        let mut flow = self::flow();
        let err = flow
            .assembly("s", |a| {
                a.rename([("id", "name")])?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::FieldCollision(_)));
    }

    #[test]
    fn test_bind_names_cast_copy_pass() {
        let mut flow = flow();
        flow.assembly("s", |a| {
            a.bind_names(["a", "b", "c"])?
                .cast([("c", FieldType::Double)])?
                .copy("a", "a_copy")?
                .pass()?;
            Ok(())
        })
        .unwrap();
        assert_eq!(values(&flow, "s"), vec!["a", "b", "c", "a_copy"]);
    }

    #[test]
    fn test_bind_names_width_mismatch() {
        let mut flow = flow();
        let err = flow
            .assembly("s", |a| {
                a.bind_names(["a", "b"])?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::IncompatibleSchema(_)));
    }
}
