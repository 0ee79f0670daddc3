//! Union composer.

use super::Assembly;
use crate::errors::AssemblyError;
use crate::graph::PipeKind;
use crate::scope::Scope;

impl Assembly<'_> {
    /// Merges stages with the same number of fields.
    ///
    /// Field names need not match; the output takes the first input's names.
    /// The merge groups on the first field of the first input only.
    pub fn union(&mut self, inputs: &[&str]) -> Result<&mut Self, AssemblyError> {
        let stage = self.name().to_string();
        let resolved = inputs
            .iter()
            .map(|name| self.input(name))
            .collect::<Result<Vec<_>, _>>()?;
        let scopes: Vec<&Scope> = resolved.iter().map(|i| &i.scope).collect();
        let scope = Scope::outgoing_union(&stage, &scopes)?;

        let kind = PipeKind::Union {
            grouping: scope.grouping_key_fields().cloned().unwrap_or_default(),
        };
        let tails = resolved.iter().map(|i| i.tail).collect();
        self.install(kind, tails, scope, None, false);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::AssemblyError;
    use crate::flow::Flow;
    use crate::testing::{assert_grouping_key, assert_values_fields};

    fn flow() -> Flow {
        let mut flow = Flow::new("f");
        flow.source("a", ["x", "y", "z"]).unwrap();
        flow.source("b", ["p", "q", "r"]).unwrap();
        flow.source("c", ["p", "q", "r", "s"]).unwrap();
        flow.assembly("a", |_| Ok(())).unwrap();
        flow.assembly("b", |_| Ok(())).unwrap();
        flow.assembly("c", |_| Ok(())).unwrap();
        flow
    }

    #[test]
    fn test_union_groups_on_first_field_only() {
        let mut flow = flow();
        flow.assembly("all", |u| {
            assert_eq!(u.head(), None);
            u.union(&["a", "b"])?;
            assert_eq!(u.head(), u.tail());
            Ok(())
        })
        .unwrap();
        assert_values_fields(&flow, "all", &["x", "y", "z"]);
        assert_grouping_key(&flow, "all", &["x"]);
    }

    #[test]
    fn test_union_width_mismatch() {
        let mut flow = flow();
        let err = flow
            .assembly("all", |u| {
                u.union(&["a", "c"])?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::IncompatibleSchema(_)));
    }

    #[test]
    fn test_union_unknown_or_empty() {
        let mut flow = flow();
        let err = flow
            .assembly("all", |u| {
                u.union(&["a", "nope"])?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::UnknownStage(ref e) if e.referenced == "nope"));

        let mut flow = self::flow();
        let err = flow
            .assembly("none", |u| {
                u.union(&[])?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidOption(_)));
    }

    #[test]
    fn test_union_edges() {
        let mut flow = flow();
        flow.assembly("all", |u| {
            u.union(&["a", "b"])?;
            Ok(())
        })
        .unwrap();
        let graph = flow.complete().unwrap();
        let union = graph.stage_nodes("all").last().unwrap();
        assert_eq!(union.inputs.len(), 2);
        assert_eq!(graph.consumers(union.inputs[0]).count(), 1);
    }
}
