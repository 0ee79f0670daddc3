//! Top-level flow container.
//!
//! This module provides:
//! - [`Flow`]: owns the stage tree, the shared schema table and the graph
//! - [`FlowConfig`]: session settings
//!
//! Every stage's state lives in one arena indexed by [`StageId`]. Builders
//! borrow the flow mutably for the duration of their closure, so branch
//! evaluation is strictly nested and in source order.

mod config;

pub use config::FlowConfig;

use crate::assembly::Assembly;
use crate::errors::{AssemblyError, EmptyFlowError, InvalidFieldSpecError, UnknownStageError};
use crate::fields::{Field, FieldSet, FieldSpec};
use crate::graph::{PipeGraph, PipeId, PipeKind};
use crate::scope::Scope;
use crate::tree::{StageId, StageKind, StageTree};
use std::collections::BTreeMap;
use tracing::{debug, debug_span, info};

/// Per-stage assembly state.
#[derive(Debug, Clone)]
pub(crate) struct StageState {
    pub(crate) scope: Scope,
    pub(crate) head: Option<PipeId>,
    pub(crate) tail: Option<PipeId>,
    pub(crate) every_applied: bool,
}

/// A dataflow graph under construction.
#[derive(Debug)]
pub struct Flow {
    config: FlowConfig,
    tree: StageTree,
    states: Vec<StageState>,
    sources: BTreeMap<String, FieldSet>,
    graph: PipeGraph,
}

impl Flow {
    /// Creates a flow with default settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, FlowConfig::default())
    }

    /// Creates a flow with the given settings.
    #[must_use]
    pub fn with_config(name: impl Into<String>, config: FlowConfig) -> Self {
        let name = name.into();
        Self {
            config,
            tree: StageTree::new(name.clone()),
            states: vec![StageState {
                scope: Scope::empty(name.clone()),
                head: None,
                tail: None,
                every_applied: false,
            }],
            sources: BTreeMap::new(),
            graph: PipeGraph::new(name),
        }
    }

    /// The flow name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.tree.name(StageId::ROOT)
    }

    /// The session settings.
    #[must_use]
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// The stage tree.
    #[must_use]
    pub fn tree(&self) -> &StageTree {
        &self.tree
    }

    /// The graph built so far.
    #[must_use]
    pub fn graph(&self) -> &PipeGraph {
        &self.graph
    }

    /// Declares the fields of a named input.
    ///
    /// A top-level assembly of the same name starts from these fields.
    pub fn source(
        &mut self,
        name: impl Into<String>,
        fields: impl Into<FieldSpec>,
    ) -> Result<&mut Self, AssemblyError> {
        let name = name.into();
        let fields = fields
            .into()
            .normalize()
            .map_err(|e| AssemblyError::from_fields(&name, e))?;
        if let Some(pos) = fields.iter().find(|f| matches!(f, Field::Position(_))) {
            return Err(InvalidFieldSpecError::new(format!(
                "source '{name}' must declare field names, got position {pos}"
            ))
            .into());
        }
        debug!(source = %name, fields = %fields, "declared source");
        self.sources.insert(name, fields);
        Ok(self)
    }

    /// Declares a top-level assembly and runs `build` against it.
    pub fn assembly<F>(&mut self, name: &str, build: F) -> Result<StageId, AssemblyError>
    where
        F: FnOnce(&mut Assembly<'_>) -> Result<(), AssemblyError>,
    {
        let source = self.sources.get(name).cloned();
        let scope = source
            .clone()
            .map_or_else(|| Scope::empty(name), |fields| Scope::new(name, fields));
        let head_kind = source.map(|_| PipeKind::Head {
            source: Some(name.to_string()),
        });
        let id = self.create_stage(StageId::ROOT, name, StageKind::Assembly, scope, head_kind)?;
        self.build(id, build)?;
        Ok(id)
    }

    pub(crate) fn create_stage(
        &mut self,
        parent: StageId,
        name: &str,
        kind: StageKind,
        scope: Scope,
        head_kind: Option<PipeKind>,
    ) -> Result<StageId, AssemblyError> {
        let id = self.tree.create(parent, name, kind)?;
        let inputs: Vec<PipeId> = self.state(parent).and_then(|s| s.tail).into_iter().collect();
        let head = head_kind.map(|kind| {
            self.graph
                .add(name, kind, inputs, scope.values_fields().clone(), None)
        });
        match head {
            Some(pipe) => debug!(stage = %self.tree.path(id), pipe = %pipe, "created stage"),
            None => debug!(stage = %self.tree.path(id), "created stage without head"),
        }
        self.states.push(StageState {
            scope,
            head,
            tail: head,
            every_applied: false,
        });
        Ok(id)
    }

    pub(crate) fn build<F>(&mut self, id: StageId, build: F) -> Result<(), AssemblyError>
    where
        F: FnOnce(&mut Assembly<'_>) -> Result<(), AssemblyError>,
    {
        let span = debug_span!("assembly", stage = %self.tree.name(id));
        let _enter = span.enter();
        let mut assembly = Assembly::new(self, id);
        build(&mut assembly)
    }

    pub(crate) fn stage(&self, id: StageId) -> &StageState {
        &self.states[id.index()]
    }

    pub(crate) fn stage_mut(&mut self, id: StageId) -> &mut StageState {
        &mut self.states[id.index()]
    }

    pub(crate) fn state(&self, id: StageId) -> Option<&StageState> {
        self.states.get(id.index())
    }

    pub(crate) fn graph_mut(&mut self) -> &mut PipeGraph {
        &mut self.graph
    }

    /// Finds a stage by name anywhere in the flow.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<StageId> {
        self.tree.find(StageId::ROOT, name)
    }

    /// Finds a stage by name as seen from `from`, failing if absent.
    pub fn resolve(&self, from: StageId, name: &str) -> Result<StageId, AssemblyError> {
        self.tree
            .find(from, name)
            .filter(|id| *id != StageId::ROOT)
            .ok_or_else(|| UnknownStageError::new(self.tree.name(from), name).into())
    }

    /// The current scope of the named stage.
    #[must_use]
    pub fn scope(&self, name: &str) -> Option<&Scope> {
        self.find(name).and_then(|id| self.scope_of(id))
    }

    /// The current scope of a stage.
    #[must_use]
    pub fn scope_of(&self, id: StageId) -> Option<&Scope> {
        self.state(id).map(|s| &s.scope)
    }

    /// Whether the last operator applied to the stage was an aggregation.
    #[must_use]
    pub fn every_applied(&self, id: StageId) -> bool {
        self.state(id).is_some_and(|s| s.every_applied)
    }

    /// The current exit pipe of a stage.
    #[must_use]
    pub fn tail(&self, id: StageId) -> Option<PipeId> {
        self.state(id).and_then(|s| s.tail)
    }

    /// Validates and returns the assembled graph.
    pub fn complete(self) -> Result<PipeGraph, AssemblyError> {
        if self.tree.children(StageId::ROOT).is_empty() {
            return Err(EmptyFlowError::new(self.name()).into());
        }
        self.graph.topological_order()?;
        info!(
            flow = %self.name(),
            stages = self.tree.len() - 1,
            pipes = self.graph.len(),
            "flow assembled"
        );
        Ok(self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_source_seeds_assembly_scope() {
        let mut flow = Flow::new("f");
        flow.source("orders", ["order_id", "amount"]).unwrap();
        flow.assembly("orders", |_| Ok(())).unwrap();
        assert_eq!(
            flow.scope("orders").unwrap().values_fields().names(),
            vec!["order_id", "amount"]
        );
        let head = &flow.graph().nodes()[0];
        assert_eq!(head.kind, PipeKind::Head { source: Some("orders".into()) });
    }

    #[test]
    fn test_assembly_without_source_starts_empty() {
        let mut flow = Flow::new("f");
        flow.assembly("joined", |_| Ok(())).unwrap();
        assert!(flow.scope("joined").unwrap().values_fields().is_empty());
        assert!(flow.graph().is_empty());
        assert_eq!(flow.tail(flow.find("joined").unwrap()), None);
    }

    #[test]
    fn test_source_rejects_positions() {
        let mut flow = Flow::new("f");
        assert!(flow.source("s", 0).is_err());
        assert!(flow.source("s", ["a", "a"]).is_err());
    }

    #[test]
    fn test_duplicate_assembly_name() {
        let mut flow = Flow::new("f");
        flow.assembly("a", |_| Ok(())).unwrap();
        let err = flow.assembly("a", |_| Ok(())).unwrap_err();
        assert_eq!(err.code(), "ASSEMBLY-001-DUPLICATE_NAME");
    }

    #[test]
    fn test_resolve_unknown_stage() {
        let flow = Flow::new("f");
        let err = flow.resolve(StageId::ROOT, "missing").unwrap_err();
        assert!(matches!(err, AssemblyError::UnknownStage(_)));
        assert!(flow.resolve(StageId::ROOT, "f").is_err());
    }

    #[test]
    fn test_complete_empty_flow_fails() {
        let err = Flow::new("f").complete().unwrap_err();
        assert!(matches!(err, AssemblyError::EmptyFlow(_)));
    }

    #[test]
    fn test_complete_returns_graph() {
        let mut flow = Flow::new("f");
        flow.source("a", ["x"]).unwrap();
        flow.assembly("a", |_| Ok(())).unwrap();
        let graph = flow.complete().unwrap();
        assert_eq!(graph.name(), "f");
        assert_eq!(graph.len(), 1);
    }
}
