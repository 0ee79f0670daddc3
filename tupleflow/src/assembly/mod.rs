//! Stage builders.
//!
//! This module provides:
//! - [`Assembly`]: the builder for one stage, passed to configuration closures
//! - [`Aggregations`]: the restricted builder available inside grouping blocks
//! - join, group-by and union composers with their option types
//!
//! Every operator validates its fields against the stage's current scope,
//! computes the complete outgoing scope, and only then appends a pipe and
//! installs the new scope. A failed operator leaves the stage untouched.

mod aggregations;
mod field_ops;
mod join;
mod row_ops;
mod union;


pub use aggregations::{Aggregations, NoAggregation};
pub use join::{GroupByOptions, GroupingSpec, JoinOptions, Joiner};
pub use row_ops::InsertValue;

use crate::errors::{AssemblyError, UnknownStageError};
use crate::fields::{FieldSpec, Selector};
use crate::flow::Flow;
use crate::graph::{PipeId, PipeKind};
use crate::operations::Operation;
use crate::scope::Scope;
use crate::tree::{StageId, StageKind};
use std::sync::Arc;
use tracing::{debug, info};

/// Builder for one stage of a flow.
///
/// Operators return `Result<&mut Self, _>` so calls chain with `?`:
///
/// ```rust,ignore
/// flow.assembly("orders", |a| {
///     a.primary("order_id")?
///         .project(["order_id", "cust_id", "amount"])?;
///     Ok(())
/// })?;
/// ```
#[derive(Debug)]
pub struct Assembly<'f> {
    flow: &'f mut Flow,
    id: StageId,
}

/// A stage referenced by a join or union.
#[derive(Debug, Clone)]
pub(crate) struct Input {
    pub(crate) name: String,
    pub(crate) scope: Scope,
    pub(crate) tail: PipeId,
}

impl<'f> Assembly<'f> {
    pub(crate) fn new(flow: &'f mut Flow, id: StageId) -> Self {
        Self { flow, id }
    }

    /// This stage's id.
    #[must_use]
    pub fn id(&self) -> StageId {
        self.id
    }

    /// This stage's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.flow.tree().name(self.id)
    }

    /// The enclosing flow.
    #[must_use]
    pub fn flow(&self) -> &Flow {
        &*self.flow
    }

    /// The current schema.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.flow.stage(self.id).scope
    }

    /// The stage's entry pipe.
    #[must_use]
    pub fn head(&self) -> Option<PipeId> {
        self.flow.stage(self.id).head
    }

    /// The stage's current exit pipe.
    #[must_use]
    pub fn tail(&self) -> Option<PipeId> {
        self.flow.stage(self.id).tail
    }

    /// Whether the most recent operator was an aggregation.
    #[must_use]
    pub fn every_applied(&self) -> bool {
        self.flow.stage(self.id).every_applied
    }

    fn tail_inputs(&self) -> Vec<PipeId> {
        self.tail().into_iter().collect()
    }

    fn install(
        &mut self,
        kind: PipeKind,
        inputs: Vec<PipeId>,
        scope: Scope,
        operation: Option<Arc<dyn Operation>>,
        every_applied: bool,
    ) -> PipeId {
        let stage = self.name().to_string();
        let pipe = self.flow.graph_mut().add(
            &stage,
            kind,
            inputs,
            scope.values_fields().clone(),
            operation,
        );
        if self.flow.config().debug_scopes {
            debug!(stage = %stage, pipe = %pipe, scope = %scope, "installed scope");
        }
        let state = self.flow.stage_mut(self.id);
        state.scope = scope;
        state.head.get_or_insert(pipe);
        state.tail = Some(pipe);
        state.every_applied = every_applied;
        pipe
    }

    fn set_scope(&mut self, scope: Scope) {
        self.flow.stage_mut(self.id).scope = scope;
    }

    pub(crate) fn input(&self, name: &str) -> Result<Input, AssemblyError> {
        let id = self.flow.resolve(self.id, name)?;
        let state = self.flow.stage(id);
        let tail = state
            .tail
            .ok_or_else(|| UnknownStageError::new(self.name(), name))?;
        Ok(Input {
            name: self.flow.tree().name(id).to_string(),
            scope: state.scope.clone(),
            tail,
        })
    }

    /// Applies a row-wise operation.
    ///
    /// `arguments` select the fields the operation reads; `output` selects
    /// what leaves the pipe (see [`Selector`]).
    pub fn each(
        &mut self,
        arguments: impl Into<Selector>,
        operation: Arc<dyn Operation>,
        output: impl Into<Selector>,
    ) -> Result<&mut Self, AssemblyError> {
        let output = output.into();
        let outgoing = self
            .scope()
            .outgoing_each(&arguments.into(), operation.as_ref(), &output)?;
        let kind = PipeKind::Each {
            arguments: outgoing.arguments,
            operation: operation.describe(),
            output,
        };
        let inputs = self.tail_inputs();
        self.install(kind, inputs, outgoing.scope, Some(operation), false);
        Ok(self)
    }

    /// Applies an aggregation over the current grouping.
    pub fn every(
        &mut self,
        arguments: impl Into<Selector>,
        operation: Arc<dyn Operation>,
        output: impl Into<Selector>,
    ) -> Result<&mut Self, AssemblyError> {
        let output = output.into();
        let outgoing = self
            .scope()
            .outgoing_every(&arguments.into(), operation.as_ref(), &output)?;
        let kind = PipeKind::Every {
            arguments: outgoing.arguments,
            operation: operation.describe(),
            output,
        };
        let inputs = self.tail_inputs();
        self.install(kind, inputs, outgoing.scope, Some(operation), true);
        Ok(self)
    }

    /// Declares or clears the primary key.
    ///
    /// The key must be a subset of the current output fields. It is also
    /// snapshotted as the grouping primary key.
    pub fn declare_primary(&mut self, key: Option<FieldSpec>) -> Result<&mut Self, AssemblyError> {
        let scope = self.scope().with_primary_key(key.as_ref())?;
        self.set_scope(scope);
        Ok(self)
    }

    /// Declares the primary key.
    pub fn primary(&mut self, key: impl Into<FieldSpec>) -> Result<&mut Self, AssemblyError> {
        self.declare_primary(Some(key.into()))
    }

    /// Clears the primary key and its grouping snapshot.
    pub fn clear_primary(&mut self) -> &mut Self {
        let scope = self.scope().without_primary_key();
        self.set_scope(scope);
        self
    }

    /// Declares a child stage starting from this stage's current output.
    pub fn branch<F>(&mut self, name: &str, build: F) -> Result<StageId, AssemblyError>
    where
        F: FnOnce(&mut Assembly<'_>) -> Result<(), AssemblyError>,
    {
        let scope = self.scope().copy_for(name);
        let id = self.flow.create_stage(
            self.id,
            name,
            StageKind::Branch,
            scope,
            Some(PipeKind::Head { source: None }),
        )?;
        self.flow.build(id, build)?;
        Ok(id)
    }

    /// Logs the current scope.
    pub fn debug_scope(&mut self) -> &mut Self {
        info!(stage = %self.name(), "current scope: {}", self.scope());
        self
    }
}
