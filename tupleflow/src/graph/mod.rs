//! The produced pipe graph.
//!
//! This module provides:
//! - [`PipeGraph`]: the assembled DAG of pipes with its metadata
//! - [`PipeNode`] and [`PipeKind`]: one pipe and what it does
//! - [`Edge`]: a connection carrying a field set
//! - topological ordering and cycle detection in [`validation`]

pub mod validation;

use crate::assembly::Joiner;
use crate::errors::CycleDetectedError;
use crate::fields::{FieldSet, Selector};
use crate::operations::{Operation, OperationSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Index of a pipe in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PipeId(usize);

impl PipeId {
    /// Returns the node index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipe#{}", self.0)
    }
}

/// What a pipe does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipeKind {
    /// Entry point of a stage.
    Head {
        /// The source feeding a top-level stage.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// A row-wise operator.
    Each {
        /// Resolved argument fields.
        arguments: FieldSet,
        /// The operation applied.
        operation: OperationSpec,
        /// The output selector as given.
        output: Selector,
    },
    /// An aggregation over the current grouping.
    Every {
        /// Resolved argument fields.
        arguments: FieldSet,
        /// The operation applied.
        operation: OperationSpec,
        /// The output selector as given.
        output: Selector,
    },
    /// Grouping of a single input.
    GroupBy {
        /// The grouping key.
        grouping: FieldSet,
        /// Secondary sort fields.
        sort: FieldSet,
        /// Whether the sort is descending.
        reverse: bool,
    },
    /// A grouped join of several inputs.
    CoGroup {
        /// One grouping key per input, in input order.
        groupings: Vec<FieldSet>,
        /// The output field names.
        declared: FieldSet,
        /// The join policy.
        joiner: Joiner,
    },
    /// Concatenation of same-width inputs.
    Union {
        /// The grouping key.
        grouping: FieldSet,
    },
}

impl PipeKind {
    /// A short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Head { .. } => "head",
            Self::Each { .. } => "each",
            Self::Every { .. } => "every",
            Self::GroupBy { .. } => "group_by",
            Self::CoGroup { .. } => "co_group",
            Self::Union { .. } => "union",
        }
    }
}

/// One pipe in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeNode {
    /// This pipe's index.
    pub id: PipeId,
    /// The stage that created the pipe.
    pub stage: String,
    /// What the pipe does.
    #[serde(flatten)]
    pub kind: PipeKind,
    /// Upstream pipes, in order.
    pub inputs: Vec<PipeId>,
    /// The fields leaving the pipe.
    pub fields: FieldSet,
    /// The operation handle as supplied, when there is one.
    #[serde(skip)]
    pub operation: Option<Arc<dyn Operation>>,
}

/// A connection between two pipes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Upstream pipe.
    pub from: PipeId,
    /// Downstream pipe.
    pub to: PipeId,
    /// Fields flowing along the edge.
    pub fields: FieldSet,
}

/// An assembled dataflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeGraph {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    nodes: Vec<PipeNode>,
    edges: Vec<Edge>,
}

impl PipeGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Appends a pipe fed by `inputs` and returns its id.
    pub(crate) fn add(
        &mut self,
        stage: &str,
        kind: PipeKind,
        inputs: Vec<PipeId>,
        fields: FieldSet,
        operation: Option<Arc<dyn Operation>>,
    ) -> PipeId {
        let id = PipeId(self.nodes.len());
        for from in &inputs {
            let carried = self
                .node(*from)
                .map(|n| n.fields.clone())
                .unwrap_or_default();
            self.edges.push(Edge {
                from: *from,
                to: id,
                fields: carried,
            });
        }
        self.nodes.push(PipeNode {
            id,
            stage: stage.to_string(),
            kind,
            inputs,
            fields,
            operation,
        });
        id
    }

    /// Unique id of this graph instance.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The flow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When assembly started.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// All pipes, in creation order.
    #[must_use]
    pub fn nodes(&self) -> &[PipeNode] {
        &self.nodes
    }

    /// All edges, in creation order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Number of pipes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no pipe was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a pipe.
    #[must_use]
    pub fn node(&self, id: PipeId) -> Option<&PipeNode> {
        self.nodes.get(id.0)
    }

    /// Pipes with no inputs.
    pub fn heads(&self) -> impl Iterator<Item = &PipeNode> {
        self.nodes.iter().filter(|n| n.inputs.is_empty())
    }

    /// Pipes nothing consumes.
    pub fn tails(&self) -> impl Iterator<Item = &PipeNode> {
        self.nodes
            .iter()
            .filter(move |n| !self.edges.iter().any(|e| e.from == n.id))
    }

    /// Pipes fed directly by `id`.
    pub fn consumers(&self, id: PipeId) -> impl Iterator<Item = &PipeNode> {
        self.edges
            .iter()
            .filter(move |e| e.from == id)
            .filter_map(move |e| self.node(e.to))
    }

    /// Pipes created by the named stage.
    pub fn stage_nodes<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a PipeNode> {
        self.nodes.iter().filter(move |n| n.stage == stage)
    }

    /// Orders pipes so every input precedes its consumers.
    pub fn topological_order(&self) -> Result<Vec<PipeId>, CycleDetectedError> {
        validation::topological_order(&self.nodes, &self.edges)
    }

    /// SHA-256 over the nodes and edges, independent of id and timestamp.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let body = serde_json::json!({ "nodes": self.nodes, "edges": self.edges });
        let json = serde_json::to_string(&body).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
