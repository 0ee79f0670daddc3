//! The stage tree.
//!
//! Stages live in an arena indexed by [`StageId`]. The tree only grows
//! during assembly; names are unique among siblings and lookups walk the
//! ancestor chain before falling back to the whole tree.

use crate::errors::DuplicateNameError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Index of a stage in its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageId(usize);

impl StageId {
    /// The root stage.
    pub const ROOT: Self = Self(0);

    /// Returns the arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

/// What a stage was declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// The tree root.
    Flow,
    /// A top-level assembly.
    Assembly,
    /// A branch nested in an assembly.
    Branch,
}

#[derive(Debug, Clone)]
struct StageNode {
    name: String,
    kind: StageKind,
    parent: Option<StageId>,
    children: Vec<StageId>,
}

/// Arena of stages.
#[derive(Debug, Clone)]
pub struct StageTree {
    nodes: Vec<StageNode>,
}

impl StageTree {
    /// Creates a tree holding only the root.
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            nodes: vec![StageNode {
                name: root.into(),
                kind: StageKind::Flow,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Adds a child under `parent`.
    pub fn create(
        &mut self,
        parent: StageId,
        name: &str,
        kind: StageKind,
    ) -> Result<StageId, DuplicateNameError> {
        if self.child(parent, name).is_some() {
            return Err(DuplicateNameError::new(name, self.name(parent)));
        }
        let id = StageId(self.nodes.len());
        self.nodes.push(StageNode {
            name: name.to_string(),
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Number of stages, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; the root exists from creation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The stage's name.
    #[must_use]
    pub fn name(&self, id: StageId) -> &str {
        &self.nodes[id.0].name
    }

    /// How the stage was declared.
    #[must_use]
    pub fn kind(&self, id: StageId) -> StageKind {
        self.nodes[id.0].kind
    }

    /// The enclosing stage; `None` for the root.
    #[must_use]
    pub fn parent(&self, id: StageId) -> Option<StageId> {
        self.nodes[id.0].parent
    }

    /// Direct children in declaration order.
    #[must_use]
    pub fn children(&self, id: StageId) -> &[StageId] {
        &self.nodes[id.0].children
    }

    /// The named direct child of `parent`.
    #[must_use]
    pub fn child(&self, parent: StageId, name: &str) -> Option<StageId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.name(*c) == name)
    }

    /// `id` followed by its ancestors up to the root.
    pub fn ancestors(&self, id: StageId) -> impl Iterator<Item = StageId> + '_ {
        std::iter::successors(Some(id), move |current| self.parent(*current))
    }

    /// Slash-separated names from the root down to `id`.
    #[must_use]
    pub fn path(&self, id: StageId) -> String {
        let mut names: Vec<&str> = self.ancestors(id).map(|a| self.name(a)).collect();
        names.reverse();
        names.join("/")
    }

    /// Finds a stage by name as seen from `from`.
    ///
    /// Each ancestor (starting with `from`) is checked by name and then by its
    /// children; if nothing matches, the whole tree is searched breadth first.
    #[must_use]
    pub fn find(&self, from: StageId, name: &str) -> Option<StageId> {
        for ancestor in self.ancestors(from) {
            if self.name(ancestor) == name {
                return Some(ancestor);
            }
            if let Some(child) = self.child(ancestor, name) {
                return Some(child);
            }
        }
        let mut queue = VecDeque::from([StageId::ROOT]);
        while let Some(id) = queue.pop_front() {
            if self.name(id) == name {
                return Some(id);
            }
            queue.extend(self.children(id).iter().copied());
        }
        None
    }

    /// Every stage below the root, in declaration order.
    pub fn stages(&self) -> impl Iterator<Item = StageId> + '_ {
        (1..self.nodes.len()).map(StageId)
    }
}
