//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// An observable cell. Atoms have observers but never dependencies.
    Atom,

    /// A lazily evaluated, cached derived value. Has both.
    Computed,

    /// A side-effecting derivation. Reactions are leaves: nothing observes them.
    Reaction,
}

impl NodeKind {
    /// Whether nodes of this kind run under dependency tracking.
    pub fn is_derivation(self) -> bool {
        !matches!(self, Self::Atom)
    }

    fn label(self) -> &'static str {
        match self {
            Self::Atom => "Observable",
            Self::Computed => "Computed",
            Self::Reaction => "Reaction",
        }
    }
}

/// Freshness of a derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Up to date with every dependency.
    Clean,

    /// A computed dependency was invalidated. The node is re-run only if that
    /// computed actually produces a different value.
    PossiblyStale,

    /// An observable dependency changed. The node must re-run.
    Stale,

    /// The node is running right now.
    Computing,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    state: NodeState,
    name: Option<Cow<'static, str>>,

    /// Bumped whenever the node's value changes.
    version: u64,

    /// Nodes this node read during its last run, in first-read order.
    dependencies: IndexSet<NodeId>,

    /// Nodes that read this node during their last run.
    observers: IndexSet<NodeId>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            // Derivations start stale so the first read or run computes.
            state: if kind.is_derivation() {
                NodeState::Stale
            } else {
                NodeState::Clean
            },
            name: None,
            version: 0,
            dependencies: IndexSet::new(),
            observers: IndexSet::new(),
        }
    }

    /// Attach a debug name.
    pub fn with_name(mut self, name: Option<Cow<'static, str>>) -> Self {
        self.name = name;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// The node's name, or a generated `Kind#id` label.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.to_string(),
            None => format!("{}{}", self.kind.label(), self.id),
        }
    }

    pub fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.dependencies
    }

    pub fn observers(&self) -> &IndexSet<NodeId> {
        &self.observers
    }

    pub(crate) fn add_observer(&mut self, node_id: NodeId) {
        self.observers.insert(node_id);
    }

    pub(crate) fn remove_observer(&mut self, node_id: NodeId) {
        self.observers.shift_remove(&node_id);
    }

    pub(crate) fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.shift_remove(&node_id);
    }

    pub(crate) fn replace_dependencies(
        &mut self,
        dependencies: IndexSet<NodeId>,
    ) -> IndexSet<NodeId> {
        std::mem::replace(&mut self.dependencies, dependencies)
    }
}
