//! Dependency Graph
//!
//! The graph records which derivations read which nodes. It holds structure
//! and freshness only; values live in the typed handles.
//!
//! # Invalidation
//!
//! When an atom changes:
//!
//! 1. Every direct observer becomes `Stale`.
//! 2. A computed that turns stale marks *its* observers `PossiblyStale`,
//!    transitively, because its output may or may not change.
//! 3. Every reaction reached is returned once, in first-reached order, for
//!    the scheduler to queue.
//!
//! When a possibly-stale computed is later recomputed and its value really
//! changed, [`DependencyGraph::confirm_changed`] upgrades its possibly-stale
//! observers to `Stale`.

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::node::{Node, NodeId, NodeKind, NodeState};

/// Reactions that need scheduling after an invalidation.
pub type ScheduledReactions = SmallVec<[NodeId; 8]>;

/// The bipartite record of reads between atoms/computeds and derivations.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<NodeId, Node>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph, along with every edge touching it.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;

        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_observer(node_id);
            }
        }

        for observer_id in node.observers() {
            if let Some(observer) = self.nodes.get_mut(observer_id) {
                observer.remove_dependency(node_id);
            }
        }

        Some(node)
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn state(&self, node_id: NodeId) -> Option<NodeState> {
        self.nodes.get(&node_id).map(Node::state)
    }

    pub fn set_state(&mut self, node_id: NodeId, state: NodeState) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.set_state(state);
        }
    }

    pub fn kind(&self, node_id: NodeId) -> Option<NodeKind> {
        self.nodes.get(&node_id).map(Node::kind)
    }

    /// The node's debug name, or its raw id if it is no longer in the graph.
    pub fn display_name(&self, node_id: NodeId) -> String {
        self.nodes
            .get(&node_id)
            .map(Node::display_name)
            .unwrap_or_else(|| node_id.to_string())
    }

    /// Replace a derivation's dependency set with the nodes read by its
    /// latest run.
    ///
    /// The old set is discarded wholesale: observers are removed from nodes
    /// no longer read and added to newly read ones. Reads of nodes that were
    /// dropped mid-run are ignored.
    pub fn bind_dependencies(&mut self, derivation: NodeId, reads: IndexSet<NodeId>) {
        let reads: IndexSet<NodeId> = reads
            .into_iter()
            .filter(|id| *id != derivation && self.nodes.contains_key(id))
            .collect();

        let Some(node) = self.nodes.get_mut(&derivation) else {
            return;
        };
        let previous = node.replace_dependencies(reads.clone());

        let removed: SmallVec<[NodeId; 8]> =
            previous.iter().filter(|id| !reads.contains(*id)).copied().collect();
        let added: SmallVec<[NodeId; 8]> =
            reads.iter().filter(|id| !previous.contains(*id)).copied().collect();

        for id in &removed {
            if let Some(dep) = self.nodes.get_mut(id) {
                dep.remove_observer(derivation);
            }
        }
        for id in &added {
            if let Some(dep) = self.nodes.get_mut(id) {
                dep.add_observer(derivation);
            }
        }

        if !removed.is_empty() || !added.is_empty() {
            tracing::trace!(
                derivation = %derivation,
                added = added.len(),
                removed = removed.len(),
                "rebound dependencies"
            );
        }
    }

    /// Drop every dependency of a derivation.
    pub fn clear_dependencies(&mut self, derivation: NodeId) {
        self.bind_dependencies(derivation, IndexSet::new());
    }

    /// Record that an atom's value changed and invalidate its dependents.
    ///
    /// Returns the reactions to schedule, each listed once, in the order they
    /// were first reached. The walk is depth-first: everything behind a
    /// computed is reached before the atom's next observer. Computeds that
    /// are already stale are still walked, so reactions behind a computed
    /// whose last evaluation failed are reached too.
    pub fn propagate_changed(&mut self, atom: NodeId) -> ScheduledReactions {
        let mut scheduled: IndexSet<NodeId> = IndexSet::new();
        let mut visited: HashSet<NodeId> = HashSet::new();

        let observers: SmallVec<[NodeId; 8]> = match self.nodes.get_mut(&atom) {
            Some(node) => {
                node.bump_version();
                node.observers().iter().copied().collect()
            }
            None => return ScheduledReactions::new(),
        };

        for observer_id in observers {
            let Some(observer) = self.nodes.get_mut(&observer_id) else {
                continue;
            };
            if observer.state() == NodeState::Computing {
                continue;
            }
            observer.set_state(NodeState::Stale);
            match observer.kind() {
                NodeKind::Reaction => {
                    scheduled.insert(observer_id);
                }
                NodeKind::Computed => {
                    self.propagate_possibly_changed(observer_id, &mut visited, &mut scheduled);
                }
                NodeKind::Atom => {}
            }
        }

        scheduled.into_iter().collect()
    }

    /// Mark everything behind `computed` possibly stale, depth-first.
    fn propagate_possibly_changed(
        &mut self,
        computed: NodeId,
        visited: &mut HashSet<NodeId>,
        scheduled: &mut IndexSet<NodeId>,
    ) {
        if !visited.insert(computed) {
            return;
        }
        let observers: SmallVec<[NodeId; 8]> = match self.nodes.get(&computed) {
            Some(node) => node.observers().iter().copied().collect(),
            None => return,
        };

        for observer_id in observers {
            let Some(observer) = self.nodes.get_mut(&observer_id) else {
                continue;
            };
            match observer.state() {
                NodeState::Computing => continue,
                NodeState::Clean => observer.set_state(NodeState::PossiblyStale),
                NodeState::PossiblyStale | NodeState::Stale => {}
            }
            match observer.kind() {
                NodeKind::Reaction => {
                    scheduled.insert(observer_id);
                }
                NodeKind::Computed => {
                    self.propagate_possibly_changed(observer_id, visited, scheduled);
                }
                NodeKind::Atom => {}
            }
        }
    }

    /// Record that a computed produced a new value: its possibly-stale
    /// observers must now re-run.
    pub fn confirm_changed(&mut self, computed: NodeId) {
        let observers: SmallVec<[NodeId; 8]> = match self.nodes.get_mut(&computed) {
            Some(node) => {
                node.bump_version();
                node.observers().iter().copied().collect()
            }
            None => return,
        };

        for observer_id in observers {
            if let Some(observer) = self.nodes.get_mut(&observer_id) {
                if observer.state() == NodeState::PossiblyStale {
                    observer.set_state(NodeState::Stale);
                }
            }
        }
    }

    /// Iterate over every node.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
