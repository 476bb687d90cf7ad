//! Graph Snapshots
//!
//! A serializable, point-in-time copy of the dependency graph, for debugging
//! tools and tests. Snapshots never hold references into the live runtime.

use serde::{Deserialize, Serialize};

use super::dependency::DependencyGraph;
use super::node::{Node, NodeId, NodeKind, NodeState};
use crate::error::Result;
use crate::reactive::Runtime;

/// One node as it looked when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub state: NodeState,
    pub version: u64,
    pub dependencies: Vec<NodeId>,
    pub observers: Vec<NodeId>,
}

impl From<&Node> for NodeSnapshot {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id(),
            name: node.display_name(),
            kind: node.kind(),
            state: node.state(),
            version: node.version(),
            dependencies: node.dependencies().iter().copied().collect(),
            observers: node.observers().iter().copied().collect(),
        }
    }
}

/// Every live node of the current thread's runtime, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

impl GraphSnapshot {
    /// Copy the current thread's dependency graph.
    pub fn capture() -> Self {
        Runtime::with_graph(Self::from_graph)
    }

    /// Copy the given graph.
    pub fn from_graph(graph: &DependencyGraph) -> Self {
        let mut nodes: Vec<NodeSnapshot> = graph.nodes().map(NodeSnapshot::from).collect();
        nodes.sort_by_key(|node| node.id);
        Self { nodes }
    }

    /// Find a node by id.
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Names of the nodes the given node depends on.
    pub fn dependency_names(&self, id: NodeId) -> Vec<&str> {
        self.node(id)
            .map(|node| {
                node.dependencies
                    .iter()
                    .filter_map(|dep| self.node(*dep))
                    .map(|dep| dep.name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Compact MessagePack encoding, with field names.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }
}
