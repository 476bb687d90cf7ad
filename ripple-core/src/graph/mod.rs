//! Dependency Graph
//!
//! This module implements the graph that tracks which derivations read which
//! reactive values.
//!
//! # Overview
//!
//! The graph is bipartite in spirit:
//!
//! - Nodes are atoms (observables), computeds, or reactions
//! - An edge from A to B means B read A during its last run
//!
//! Computeds sit in the middle: they observe atoms and are observed by other
//! derivations. Reactions are always leaves.
//!
//! # Design Decisions
//!
//! 1. Edges are stored on both ends (`dependencies` and `observers`) so that
//!    invalidation walks forward and disposal walks backward in O(edges).
//!
//! 2. A derivation's dependency set is replaced wholesale after every run,
//!    never patched, so conditional reads stay correct.
//!
//! 3. The graph stores no values and no closures, only structure and
//!    freshness. It can be inspected and snapshotted without touching user
//!    code.

mod dependency;
mod node;
mod snapshot;

pub use dependency::{DependencyGraph, ScheduledReactions};
pub use node::{Node, NodeId, NodeKind, NodeState};
pub use snapshot::{GraphSnapshot, NodeSnapshot};
