//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects observables,
//! computeds and reactions. It owns the dependency graph, the tracking stack,
//! the transaction state and the registry of live derivations.
//!
//! # How It Works
//!
//! 1. When an observable or computed is created, it registers a node.
//!
//! 2. When a derivation runs, the tracking stack attributes every read to it;
//!    at the end of the run its dependency set is replaced.
//!
//! 3. When an observable changes, the runtime:
//!    a. Marks direct observers stale and observers of computeds possibly stale
//!    b. Queues every reached reaction (once)
//!    c. Flushes the queue unless a transaction is open
//!    d. Leaves computeds alone: they recompute on next read
//!
//! # Threading
//!
//! All runtime state lives in a single thread-local slot, initialised empty
//! (no frames, no open transaction). Handles are `!Send`, so a graph never
//! crosses threads. No `RefCell` borrow is held while user code runs; every
//! re-entrant read or write from a callback goes through the same paths.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;

use super::action::Transaction;
use super::context::{TrackingGuard, TrackingStack};
use crate::config::{current_config, EnforceActions};
use crate::error::{ReactiveError, Result};
use crate::graph::{DependencyGraph, Node, NodeId, NodeKind, NodeState};

/// Something the runtime can run under tracking: a computed or a reaction.
pub(crate) trait Derivation {
    /// The derivation's graph node.
    fn node_id(&self) -> NodeId;

    /// Run the derivation now.
    ///
    /// Returns whether the derivation's output changed. Reactions have no
    /// output and always report `true`.
    fn execute(&self) -> Result<bool>;
}

/// Everything the runtime owns, in its one thread-local slot.
#[derive(Default)]
struct RuntimeState {
    graph: RefCell<DependencyGraph>,
    tracking: RefCell<TrackingStack>,
    transaction: RefCell<Transaction>,

    /// Computeds are owned by their handles; the runtime only needs them to
    /// bring a computed up to date on behalf of its observers.
    computeds: RefCell<HashMap<NodeId, Weak<dyn Derivation>>>,

    /// Reactions are owned by the runtime until they are disposed.
    reactions: RefCell<HashMap<NodeId, Rc<dyn Derivation>>>,
}

thread_local! {
    static RUNTIME: RuntimeState = RuntimeState::default();
}

/// The reactive runtime of the current thread.
pub struct Runtime;

impl Runtime {
    fn with<R>(f: impl FnOnce(&RuntimeState) -> R) -> R {
        RUNTIME.with(f)
    }

    /// Like `with`, but a no-op while the thread is tearing down its locals.
    fn try_with(f: impl FnOnce(&RuntimeState)) {
        let _ = RUNTIME.try_with(f);
    }

    pub(crate) fn with_graph<R>(f: impl FnOnce(&DependencyGraph) -> R) -> R {
        Self::with(|rt| f(&rt.graph.borrow()))
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub(crate) fn register_node(node: Node) -> NodeId {
        Self::with(|rt| rt.graph.borrow_mut().add_node(node))
    }

    pub(crate) fn register_computed(id: NodeId, computed: Weak<dyn Derivation>) {
        Self::with(|rt| {
            rt.computeds.borrow_mut().insert(id, computed);
        });
    }

    pub(crate) fn register_reaction(reaction: Rc<dyn Derivation>) {
        Self::with(|rt| {
            rt.reactions.borrow_mut().insert(reaction.node_id(), reaction);
        });
    }

    /// Forget an observable or computed whose last handle was dropped.
    pub(crate) fn remove_node(id: NodeId) {
        Self::try_with(|rt| {
            rt.computeds.borrow_mut().remove(&id);
            rt.graph.borrow_mut().remove_node(id);
        });
    }

    /// Dispose a reaction. Returns `false` if it was already disposed.
    pub(crate) fn dispose_reaction(id: NodeId) -> bool {
        let removed = Self::with(|rt| {
            let removed = rt.reactions.borrow_mut().remove(&id);
            if removed.is_some() {
                rt.graph.borrow_mut().remove_node(id);
                rt.transaction.borrow_mut().pending.shift_remove(&id);
            }
            removed
        });
        // The reaction's closure may own handles whose drops call back into
        // the runtime, so it is released outside of any borrow.
        let disposed = removed.is_some();
        drop(removed);
        disposed
    }

    fn computed(id: NodeId) -> Option<Rc<dyn Derivation>> {
        Self::with(|rt| rt.computeds.borrow().get(&id).and_then(Weak::upgrade))
    }

    fn reaction(id: NodeId) -> Option<Rc<dyn Derivation>> {
        Self::with(|rt| rt.reactions.borrow().get(&id).cloned())
    }

    // ------------------------------------------------------------------
    // Node state
    // ------------------------------------------------------------------

    pub(crate) fn state(id: NodeId) -> Option<NodeState> {
        Self::with(|rt| rt.graph.borrow().state(id))
    }

    pub(crate) fn set_state(id: NodeId, state: NodeState) {
        Self::with(|rt| rt.graph.borrow_mut().set_state(id, state));
    }

    /// A computed produced a new value; upgrade its possibly-stale observers.
    pub(crate) fn confirm_changed(id: NodeId) {
        Self::with(|rt| rt.graph.borrow_mut().confirm_changed(id));
    }

    pub(crate) fn display_name(id: NodeId) -> String {
        Self::with(|rt| rt.graph.borrow().display_name(id))
    }

    pub(crate) fn observer_count(id: NodeId) -> usize {
        Self::with(|rt| {
            rt.graph
                .borrow()
                .get_node(id)
                .map_or(0, |node| node.observers().len())
        })
    }

    pub(crate) fn dependency_count(id: NodeId) -> usize {
        Self::with(|rt| {
            rt.graph
                .borrow()
                .get_node(id)
                .map_or(0, |node| node.dependencies().len())
        })
    }

    pub(crate) fn version(id: NodeId) -> u64 {
        Self::with(|rt| rt.graph.borrow().get_node(id).map_or(0, Node::version))
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    pub(crate) fn push_frame(observer: Option<NodeId>) -> usize {
        Self::with(|rt| {
            let mut tracking = rt.tracking.borrow_mut();
            tracking.push(observer);
            tracking.depth()
        })
    }

    pub(crate) fn pop_frame() -> Option<(Option<NodeId>, IndexSet<NodeId>)> {
        let mut popped = None;
        Self::try_with(|rt| popped = rt.tracking.borrow_mut().pop());
        popped
    }

    /// The derivation reads are currently attributed to, if any.
    pub fn current_observer() -> Option<NodeId> {
        Self::with(|rt| rt.tracking.borrow().current_observer())
    }

    /// Record a read of `id` against the running derivation.
    pub(crate) fn report_observed(id: NodeId) {
        Self::with(|rt| rt.tracking.borrow_mut().record(id));
    }

    /// Run `f` as derivation `id` and replace its dependencies with what it
    /// read. Dependencies are rebound whether `f` succeeds or fails.
    pub(crate) fn track<R>(id: NodeId, f: impl FnOnce() -> R) -> R {
        let guard = TrackingGuard::enter(Some(id));
        let result = f();
        let reads = guard.finish();
        Self::with(|rt| rt.graph.borrow_mut().bind_dependencies(id, reads));
        result
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Reject writes that the current context does not allow.
    pub(crate) fn check_write(atom: NodeId) -> Result<()> {
        Self::with(|rt| {
            let graph = rt.graph.borrow();

            // Any computed below on the stack counts, including one that
            // opened an action or an untracked scope around the write.
            let computing = rt
                .tracking
                .borrow()
                .observers()
                .find(|id| graph.kind(*id) == Some(NodeKind::Computed));
            if let Some(computed) = computing {
                return Err(ReactiveError::SideEffectInComputed {
                    atom: graph.display_name(atom),
                    computed: graph.display_name(computed),
                });
            }

            if rt.transaction.borrow().depth > 0 {
                return Ok(());
            }

            let illegal = match current_config().enforce_actions {
                EnforceActions::Never => false,
                EnforceActions::Observed => graph
                    .get_node(atom)
                    .is_some_and(|node| !node.observers().is_empty()),
                EnforceActions::Always => true,
            };
            if illegal {
                return Err(ReactiveError::IllegalMutation {
                    atom: graph.display_name(atom),
                });
            }
            Ok(())
        })
    }

    /// Invalidate everything downstream of a changed observable and flush if
    /// no transaction is open.
    pub(crate) fn report_changed(atom: NodeId) -> Result<()> {
        let flush = Self::with(|rt| {
            let scheduled = rt.graph.borrow_mut().propagate_changed(atom);
            let mut transaction = rt.transaction.borrow_mut();
            transaction.pending.extend(scheduled);
            transaction.depth == 0
        });

        if flush {
            Self::run_pending_reactions()
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Derivations
    // ------------------------------------------------------------------

    /// Decide whether a derivation must re-run.
    ///
    /// Possibly-stale derivations bring their computed dependencies up to
    /// date first, in read order, and only re-run if one of them confirmed a
    /// change.
    pub(crate) fn should_compute(id: NodeId) -> Result<bool> {
        match Self::state(id) {
            None | Some(NodeState::Clean) => Ok(false),
            Some(NodeState::Stale) => Ok(true),
            Some(NodeState::Computing) => Err(ReactiveError::CyclicComputation {
                computed: Self::display_name(id),
            }),
            Some(NodeState::PossiblyStale) => {
                let computed_deps: Vec<NodeId> = Self::with(|rt| {
                    let graph = rt.graph.borrow();
                    graph
                        .get_node(id)
                        .map(|node| {
                            node.dependencies()
                                .iter()
                                .copied()
                                .filter(|dep| graph.kind(*dep) == Some(NodeKind::Computed))
                                .collect()
                        })
                        .unwrap_or_default()
                });

                for dep in computed_deps {
                    // A failing input is a change: the derivation re-runs and
                    // receives the error through its own read.
                    if Self::refresh_computed(dep).is_err() {
                        Self::set_state(id, NodeState::Stale);
                        return Ok(true);
                    }
                    if Self::state(id) == Some(NodeState::Stale) {
                        return Ok(true);
                    }
                }

                Self::set_state(id, NodeState::Clean);
                Ok(false)
            }
        }
    }

    fn refresh_computed(id: NodeId) -> Result<()> {
        if Self::should_compute(id)? {
            if let Some(computed) = Self::computed(id) {
                computed.execute()?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    pub(crate) fn start_batch() -> usize {
        Self::with(|rt| {
            let mut transaction = rt.transaction.borrow_mut();
            transaction.depth += 1;
            transaction.depth
        })
    }

    /// Close one transaction level. Returns the remaining depth.
    pub(crate) fn end_batch() -> usize {
        Self::with(|rt| {
            let mut transaction = rt.transaction.borrow_mut();
            transaction.depth = transaction.depth.saturating_sub(1);
            transaction.depth
        })
    }

    pub(crate) fn batch_depth() -> usize {
        Self::with(|rt| rt.transaction.borrow().depth)
    }

    /// Run `f` with flushing suppressed, then flush whatever it queued.
    ///
    /// Used for the first run of a new reaction, so that its writes are
    /// handled after it has bound its dependencies. Inside a running flush
    /// this just runs `f`; the flush picks up the queue.
    pub(crate) fn with_deferred_flush<R>(f: impl FnOnce() -> Result<R>) -> Result<R> {
        let owns_flush = Self::with(|rt| {
            let mut transaction = rt.transaction.borrow_mut();
            !std::mem::replace(&mut transaction.running, true)
        });

        let result = {
            let _running = owns_flush.then_some(FlushGuard);
            f()
        };

        let flushed = if owns_flush {
            Self::run_pending_reactions()
        } else {
            Ok(())
        };
        let value = result?;
        flushed?;
        Ok(value)
    }

    /// Run every queued reaction, in queue order, until the queue drains.
    ///
    /// A no-op inside a transaction or when a flush is already running on
    /// this thread; in the latter case the running flush picks up whatever
    /// was queued.
    pub(crate) fn run_pending_reactions() -> Result<()> {
        let start = Self::with(|rt| {
            let mut transaction = rt.transaction.borrow_mut();
            if transaction.depth > 0 || transaction.running || transaction.pending.is_empty() {
                return false;
            }
            transaction.running = true;
            true
        });
        if !start {
            return Ok(());
        }
        let _running = FlushGuard;

        let limit = current_config().max_reaction_iterations;
        let mut iterations = 0;

        loop {
            let batch: Vec<NodeId> =
                Self::with(|rt| rt.transaction.borrow_mut().pending.drain(..).collect());
            if batch.is_empty() {
                return Ok(());
            }

            iterations += 1;
            if iterations > limit {
                tracing::debug!(limit, "aborting reaction flush");
                return Err(ReactiveError::ReactionLoop { iterations: limit });
            }

            tracing::debug!(pass = iterations, reactions = batch.len(), "flushing reactions");

            for (index, id) in batch.iter().enumerate() {
                let Some(reaction) = Self::reaction(*id) else {
                    continue;
                };
                let outcome = Self::should_compute(*id).and_then(|stale| {
                    if stale {
                        reaction.execute().map(drop)
                    } else {
                        Ok(())
                    }
                });

                if let Err(err) = outcome {
                    Self::requeue_front(&batch[index + 1..]);
                    return Err(err);
                }
            }
        }
    }

    /// Put reactions back at the head of the queue after a failed flush.
    fn requeue_front(ids: &[NodeId]) {
        if ids.is_empty() {
            return;
        }
        Self::with(|rt| {
            let mut transaction = rt.transaction.borrow_mut();
            let mut pending: IndexSet<NodeId> = ids.iter().copied().collect();
            pending.extend(transaction.pending.drain(..));
            transaction.pending = pending;
        });
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Whether the runtime is between top-level operations: no running
    /// derivation, no open transaction, nothing queued.
    pub fn is_idle() -> bool {
        Self::with(|rt| {
            let transaction = rt.transaction.borrow();
            rt.tracking.borrow().is_empty()
                && transaction.depth == 0
                && !transaction.running
                && transaction.pending.is_empty()
        })
    }

    /// Number of live nodes in this thread's graph.
    pub fn node_count() -> usize {
        Self::with(|rt| rt.graph.borrow().node_count())
    }
}

/// Clears the "flush running" flag when a flush ends, however it ends.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        Runtime::try_with(|rt| rt.transaction.borrow_mut().running = false);
    }
}
