//! Observable Implementation
//!
//! An observable is the fundamental reactive primitive: a mutable cell that
//! records who reads it and invalidates them when it changes.
//!
//! # How Observables Work
//!
//! 1. When an observable is read while a computed or reaction is running,
//!    that derivation is recorded as an observer.
//!
//! 2. When a different value is written, every observer is invalidated and
//!    affected reactions run (immediately, or when the enclosing action
//!    closes).
//!
//! 3. Writing a value equal to the current one does nothing at all.
//!
//! # Memory Layout
//!
//! Each observable consists of:
//! - A graph node id (8 bytes)
//! - The value, behind a `RefCell`
//! - The comparer used for change detection
//!
//! Clones share all three. The graph node is removed when the last clone is
//! dropped.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::comparer::Comparer;
use super::runtime::Runtime;
use crate::error::Result;
use crate::graph::{Node, NodeId, NodeKind};

struct ObservableInner<T> {
    id: NodeId,
    value: RefCell<T>,
    comparer: Comparer<T>,
}

impl<T> Drop for ObservableInner<T> {
    fn drop(&mut self) {
        Runtime::remove_node(self.id);
    }
}

/// A reactive cell holding a value of type T.
///
/// # Example
///
/// ```rust,ignore
/// let count = Observable::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (re-runs reactions that read it)
/// count.set(5)?;
/// ```
pub struct Observable<T: 'static> {
    inner: Rc<ObservableInner<T>>,
}

impl<T: PartialEq + 'static> Observable<T> {
    /// Create a new observable with the given initial value.
    pub fn new(value: T) -> Self {
        Self::build(None, value, Comparer::default())
    }

    /// Create a new observable with a debug name, used in logs, errors and
    /// graph snapshots.
    pub fn named(name: impl Into<Cow<'static, str>>, value: T) -> Self {
        Self::build(Some(name.into()), value, Comparer::default())
    }
}

impl<T: 'static> Observable<T> {
    /// Create a new observable that uses `comparer` to detect changes.
    pub fn with_comparer(value: T, comparer: Comparer<T>) -> Self {
        Self::build(None, value, comparer)
    }

    fn build(name: Option<Cow<'static, str>>, value: T, comparer: Comparer<T>) -> Self {
        let id = Runtime::register_node(Node::new(NodeId::new(), NodeKind::Atom).with_name(name));
        Self {
            inner: Rc::new(ObservableInner {
                id,
                value: RefCell::new(value),
                comparer,
            }),
        }
    }

    /// Get the observable's graph node id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The debug name, or a generated one.
    pub fn name(&self) -> String {
        Runtime::display_name(self.inner.id)
    }

    /// Borrow the current value.
    ///
    /// Tracked like [`get`](Self::get). The observable must not be written
    /// from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::report_observed(self.inner.id);
        f(&self.inner.value.borrow())
    }

    /// Set a new value.
    ///
    /// Does nothing if the value is equal to the current one. Otherwise
    /// invalidates every observer; outside an action, affected reactions run
    /// before this returns and their errors are returned here.
    pub fn set(&self, value: T) -> Result<()> {
        let id = self.inner.id;
        Runtime::check_write(id)?;

        if self.inner.comparer.equals(&self.inner.value.borrow(), &value) {
            return Ok(());
        }

        let previous = self.inner.value.replace(value);
        drop(previous);

        tracing::trace!(observable = %id, "observable changed");
        Runtime::report_changed(id)
    }

    /// Set the value using a function of the current one.
    ///
    /// The read of the current value is not tracked.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let next = f(&self.inner.value.borrow());
        self.set(next)
    }

    /// How many derivations currently read this observable.
    pub fn observer_count(&self) -> usize {
        Runtime::observer_count(self.inner.id)
    }

    /// Number of effective writes so far.
    pub fn version(&self) -> u64 {
        Runtime::version(self.inner.id)
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Get the current value.
    ///
    /// If called while a computed or reaction is running, that derivation
    /// starts depending on this observable.
    pub fn get(&self) -> T {
        Runtime::report_observed(self.inner.id);
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T: 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
