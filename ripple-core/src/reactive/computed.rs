//! Computed Implementation
//!
//! A computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first read, the computed runs its function under tracking and
//!    caches the result.
//!
//! 2. When read again with no intervening change, it returns the cache.
//!
//! 3. When an observable it read changes, it is marked stale. When a computed
//!    it read is invalidated, it is marked possibly stale.
//!
//! 4. On next read, a stale computed recomputes. A possibly-stale one first
//!    brings its computed inputs up to date and recomputes only if one of
//!    them produced a different value.
//!
//! Computeds are never evaluated eagerly: a computed that is never read
//! stays stale and costs nothing.
//!
//! # Cycles
//!
//! A computed is `Computing` while its function runs. Reading it in that state
//! (directly, or through other computeds) fails with
//! [`ReactiveError::CyclicComputation`]. Writing an observable from inside the
//! function fails with [`ReactiveError::SideEffectInComputed`].

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use super::comparer::Comparer;
use super::runtime::{Derivation, Runtime};
use crate::error::{ReactiveError, Result};
use crate::graph::{Node, NodeId, NodeKind, NodeState};

type ComputeFn<T> = Box<dyn Fn() -> Result<T>>;

struct ComputedInner<T> {
    id: NodeId,
    compute: ComputeFn<T>,

    /// The cached value (None if never computed).
    value: RefCell<Option<T>>,
    comparer: Comparer<T>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::remove_node(self.id);
    }
}

/// Puts a computed back to `Stale` if its function unwinds.
struct ComputingGuard {
    id: NodeId,
    armed: bool,
}

impl Drop for ComputingGuard {
    fn drop(&mut self) {
        if self.armed {
            Runtime::set_state(self.id, NodeState::Stale);
        }
    }
}

impl<T: 'static> Derivation for ComputedInner<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn execute(&self) -> Result<bool> {
        Runtime::set_state(self.id, NodeState::Computing);
        let mut guard = ComputingGuard {
            id: self.id,
            armed: true,
        };

        let result = Runtime::track(self.id, || (self.compute)());
        guard.armed = false;

        let value = match result {
            Ok(value) => value,
            Err(err) => {
                // Observers that saw the failure must see the next value as new.
                self.value.borrow_mut().take();
                Runtime::set_state(self.id, NodeState::Stale);
                return Err(err);
            }
        };

        let changed = {
            let mut cached = self.value.borrow_mut();
            let changed = match cached.as_ref() {
                Some(previous) => !self.comparer.equals(previous, &value),
                None => true,
            };
            if changed {
                *cached = Some(value);
            }
            changed
        };

        Runtime::set_state(self.id, NodeState::Clean);
        if changed {
            Runtime::confirm_changed(self.id);
        }
        tracing::trace!(computed = %self.id, changed, "computed evaluated");
        Ok(changed)
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let width = Observable::new(2);
///
/// let w = width.clone();
/// let area = Computed::new(move || Ok(w.get() * w.get()));
///
/// assert_eq!(area.get()?, 4);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: PartialEq + 'static> Computed<T> {
    /// Create a new computed with the given function.
    ///
    /// The function is not run immediately. It runs on first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> Result<T> + 'static,
    {
        Self::build(None, Box::new(compute), Comparer::default())
    }

    /// Create a new computed with a debug name.
    pub fn named<F>(name: impl Into<Cow<'static, str>>, compute: F) -> Self
    where
        F: Fn() -> Result<T> + 'static,
    {
        Self::build(Some(name.into()), Box::new(compute), Comparer::default())
    }
}

impl<T: 'static> Computed<T> {
    /// Create a new computed whose observers are only re-run when `comparer`
    /// says the recomputed value differs from the cached one.
    pub fn with_comparer<F>(compute: F, comparer: Comparer<T>) -> Self
    where
        F: Fn() -> Result<T> + 'static,
    {
        Self::build(None, Box::new(compute), comparer)
    }

    fn build(
        name: Option<Cow<'static, str>>,
        compute: ComputeFn<T>,
        comparer: Comparer<T>,
    ) -> Self {
        let node = Node::new(NodeId::new(), NodeKind::Computed).with_name(name);
        let id = Runtime::register_node(node);
        let inner = Rc::new(ComputedInner {
            id,
            compute,
            value: RefCell::new(None),
            comparer,
        });

        let weak: Weak<ComputedInner<T>> = Rc::downgrade(&inner);
        let weak: Weak<dyn Derivation> = weak;
        Runtime::register_computed(id, weak);

        Self { inner }
    }

    /// Get the computed's graph node id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The debug name, or a generated one.
    pub fn name(&self) -> String {
        Runtime::display_name(self.inner.id)
    }

    /// Bring the cached value up to date, recomputing if needed.
    fn refresh(&self) -> Result<()> {
        let id = self.inner.id;
        if Runtime::state(id) == Some(NodeState::Computing) {
            return Err(ReactiveError::CyclicComputation {
                computed: Runtime::display_name(id),
            });
        }

        Runtime::report_observed(id);

        if Runtime::should_compute(id)? || self.inner.value.borrow().is_none() {
            self.inner.execute()?;
        }
        Ok(())
    }

    /// Borrow the current value, recomputing if necessary.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.refresh()?;
        let value = self.inner.value.borrow();
        Ok(f(value.as_ref().expect("fresh computed should have a value")))
    }

    /// Get the current dirty state.
    pub fn state(&self) -> NodeState {
        Runtime::state(self.inner.id).unwrap_or(NodeState::Stale)
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Get the number of derivations reading this computed.
    pub fn observer_count(&self) -> usize {
        Runtime::observer_count(self.inner.id)
    }

    /// Get the number of nodes this computed read during its last run.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.id)
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a computed. Inside a running
    /// derivation, the read is tracked like an observable read.
    pub fn get(&self) -> Result<T> {
        self.with(T::clone)
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
