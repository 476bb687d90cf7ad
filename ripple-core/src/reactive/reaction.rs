//! Reaction Implementation
//!
//! A reaction is a side-effecting computation that re-runs whenever anything
//! it read during its last run changes.
//!
//! # How Reactions Work
//!
//! 1. When created, the reaction runs once, synchronously, to discover its
//!    dependencies.
//!
//! 2. When a dependency changes, the reaction is queued. Outside an action
//!    the queue is flushed before the write returns; inside one, when the
//!    outermost action closes.
//!
//! 3. Every run replaces the dependency set, so reads behind conditions are
//!    picked up and dropped as the conditions change.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; reactions do not.
//! - Computeds are lazy (compute on read); reactions are eager.
//! - Nothing can depend on a reaction.
//!
//! # Lifetime
//!
//! The runtime owns a reaction until it is disposed through its
//! [`Disposer`]. Dropping the disposer does *not* stop the reaction; use
//! [`Disposer::into_guard`] for scope-bound reactions.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::action::run_in_action;
use super::runtime::{Derivation, Runtime};
use crate::error::Result;
use crate::graph::{Node, NodeId, NodeKind, NodeState};

type ReactionFn = Box<dyn Fn() -> Result<()>>;

/// The runtime-owned half of a reaction.
struct ReactionCore {
    id: NodeId,
    body: ReactionFn,
    disposed: Cell<bool>,

    /// Number of times the body has run.
    run_count: Cell<usize>,
}

impl Derivation for ReactionCore {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn execute(&self) -> Result<bool> {
        if self.disposed.get() {
            return Ok(false);
        }

        // Clean before the body runs, so writes the body makes to its own
        // dependencies invalidate it again.
        Runtime::set_state(self.id, NodeState::Clean);
        self.run_count.set(self.run_count.get() + 1);

        tracing::debug!(reaction = %self.id, run = self.run_count.get(), "running reaction");
        Runtime::track(self.id, || (self.body)())?;
        Ok(true)
    }
}

/// Handle that stops a reaction.
///
/// Clones refer to the same reaction. Disposing is idempotent.
#[derive(Clone)]
pub struct Disposer {
    id: NodeId,
    core: Weak<ReactionCore>,
}

impl Disposer {
    /// Stop the reaction: unsubscribe it from every dependency and drop it
    /// from the queue. Calling this again does nothing.
    pub fn dispose(&self) {
        if let Some(core) = self.core.upgrade() {
            core.disposed.set(true);
        }
        if Runtime::dispose_reaction(self.id) {
            tracing::debug!(reaction = %self.id, "reaction disposed");
        }
    }

    /// Whether the reaction has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.core.upgrade().map_or(true, |core| core.disposed.get())
    }

    /// The reaction's graph node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Number of times the reaction body has run. Zero once disposed.
    pub fn run_count(&self) -> usize {
        self.core.upgrade().map_or(0, |core| core.run_count.get())
    }

    /// Number of nodes the reaction read during its last run.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.id)
    }

    /// Tie the reaction to a scope: it is disposed when the guard drops.
    pub fn into_guard(self) -> DisposeGuard {
        DisposeGuard(self)
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Disposes its reaction when dropped.
#[derive(Debug)]
#[must_use = "the reaction is disposed as soon as the guard is dropped"]
pub struct DisposeGuard(Disposer);

impl DisposeGuard {
    pub fn disposer(&self) -> &Disposer {
        &self.0
    }
}

impl Drop for DisposeGuard {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

fn create(name: Option<Cow<'static, str>>, body: ReactionFn) -> Result<Disposer> {
    let id = Runtime::register_node(Node::new(NodeId::new(), NodeKind::Reaction).with_name(name));
    let core = Rc::new(ReactionCore {
        id,
        body,
        disposed: Cell::new(false),
        run_count: Cell::new(0),
    });
    Runtime::register_reaction(core.clone());

    let disposer = Disposer {
        id,
        core: Rc::downgrade(&core),
    };

    if let Err(err) = Runtime::with_deferred_flush(|| core.execute()) {
        disposer.dispose();
        return Err(err);
    }
    Ok(disposer)
}

/// Run `f` now and again whenever anything it read changes.
///
/// If the first run fails, the reaction is disposed and the error returned.
///
/// ```rust,ignore
/// let title = Observable::new(String::new());
///
/// let t = title.clone();
/// let disposer = autorun(move || {
///     println!("title is now {}", t.get());
///     Ok(())
/// })?;
///
/// title.set("yeah".into())?;   // prints again
/// disposer.dispose();
/// title.set("great".into())?;  // prints nothing
/// ```
pub fn autorun<F>(f: F) -> Result<Disposer>
where
    F: Fn() -> Result<()> + 'static,
{
    create(None, Box::new(f))
}

/// [`autorun`] with a debug name.
pub fn autorun_named<F>(name: impl Into<Cow<'static, str>>, f: F) -> Result<Disposer>
where
    F: Fn() -> Result<()> + 'static,
{
    create(Some(name.into()), Box::new(f))
}

/// Options for [`reaction`].
#[derive(Debug, Clone, Default)]
pub struct ReactionOptions {
    /// Run the effect after the first evaluation too.
    pub fire_immediately: bool,

    /// Debug name.
    pub name: Option<Cow<'static, str>>,
}

impl ReactionOptions {
    pub fn fire_immediately(mut self) -> Self {
        self.fire_immediately = true;
        self
    }

    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Track `data` only, and run `effect` whenever its value changes.
///
/// `effect` runs untracked, inside an action, so it may write observables
/// without re-triggering itself through its own reads.
pub fn reaction<T, D, E>(data: D, effect: E, options: ReactionOptions) -> Result<Disposer>
where
    T: Clone + PartialEq + 'static,
    D: Fn() -> Result<T> + 'static,
    E: Fn(&T) -> Result<()> + 'static,
{
    let previous: RefCell<Option<T>> = RefCell::new(None);
    let first_run = Cell::new(true);
    let fire_immediately = options.fire_immediately;

    let body = move || {
        let value = data()?;
        let is_first = first_run.replace(false);
        let changed = previous.borrow().as_ref() != Some(&value);
        *previous.borrow_mut() = Some(value.clone());

        if (is_first && fire_immediately) || (!is_first && changed) {
            run_in_action(|| effect(&value))?;
        }
        Ok(())
    };

    create(options.name, Box::new(body))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
