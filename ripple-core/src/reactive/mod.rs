//! Reactive Primitives
//!
//! This module implements the core reactive system: observables, computeds,
//! reactions and actions.
//!
//! # Concepts
//!
//! ## Observables
//!
//! An observable is a container for mutable state. When its value is read
//! while a computed or reaction is running, that derivation is registered as
//! an observer. When the value changes, every observer is invalidated.
//!
//! ## Computeds
//!
//! A computed is a derived value that caches its result. It re-evaluates only
//! when read after one of its dependencies changed.
//!
//! ## Reactions
//!
//! A reaction is a side-effecting computation that runs whenever its
//! dependencies change. Reactions synchronize reactive state with the outside
//! world: logging, rendering, persistence.
//!
//! ## Actions
//!
//! An action batches writes. Reactions affected by any number of writes
//! inside an action run at most once, when the outermost action closes.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered automatically: the runtime keeps a stack of
//! running derivations and attributes each read to the top of it. After every
//! run, the derivation's dependency set is replaced by what it actually read.

mod action;
mod comparer;
mod computed;
mod context;
mod observable;
mod reaction;
mod runtime;

pub use action::{action, bind_action, is_in_action, run_in_action};
pub use comparer::Comparer;
pub use computed::Computed;
pub use context::{untracked, ReactiveContext};
pub use observable::Observable;
pub use reaction::{autorun, autorun_named, reaction, DisposeGuard, Disposer, ReactionOptions};
pub use runtime::Runtime;
