//! Ripple Core
//!
//! This crate provides the core runtime for the Ripple reactive state engine.
//! It implements:
//!
//! - Reactive primitives (observables, computeds, reactions)
//! - Automatic, dynamic dependency tracking
//! - Transactional batching of writes (actions)
//! - Graph introspection for debugging tools
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives, the tracking context and the scheduler
//! - `graph`: The dependency graph and its snapshots
//! - `config`: Process-wide policy, such as action enforcement
//! - `error`: The error type shared by every fallible operation
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::{autorun, run_in_action, Computed, Observable};
//!
//! // Create an observable
//! let width = Observable::new(0);
//!
//! // Create a derived value
//! let w = width.clone();
//! let area = Computed::new(move || Ok(w.get() * w.get()));
//!
//! // Create a reaction
//! let a = area.clone();
//! let disposer = autorun(move || {
//!     println!("Area: {}", a.get()?);
//!     Ok(())
//! })?;
//!
//! // Update the observable
//! run_in_action(|| width.set(3))?;
//! // Reaction runs again, prints: "Area: 9"
//!
//! disposer.dispose();
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::{configure, current_config, reset_config, EnforceActions, ReactiveConfig};
pub use error::{ReactiveError, Result};
pub use graph::{GraphSnapshot, NodeId, NodeKind, NodeState};
pub use reactive::{
    action, autorun, autorun_named, bind_action, is_in_action, reaction, run_in_action,
    untracked, Comparer, Computed, DisposeGuard, Disposer, Observable, ReactionOptions, Runtime,
};

/// Whether the current thread's runtime is between top-level operations.
pub fn runtime_is_idle() -> bool {
    Runtime::is_idle()
}
