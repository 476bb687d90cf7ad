//! Tracking Context
//!
//! The tracking context records which derivation is currently running, so
//! that reads can be attributed to it.
//!
//! # Implementation
//!
//! A stack of frames lives in the runtime's thread-local slot. Running a
//! derivation pushes a frame naming it; every read of an observable or a
//! computed is added to the top frame's read set. When the run completes the
//! frame is popped and its read set becomes the derivation's new dependency
//! set.
//!
//! Untracked scopes push a frame with no observer, which swallows reads. This
//! is how actions and `untracked` keep their reads out of the enclosing
//! derivation.
//!
//! Frames nest: a computed read from inside a reaction gets its own frame,
//! and the reaction only records the computed itself.

use indexmap::IndexSet;

use super::runtime::Runtime;
use crate::graph::NodeId;

/// One running derivation (or untracked scope) and what it has read so far.
#[derive(Debug)]
struct Frame {
    observer: Option<NodeId>,
    reads: IndexSet<NodeId>,
}

/// The stack of running derivations.
#[derive(Debug, Default)]
pub(crate) struct TrackingStack {
    frames: Vec<Frame>,
}

impl TrackingStack {
    pub(crate) fn push(&mut self, observer: Option<NodeId>) {
        self.frames.push(Frame {
            observer,
            reads: IndexSet::new(),
        });
    }

    /// Pop the top frame, returning its observer and read set.
    pub(crate) fn pop(&mut self) -> Option<(Option<NodeId>, IndexSet<NodeId>)> {
        self.frames.pop().map(|frame| (frame.observer, frame.reads))
    }

    /// The derivation reads are currently attributed to, if any.
    pub(crate) fn current_observer(&self) -> Option<NodeId> {
        self.frames.last().and_then(|frame| frame.observer)
    }

    /// Attribute a read to the top frame. Untracked frames ignore it.
    pub(crate) fn record(&mut self, node: NodeId) {
        if let Some(frame) = self.frames.last_mut() {
            if frame.observer.is_some() {
                frame.reads.insert(node);
            }
        }
    }

    /// Every running derivation, innermost first. Untracked frames are
    /// skipped.
    pub(crate) fn observers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.frames.iter().rev().filter_map(|frame| frame.observer)
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Guard that pops its frame when dropped.
///
/// This keeps the stack balanced even if the derivation panics.
pub(crate) struct TrackingGuard {
    observer: Option<NodeId>,
    depth: usize,
    finished: bool,
}

impl TrackingGuard {
    /// Start attributing reads to `observer`. `None` starts an untracked scope.
    pub(crate) fn enter(observer: Option<NodeId>) -> Self {
        let depth = Runtime::push_frame(observer);
        Self {
            observer,
            depth,
            finished: false,
        }
    }

    /// Pop the frame and return the reads it collected.
    pub(crate) fn finish(mut self) -> IndexSet<NodeId> {
        self.finished = true;
        self.pop().unwrap_or_default()
    }

    fn pop(&self) -> Option<IndexSet<NodeId>> {
        let (observer, reads) = Runtime::pop_frame()?;

        // Verify we're popping the right frame. This catches guards dropped
        // out of order.
        debug_assert_eq!(
            observer, self.observer,
            "tracking frame mismatch at depth {}",
            self.depth
        );
        Some(reads)
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}

/// Read-only view of the tracking state.
pub struct ReactiveContext;

impl ReactiveContext {
    /// Whether reads are currently being attributed to a derivation.
    pub fn is_tracking() -> bool {
        Runtime::current_observer().is_some()
    }

    /// The derivation that is currently running, if any.
    pub fn current_observer() -> Option<NodeId> {
        Runtime::current_observer()
    }
}

/// Run `f` without recording any of its reads as dependencies.
///
/// ```rust,ignore
/// autorun(move || {
///     // Re-runs when `title` changes, but not when `log_level` does.
///     let level = untracked(|| log_level.get());
///     log(level, &title.get());
///     Ok(())
/// })?;
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let guard = TrackingGuard::enter(None);
    let result = f();
    guard.finish();
    result
}
