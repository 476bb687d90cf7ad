//! Actions
//!
//! An action is a transaction around a block of writes. Inside it, writes
//! invalidate dependents immediately but reactions are only queued; they run
//! once, in first-queued order, when the outermost action closes.
//!
//! ```rust,ignore
//! let first = Observable::new("Ada");
//! let last = Observable::new("Lovelace");
//!
//! // `full_name` reactions run once, not twice.
//! run_in_action(|| {
//!     first.set("Grace")?;
//!     last.set("Hopper")
//! })?;
//! ```
//!
//! Actions also run untracked: reading inside an action started from a
//! reaction does not subscribe that reaction.

use std::borrow::Cow;
use std::rc::Rc;

use indexmap::IndexSet;

use super::context::untracked;
use super::runtime::Runtime;
use crate::error::Result;
use crate::graph::NodeId;

/// Transaction state of the current thread.
#[derive(Debug, Default)]
pub(crate) struct Transaction {
    /// Number of open (nested) actions.
    pub(crate) depth: usize,

    /// Reactions waiting for the outermost action to close, in the order
    /// they were first invalidated.
    pub(crate) pending: IndexSet<NodeId>,

    /// Whether a flush is running right now.
    pub(crate) running: bool,
}

/// One open transaction level.
///
/// Closing flushes if this was the outermost level. If the action panics the
/// guard still closes its level, without flushing.
struct TransactionGuard {
    closed: bool,
}

impl TransactionGuard {
    fn open() -> Self {
        Runtime::start_batch();
        Self { closed: false }
    }

    fn close(mut self) -> Result<()> {
        self.closed = true;
        if Runtime::end_batch() == 0 {
            Runtime::run_pending_reactions()
        } else {
            Ok(())
        }
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if !self.closed {
            Runtime::end_batch();
        }
    }
}

/// Run `f` as an action.
///
/// Pending reactions flush when the outermost action returns, even if `f`
/// failed; writes made before the failure are kept. The error from `f` takes
/// precedence over an error raised by the flush.
pub fn run_in_action<R>(f: impl FnOnce() -> Result<R>) -> Result<R> {
    let transaction = TransactionGuard::open();
    let result = untracked(f);
    let flushed = transaction.close();
    let value = result?;
    flushed?;
    Ok(value)
}

/// Wrap `f` so that every call runs as a named action.
pub fn action<A, R, F>(name: impl Into<Cow<'static, str>>, f: F) -> impl Fn(A) -> Result<R>
where
    F: Fn(A) -> Result<R>,
{
    let name = name.into();
    move |args| {
        let _span = tracing::debug_span!("action", name = %name).entered();
        run_in_action(|| f(args))
    }
}

/// Bind an action to its owner.
///
/// The returned function keeps `owner` alive and always runs `f` with it as
/// receiver, inside an action, wherever it is called from.
///
/// ```rust,ignore
/// let order = Rc::new(Order::new());
/// let cancel = bind_action(&order, Order::cancel);
/// drop(order);
/// cancel(())?;
/// ```
pub fn bind_action<O, A, R, F>(owner: &Rc<O>, f: F) -> impl Fn(A) -> Result<R>
where
    O: ?Sized,
    F: Fn(&O, A) -> Result<R>,
{
    let owner = Rc::clone(owner);
    move |args| run_in_action(|| f(&*owner, args))
}

/// Whether an action is open on this thread.
pub fn is_in_action() -> bool {
    Runtime::batch_depth() > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;

    #[test]
    fn depth_tracks_nesting() {
        assert!(!is_in_action());
        run_in_action(|| {
            assert!(is_in_action());
            run_in_action(|| {
                assert_eq!(Runtime::batch_depth(), 2);
                Ok(())
            })
        })
        .unwrap();
        assert!(!is_in_action());
        assert!(Runtime::is_idle());
    }

    #[test]
    fn returns_the_action_value() {
        assert_eq!(run_in_action(|| Ok(6 * 7)).unwrap(), 42);
    }

    #[test]
    fn failed_action_closes_its_level() {
        let result: Result<()> = run_in_action(|| Err(ReactiveError::reaction("test", "boom")));
        assert!(result.is_err());
        assert!(!is_in_action());
    }

    #[test]
    fn panicking_action_closes_its_level() {
        let result = std::panic::catch_unwind(|| {
            let _: Result<()> = run_in_action(|| panic!("boom"));
        });
        assert!(result.is_err());
        assert!(Runtime::is_idle());
    }

    #[test]
    fn named_action_runs_in_transaction() {
        let check = action("check", |expected: usize| {
            assert_eq!(Runtime::batch_depth(), expected);
            Ok(())
        });
        check(1).unwrap();
        run_in_action(|| check(2)).unwrap();
    }
}
