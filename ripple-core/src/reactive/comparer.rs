//! Equality used to decide whether a write (or a recomputation) actually
//! changed a value. Equal writes are no-ops: nothing is invalidated.

use std::fmt;
use std::rc::Rc;

/// Decides whether two values are equal for change detection.
pub struct Comparer<T> {
    equals: Rc<dyn Fn(&T, &T) -> bool>,
}

impl<T: 'static> Comparer<T> {
    /// Use a custom predicate.
    pub fn new(equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            equals: Rc::new(equals),
        }
    }

    /// Treat every write as a change, even of an equal value.
    pub fn always_changed() -> Self {
        Self::new(|_, _| false)
    }

    pub fn equals(&self, old: &T, new: &T) -> bool {
        (self.equals)(old, new)
    }
}

impl<T: PartialEq + 'static> Comparer<T> {
    /// Structural equality via [`PartialEq`].
    pub fn structural() -> Self {
        Self::new(|a: &T, b: &T| a == b)
    }
}

impl<T: PartialEq + 'static> Default for Comparer<T> {
    fn default() -> Self {
        Self::structural()
    }
}

impl<T> Clone for Comparer<T> {
    fn clone(&self) -> Self {
        Self {
            equals: Rc::clone(&self.equals),
        }
    }
}

impl<T> fmt::Debug for Comparer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Comparer")
    }
}
