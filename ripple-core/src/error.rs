//! Error Types
//!
//! Every fallible operation in the runtime returns [`ReactiveError`]. Errors
//! are surfaced synchronously to the caller that triggered them; the runtime
//! never swallows or logs-and-drops a failure.

use std::fmt::Display;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Errors raised by the reactive runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// An observable was written outside an action while actions are enforced.
    ///
    /// The write is rejected: the value is unchanged and nothing is invalidated.
    #[error("observable `{atom}` was modified outside of an action while actions are enforced")]
    IllegalMutation { atom: String },

    /// A computed value was read while it was already being computed.
    #[error("cycle detected while computing `{computed}`")]
    CyclicComputation { computed: String },

    /// A computed value tried to write an observable.
    #[error("computed `{computed}` attempted to modify observable `{atom}`")]
    SideEffectInComputed { atom: String, computed: String },

    /// Reactions kept invalidating each other past the configured limit.
    #[error("reactions did not converge after {iterations} iterations")]
    ReactionLoop { iterations: usize },

    /// A reaction body reported a failure.
    #[error("reaction `{reaction}` failed: {message}")]
    Reaction { reaction: String, message: String },

    /// The configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A graph snapshot could not be encoded.
    #[error("failed to encode graph snapshot: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

impl ReactiveError {
    /// Build a [`ReactiveError::Reaction`] from any displayable failure.
    ///
    /// Convenience for reaction bodies that call into fallible user code:
    ///
    /// ```rust,ignore
    /// autorun(move || {
    ///     save(&doc.get()).map_err(|e| ReactiveError::reaction("autosave", e))
    /// })?;
    /// ```
    pub fn reaction(reaction: impl Into<String>, err: impl Display) -> Self {
        Self::Reaction {
            reaction: reaction.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error was produced by the action enforcement policy.
    pub fn is_illegal_mutation(&self) -> bool {
        matches!(self, Self::IllegalMutation { .. })
    }

    /// Whether this error reports a dependency cycle between computeds.
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::CyclicComputation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_error_keeps_message() {
        let err = ReactiveError::reaction("autosave", "disk full");
        assert_eq!(err.to_string(), "reaction `autosave` failed: disk full");
    }

    #[test]
    fn classifiers() {
        let illegal = ReactiveError::IllegalMutation { atom: "title".into() };
        assert!(illegal.is_illegal_mutation());
        assert!(!illegal.is_cycle());

        let cycle = ReactiveError::CyclicComputation { computed: "area".into() };
        assert!(cycle.is_cycle());
    }
}
