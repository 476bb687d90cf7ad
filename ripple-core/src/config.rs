//! Runtime Configuration
//!
//! Process-wide policy for the reactive runtime. Unlike the runtime state,
//! which lives in a thread-local slot, configuration is shared by every
//! thread and guarded by a global lock.
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::{configure, ReactiveConfig};
//!
//! configure(ReactiveConfig::default().with_enforce_actions(true));
//! ```

use std::sync::OnceLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default bound on flush passes before a reaction loop is reported.
pub const DEFAULT_MAX_REACTION_ITERATIONS: usize = 100;

/// When observable writes must happen inside an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "EnforceActionsRepr", rename_all = "lowercase")]
pub enum EnforceActions {
    /// Writes are allowed anywhere.
    #[default]
    Never,

    /// Writes to observables that currently have observers need an action.
    Observed,

    /// Every write needs an action.
    Always,
}

impl From<bool> for EnforceActions {
    fn from(enforce: bool) -> Self {
        if enforce {
            Self::Always
        } else {
            Self::Never
        }
    }
}

/// Accepts both `true`/`false` and the named modes when deserializing.
#[derive(Deserialize)]
#[serde(untagged)]
enum EnforceActionsRepr {
    Flag(bool),
    Mode(EnforceActionsMode),
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum EnforceActionsMode {
    Never,
    Observed,
    Always,
}

impl From<EnforceActionsRepr> for EnforceActions {
    fn from(repr: EnforceActionsRepr) -> Self {
        match repr {
            EnforceActionsRepr::Flag(flag) => flag.into(),
            EnforceActionsRepr::Mode(EnforceActionsMode::Never) => Self::Never,
            EnforceActionsRepr::Mode(EnforceActionsMode::Observed) => Self::Observed,
            EnforceActionsRepr::Mode(EnforceActionsMode::Always) => Self::Always,
        }
    }
}

/// Process-wide runtime policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReactiveConfig {
    /// Whether observable writes must happen inside an action.
    pub enforce_actions: EnforceActions,

    /// How many flush passes may run before reactions are considered to be
    /// invalidating each other forever.
    pub max_reaction_iterations: usize,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            enforce_actions: EnforceActions::Never,
            max_reaction_iterations: DEFAULT_MAX_REACTION_ITERATIONS,
        }
    }
}

impl ReactiveConfig {
    /// Set the action enforcement mode. Accepts a bool or an [`EnforceActions`].
    pub fn with_enforce_actions(mut self, enforce: impl Into<EnforceActions>) -> Self {
        self.enforce_actions = enforce.into();
        self
    }

    /// Set the reaction iteration limit.
    pub fn with_max_reaction_iterations(mut self, iterations: usize) -> Self {
        self.max_reaction_iterations = iterations.max(1);
        self
    }

    /// Parse a configuration from JSON, e.g. `{"enforceActions": "observed"}`.
    ///
    /// Missing keys fall back to their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        let iterations = config.max_reaction_iterations;
        Ok(config.with_max_reaction_iterations(iterations))
    }
}

static CONFIG: OnceLock<RwLock<ReactiveConfig>> = OnceLock::new();

fn global() -> &'static RwLock<ReactiveConfig> {
    CONFIG.get_or_init(|| RwLock::new(ReactiveConfig::default()))
}

/// Replace the process-wide configuration.
pub fn configure(config: ReactiveConfig) {
    tracing::debug!(?config, "reactive runtime configured");
    *global().write() = config;
}

/// A copy of the current process-wide configuration.
pub fn current_config() -> ReactiveConfig {
    global().read().clone()
}

/// Restore the default configuration.
pub fn reset_config() {
    configure(ReactiveConfig::default());
}
