//! Per-invocation state tracking.
//!
//! A [`StateManager`] records which lifecycle phase an invocation is in. The
//! state is advisory: hooks can observe it and listeners are told about every
//! transition, but execution order never depends on it.

use core::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::pattern;

/// Name of the state every invocation starts in.
pub const INITIAL_STATE: &str = "initial";

/// A recorded transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    /// The state left behind.
    pub previous: String,
    /// The state entered.
    pub current: String,
    /// Parameters of the state left behind.
    pub previous_params: Map<String, Value>,
    /// Parameters of the state entered.
    pub params: Map<String, Value>,
}

/// Listener notified on every transition.
pub type StateListener = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// State machine attached to one invocation context.
#[derive(Clone)]
pub struct StateManager {
    state: String,
    params: Map<String, Value>,
    previous: String,
    previous_params: Map<String, Value>,
    listeners: Vec<StateListener>,
}

impl fmt::Debug for StateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateManager")
            .field("state", &self.state)
            .field("params", &self.params)
            .field("previous", &self.previous)
            .field("previous_params", &self.previous_params)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    /// Starts in [`INITIAL_STATE`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(INITIAL_STATE, Map::new())
    }

    /// Starts in the given state.
    pub fn with_state(state: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            state: state.into(),
            params,
            previous: String::new(),
            previous_params: Map::new(),
            listeners: Vec::new(),
        }
    }

    /// The current state.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.state
    }

    /// Parameters of the current state.
    #[must_use]
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// The previous state, empty before the first transition.
    #[must_use]
    pub fn previous(&self) -> &str {
        &self.previous
    }

    /// Parameters of the previous state.
    #[must_use]
    pub fn previous_params(&self) -> &Map<String, Value> {
        &self.previous_params
    }

    /// Whether the current state matches a dotted glob.
    #[must_use]
    pub fn is(&self, pattern: &str) -> bool {
        pattern::matches(pattern, &self.state)
    }

    /// Whether the previous state matches a dotted glob.
    #[must_use]
    pub fn is_from(&self, pattern: &str) -> bool {
        pattern::matches(pattern, &self.previous)
    }

    /// Registers a transition listener.
    pub fn on_change<F>(&mut self, listener: F)
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Moves to `state` and notifies listeners.
    pub fn transition_to(&mut self, state: impl Into<String>, params: Map<String, Value>) {
        let state = state.into();
        tracing::trace!(from = %self.state, to = %state, "state transition");

        self.previous = core::mem::replace(&mut self.state, state);
        self.previous_params = core::mem::replace(&mut self.params, params);

        if self.listeners.is_empty() {
            return;
        }
        let change = StateChange {
            previous: self.previous.clone(),
            current: self.state.clone(),
            previous_params: self.previous_params.clone(),
            params: self.params.clone(),
        };
        for listener in &self.listeners {
            listener(&change);
        }
    }
}
