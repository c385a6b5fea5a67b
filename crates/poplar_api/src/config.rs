//! Named configuration values.
//!
//! A [`SharedConfig`] handle can be given to several dispatchers so they see
//! the same values. Each dispatcher also keeps a [`ConfigStore`] of local
//! overrides that is consulted first.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

/// Local key/value overrides. Last write wins.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    values: IndexMap<String, Value>,
}

impl ConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Writes a value, returning the one it replaced.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Removes a value.
    pub fn unset(&mut self, key: &str) -> Option<Value> {
        self.values.shift_remove(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Cheaply clonable handle to configuration shared between dispatchers.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<RwLock<ConfigStore>>);

impl SharedConfig {
    /// Creates an empty shared store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    /// Writes a value, returning the one it replaced.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.write().set(key, value)
    }

    /// Removes a value.
    pub fn unset(&self, key: &str) -> Option<Value> {
        self.0.write().unset(key)
    }

    /// Whether both handles point at the same store.
    #[must_use]
    pub fn ptr_eq(&self, other: &SharedConfig) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
