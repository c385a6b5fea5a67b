//! Lifecycle hooks.
//!
//! Hooks run around a method invocation in three phases:
//!
//! - [`Phase::Before`] - before the argument pipeline; an error aborts the call
//! - [`Phase::After`] - after the method succeeded and its result was presented
//! - [`Phase::AfterError`] - once, after anything failed
//!
//! A hook is registered under a key `"{phase}.{pattern}"` where the pattern is
//! a dotted glob over method full names (see [`crate::pattern`]). Hooks for
//! one phase run strictly one after another, in registration order of their
//! keys, and within a key in registration order of the callbacks.
//!
//! # Example
//!
//! ```
//! use poplar_api::{ApiError, Hook};
//!
//! // Returning `Err` aborts the current phase.
//! let guard = Hook::sync(|ctx, _method| {
//!     if ctx.args.contains_key("token") {
//!         Ok(())
//!     } else {
//!         Err(ApiError::new("denied"))
//!     }
//! });
//!
//! // Async hooks borrow the context for the duration of the future.
//! let audit = Hook::new(|ctx, method| {
//!     Box::pin(async move {
//!         ctx.options.insert("audited".into(), method.full_name().into());
//!         Ok::<_, ApiError>(())
//!     })
//! });
//! # let _ = (guard, audit);
//! ```

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::context::Context;
use crate::error::{ApiError, RegistrationError};
use crate::method::MethodInvocation;
use crate::pattern::Pattern;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The result of one hook.
pub type HookResult = Result<(), ApiError>;

/// When a hook runs relative to the method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before the method.
    Before,
    /// After the method succeeded.
    After,
    /// After the invocation failed.
    AfterError,
}

impl Phase {
    /// All phases in lifecycle order.
    pub const ALL: [Phase; 3] = [Phase::Before, Phase::After, Phase::AfterError];

    /// The key prefix for this phase.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::After => "after",
            Phase::AfterError => "afterError",
        }
    }

    /// Builds the hook key for `pattern`.
    #[must_use]
    pub fn key(self, pattern: &str) -> String {
        format!("{}.{}", self.as_str(), pattern)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type HookFn = dyn for<'a> Fn(&'a mut Context, &'a MethodInvocation) -> BoxFuture<'a, HookResult>
    + Send
    + Sync;

/// A type-erased hook callback.
///
/// `Ok(())` continues with the next hook, `Err` aborts the phase.
#[derive(Clone)]
pub struct Hook(Arc<HookFn>);

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

impl Hook {
    /// Creates an async hook.
    pub fn new<F>(hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context, &'a MethodInvocation) -> BoxFuture<'a, HookResult>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(hook))
    }

    /// Creates a hook from a synchronous function.
    pub fn sync<F>(hook: F) -> Self
    where
        F: Fn(&mut Context, &MethodInvocation) -> HookResult + Send + Sync + 'static,
    {
        Self::new(move |ctx, method| {
            let result = hook(ctx, method);
            Box::pin(async move { result })
        })
    }

    /// Runs the hook.
    pub fn call<'a>(
        &self,
        ctx: &'a mut Context,
        method: &'a MethodInvocation,
    ) -> BoxFuture<'a, HookResult> {
        (self.0)(ctx, method)
    }
}

#[derive(Debug, Clone)]
struct HookEntry {
    pattern: Pattern,
    hooks: Vec<Hook>,
}

/// Ordered multimap from hook key to callbacks.
///
/// Keys keep the position of their first registration.
#[derive(Debug, Clone, Default)]
pub struct HookTable {
    entries: IndexMap<String, HookEntry>,
}

impl HookTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `hook` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidPattern`] when `key` is not a valid
    /// glob.
    pub fn insert(&mut self, key: impl Into<String>, hook: Hook) -> Result<(), RegistrationError> {
        let key = key.into();
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.hooks.push(hook);
            return Ok(());
        }
        let pattern = Pattern::new(key.clone())?;
        self.entries.insert(
            key,
            HookEntry {
                pattern,
                hooks: vec![hook],
            },
        );
        Ok(())
    }

    /// Appends every callback of `other`, key by key.
    pub fn merge(&mut self, other: &HookTable) {
        for (key, entry) in &other.entries {
            self.entries
                .entry(key.clone())
                .or_insert_with(|| HookEntry {
                    pattern: entry.pattern.clone(),
                    hooks: Vec::new(),
                })
                .hooks
                .extend(entry.hooks.iter().cloned());
        }
    }

    /// Keys matching `phase` for the method `full_name`, in registration order.
    #[must_use]
    pub fn matching_keys(&self, phase: Phase, full_name: &str) -> Vec<String> {
        let target = phase.key(full_name);
        self.entries
            .iter()
            .filter(|(_, entry)| entry.pattern.is_match(&target))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Callbacks registered under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> &[Hook] {
        self.entries
            .get(key)
            .map(|entry| entry.hooks.as_slice())
            .unwrap_or_default()
    }

    /// All keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
