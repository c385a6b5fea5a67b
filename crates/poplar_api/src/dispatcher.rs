//! The top-level dispatcher.
//!
//! A [`Dispatcher`] aggregates registries and global hooks and drives the
//! invocation lifecycle:
//!
//! ```text
//! initial ─► before.{name} ─► {name} ─► after.{name} ─► done
//!                 │              │            │
//!                 └──────────────┴────────────┴──► afterError.{name} ─► failed
//! ```
//!
//! Hook resolution is precomputed per method whenever registries or hooks
//! change, so a call only looks up its hook keys.

use std::borrow::Cow;

use hashbrown::HashMap;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::config::{ConfigStore, SharedConfig};
use crate::context::Context;
use crate::error::{ApiError, RegistrationError};
use crate::hooks::{Hook, HookResult, HookTable, Phase};
use crate::method::{MethodDefinition, MethodInvocation};
use crate::registry::MethodRegistry;

/// Resolved hook keys of one method, indexed by phase.
type PhaseKeys = [Vec<String>; 3];

fn slot(phase: Phase) -> usize {
    match phase {
        Phase::Before => 0,
        Phase::After => 1,
        Phase::AfterError => 2,
    }
}

/// Aggregates registries and hooks and runs invocations.
#[derive(Debug, Default)]
pub struct Dispatcher {
    registries: IndexMap<String, MethodRegistry>,
    methods: IndexMap<String, MethodDefinition>,
    hooks: HookTable,
    index: HashMap<String, PhaseKeys>,
    local: ConfigStore,
    shared: SharedConfig,
}

impl Dispatcher {
    /// Creates a dispatcher with its own shared configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher that reads and writes `shared`.
    #[must_use]
    pub fn with_shared_config(shared: SharedConfig) -> Self {
        Self {
            shared,
            ..Self::default()
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Takes ownership of a registry: merges its hooks and records its
    /// methods under their full names.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::DuplicateRegistry`] when a registry with
    /// the same name is already used, or the registry's hook table errors.
    pub fn use_registry(&mut self, registry: MethodRegistry) -> Result<&mut Self, RegistrationError> {
        let name = registry.name().to_string();
        if self.registries.contains_key(&name) {
            return Err(RegistrationError::DuplicateRegistry(name));
        }

        self.hooks.merge(&registry.hook_table()?);
        for method in registry.methods() {
            let full_name = method.full_name();
            if self.methods.contains_key(&full_name) {
                tracing::warn!(method = %full_name, "method already dispatched, overriding");
            }
            self.methods.insert(full_name, method.clone());
        }
        tracing::debug!(registry = %name, methods = registry.methods().count(), "registry in use");

        self.registries.insert(name, registry);
        self.rebuild_index();
        Ok(self)
    }

    /// Registers a global hook run before methods matching any of `patterns`.
    /// Patterns are matched against full names.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidPattern`] for an invalid glob.
    pub fn before<I, S>(&mut self, patterns: I, hook: Hook) -> Result<&mut Self, RegistrationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(Phase::Before, patterns, hook)
    }

    /// Registers a global hook run after matching methods succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidPattern`] for an invalid glob.
    pub fn after<I, S>(&mut self, patterns: I, hook: Hook) -> Result<&mut Self, RegistrationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(Phase::After, patterns, hook)
    }

    /// Registers a global hook run after matching invocations failed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidPattern`] for an invalid glob.
    pub fn after_error<I, S>(&mut self, patterns: I, hook: Hook) -> Result<&mut Self, RegistrationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(Phase::AfterError, patterns, hook)
    }

    fn register<I, S>(&mut self, phase: Phase, patterns: I, hook: Hook) -> Result<&mut Self, RegistrationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for pattern in patterns {
            self.hooks.insert(phase.key(&pattern.into()), hook.clone())?;
        }
        self.rebuild_index();
        Ok(self)
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .methods
            .keys()
            .map(|full_name| {
                let keys = Phase::ALL.map(|phase| self.hooks.matching_keys(phase, full_name));
                (full_name.clone(), keys)
            })
            .collect();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────────

    /// A registry by name.
    #[must_use]
    pub fn registry(&self, name: &str) -> Option<&MethodRegistry> {
        self.registries.get(name)
    }

    /// Every dispatched method, by full name.
    #[must_use]
    pub fn all_methods(&self) -> &IndexMap<String, MethodDefinition> {
        &self.methods
    }

    /// A fresh invocation of the method `full_name`.
    #[must_use]
    pub fn method(&self, full_name: &str) -> Option<MethodInvocation> {
        self.methods.get(full_name).map(MethodDefinition::invocation)
    }

    /// The combined hook table.
    #[must_use]
    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    /// Hook keys that apply to `full_name` in `phase`, in registration order.
    #[must_use]
    pub fn hooks_for(&self, phase: Phase, full_name: &str) -> Cow<'_, [String]> {
        match self.index.get(full_name) {
            Some(keys) => Cow::Borrowed(keys[slot(phase)].as_slice()),
            None => Cow::Owned(self.hooks.matching_keys(phase, full_name)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Invocation
    // ─────────────────────────────────────────────────────────────────────────

    /// Looks up `full_name` and runs it through the full lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MethodNotFound`] for an unknown method, otherwise
    /// whatever [`invoke_method_in_context`](Self::invoke_method_in_context)
    /// returns.
    pub async fn invoke(&self, full_name: &str, ctx: &mut Context) -> Result<(), ApiError> {
        let Some(mut method) = self.method(full_name) else {
            let error = ApiError::MethodNotFound(full_name.to_string());
            ctx.error = Some(error.clone());
            return Err(error);
        };
        self.invoke_method_in_context(&mut method, ctx).await
    }

    /// Runs before hooks, the method and after hooks, and on any failure the
    /// after-error hooks, exactly once.
    ///
    /// On success the presented result is in `ctx.result`. On failure
    /// `ctx.error` holds the delivered error.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a hook or the method. An error from
    /// an after-error hook replaces it.
    pub async fn invoke_method_in_context(
        &self,
        method: &mut MethodInvocation,
        ctx: &mut Context,
    ) -> Result<(), ApiError> {
        let full_name = method.full_name();
        let Err(error) = self.run(&full_name, method, ctx).await else {
            return Ok(());
        };

        tracing::debug!(method = %full_name, %error, "invocation failed");
        ctx.error = Some(error.clone());
        ctx.state.transition_to(Phase::AfterError.key(&full_name), Map::new());
        if let Err(hook_error) = self.run_hooks(Phase::AfterError, &full_name, ctx, method).await {
            tracing::debug!(method = %full_name, error = %hook_error, "after-error hook failed");
            ctx.error = Some(hook_error.clone());
            return Err(hook_error);
        }
        Err(error)
    }

    async fn run(&self, full_name: &str, method: &mut MethodInvocation, ctx: &mut Context) -> Result<(), ApiError> {
        ctx.state.transition_to(Phase::Before.key(full_name), Map::new());
        self.run_hooks(Phase::Before, full_name, ctx, method).await?;

        ctx.state.transition_to(full_name, Map::new());
        method.invoke(ctx).await?;

        ctx.state.transition_to(Phase::After.key(full_name), Map::new());
        self.run_hooks(Phase::After, full_name, ctx, method).await
    }

    async fn run_hooks(
        &self,
        phase: Phase,
        full_name: &str,
        ctx: &mut Context,
        method: &MethodInvocation,
    ) -> HookResult {
        let keys = self.hooks_for(phase, full_name);
        for key in keys.iter() {
            for hook in self.hooks.get(key) {
                hook.call(ctx, method).await?;
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────────

    /// Reads a configuration value, local overrides first.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.local.get(key).cloned().or_else(|| self.shared.get(key))
    }

    /// Writes a shared configuration value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.shared.set(key, value);
        self
    }

    /// Writes a configuration value visible to this dispatcher only.
    pub fn set_local(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.local.set(key, value);
        self
    }

    /// Removes a configuration value, locally and shared.
    pub fn unset(&mut self, key: &str) -> &mut Self {
        self.local.unset(key);
        self.shared.unset(key);
        self
    }

    /// The shared configuration handle.
    #[must_use]
    pub fn shared_config(&self) -> &SharedConfig {
        &self.shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Handler;
    use serde_json::json;

    fn users() -> MethodRegistry {
        let mut registry = MethodRegistry::new("users").unwrap();
        registry
            .define(MethodDefinition::new("info", Handler::sync(|_| Ok(json!("info")))).unwrap())
            .unwrap();
        registry
    }

    #[test]
    fn registries_are_used_once() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.use_registry(users()).unwrap();
        assert_eq!(
            dispatcher.use_registry(users()).err(),
            Some(RegistrationError::DuplicateRegistry("users".into()))
        );
        assert!(dispatcher.method("users.info").is_some());
        assert!(dispatcher.registry("users").is_some());
        assert_eq!(dispatcher.all_methods().keys().collect::<Vec<_>>(), ["users.info"]);
    }

    #[test]
    fn index_follows_late_hooks() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.use_registry(users()).unwrap();
        assert!(dispatcher.hooks_for(Phase::Before, "users.info").is_empty());

        dispatcher.before(["**"], Hook::sync(|_, _| Ok(()))).unwrap();
        assert_eq!(dispatcher.hooks_for(Phase::Before, "users.info").as_ref(), ["before.**"]);
        assert!(matches!(dispatcher.hooks_for(Phase::Before, "posts.list"), Cow::Owned(_)));
    }

    #[test]
    fn local_config_shadows_shared() {
        let shared = SharedConfig::new();
        let mut a = Dispatcher::with_shared_config(shared.clone());
        let b = Dispatcher::with_shared_config(shared);

        a.set("limit", json!(10));
        assert_eq!(b.get("limit"), Some(json!(10)));

        a.set_local("limit", json!(5));
        assert_eq!(a.get("limit"), Some(json!(5)));
        assert_eq!(b.get("limit"), Some(json!(10)));

        a.unset("limit");
        assert_eq!(a.get("limit"), None);
        assert_eq!(b.get("limit"), None);
    }

    #[tokio::test]
    async fn unknown_methods_fail() {
        let dispatcher = Dispatcher::new();
        let mut ctx = Context::default();
        let error = dispatcher.invoke("nope.nope", &mut ctx).await.unwrap_err();
        assert_eq!(error, ApiError::MethodNotFound("nope.nope".into()));
        assert_eq!(ctx.error, Some(error));
    }
}
