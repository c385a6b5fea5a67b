//! Named collections of methods and their hooks.
//!
//! A [`MethodRegistry`] groups method definitions under a registry name and
//! carries hooks whose patterns are relative to that name. Registries are
//! built at startup and handed to a [`Dispatcher`](crate::Dispatcher).
//!
//! ```
//! use poplar_api::{Handler, Hook, MethodDefinition, MethodRegistry};
//! use serde_json::json;
//!
//! let mut users = MethodRegistry::new("users").unwrap();
//! users
//!     .define(MethodDefinition::new("info", Handler::sync(|_| Ok(json!({"id": 1})))).unwrap())
//!     .unwrap()
//!     .define(MethodDefinition::new("list", Handler::sync(|_| Ok(json!([])))).unwrap())
//!     .unwrap();
//! users.before(["*"], Hook::sync(|_, _| Ok(()))).unwrap();
//!
//! users.prepend("list", "info").unwrap();
//! assert_eq!(users.names().collect::<Vec<_>>(), ["list", "info"]);
//! ```

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::RegistrationError;
use crate::hooks::{Hook, HookTable, Phase};
use crate::method::{MethodDefinition, is_valid_name};
use crate::pattern::Pattern;

/// What [`MethodRegistry::define`] does with a name that is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedefinePolicy {
    /// Replace the existing definition in place and log a warning.
    #[default]
    Override,
    /// Fail with [`RegistrationError::DuplicateMethod`].
    Reject,
}

#[derive(Debug, Clone)]
struct RegisteredHook {
    phase: Phase,
    pattern: String,
    hook: Hook,
}

/// A named set of method definitions plus hooks scoped to that name.
#[derive(Debug, Clone)]
pub struct MethodRegistry {
    name: String,
    options: Map<String, Value>,
    policy: RedefinePolicy,
    methods: IndexMap<String, MethodDefinition>,
    hooks: Vec<RegisteredHook>,
}

impl MethodRegistry {
    /// Creates a registry.
    ///
    /// The empty name is allowed: its methods and hooks are addressed without
    /// a registry prefix.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidName`] for a non-empty name outside
    /// `[A-Za-z0-9_]+`.
    pub fn new(name: impl Into<String>) -> Result<Self, RegistrationError> {
        let name = name.into();
        if !name.is_empty() && !is_valid_name(&name) {
            return Err(RegistrationError::InvalidName(name));
        }
        Ok(Self {
            name,
            options: Map::new(),
            policy: RedefinePolicy::default(),
            methods: IndexMap::new(),
            hooks: Vec::new(),
        })
    }

    /// Sets free-form registry options.
    #[must_use]
    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    /// Sets the redefinition policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RedefinePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The registry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry options.
    #[must_use]
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// `options.basePath` when it is a string, otherwise the registry name.
    #[must_use]
    pub fn base_path(&self) -> &str {
        self.options
            .get("basePath")
            .and_then(Value::as_str)
            .unwrap_or(&self.name)
    }

    /// The redefinition policy.
    #[must_use]
    pub fn policy(&self) -> RedefinePolicy {
        self.policy
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Adds a method, binding it to this registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::DuplicateMethod`] when the name is taken
    /// and the policy is [`RedefinePolicy::Reject`].
    pub fn define(&mut self, mut method: MethodDefinition) -> Result<&mut Self, RegistrationError> {
        let name = method.name().to_string();
        if self.methods.contains_key(&name) {
            match self.policy {
                RedefinePolicy::Reject => {
                    return Err(RegistrationError::DuplicateMethod {
                        registry: self.name.clone(),
                        method: name,
                    });
                }
                RedefinePolicy::Override => {
                    tracing::warn!(registry = %self.name, method = %name, "method redefined");
                }
            }
        }
        method.bind(&self.name);
        self.methods.insert(name, method);
        Ok(self)
    }

    /// Removes a method.
    pub fn undefine(&mut self, name: &str) -> Option<MethodDefinition> {
        self.methods.shift_remove(name)
    }

    /// Looks up a method by name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodDefinition> {
        self.methods.get(name)
    }

    /// Methods in order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDefinition> {
        self.methods.values()
    }

    /// Method names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Moves `name` to sit immediately before `before`.
    ///
    /// Every other method keeps its relative position.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::MethodNotFound`] when either name is not
    /// defined.
    pub fn prepend(&mut self, name: &str, before: &str) -> Result<(), RegistrationError> {
        let index_of = |method: &str| {
            self.methods
                .get_index_of(method)
                .ok_or_else(|| RegistrationError::MethodNotFound {
                    registry: self.name.clone(),
                    method: method.to_string(),
                })
        };
        let from = index_of(name)?;
        let to = index_of(before)?;
        if from < to {
            self.methods.move_index(from, to - 1);
        } else {
            self.methods.move_index(from, to);
        }
        Ok(())
    }

    /// Takes over the name, options, methods and hooks of `other`.
    ///
    /// Methods are cloned and rebound here, and methods already defined
    /// follow the new name. Hooks keep their relative patterns and therefore
    /// apply under this registry's name.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`define`](Self::define).
    pub fn extend(&mut self, other: &MethodRegistry) -> Result<(), RegistrationError> {
        self.name.clone_from(&other.name);
        self.options.clone_from(&other.options);
        for method in self.methods.values_mut() {
            method.bind(&other.name);
        }
        for method in other.methods.values() {
            self.define(method.clone())?;
        }
        self.hooks.extend(other.hooks.iter().cloned());
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hooks
    // ─────────────────────────────────────────────────────────────────────────

    /// Runs `hook` before methods matching any of `patterns`.
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

    /// Runs `hook` after methods matching any of `patterns` succeeded.
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

    /// Runs `hook` after invocations of methods matching any of `patterns`
    /// failed.
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
            let pattern = pattern.into();
            Pattern::new(self.hook_key(phase, &pattern))?;
            self.hooks.push(RegisteredHook {
                phase,
                pattern,
                hook: hook.clone(),
            });
        }
        Ok(self)
    }

    fn hook_key(&self, phase: Phase, pattern: &str) -> String {
        if self.name.is_empty() {
            phase.key(pattern)
        } else {
            phase.key(&format!("{}.{pattern}", self.name))
        }
    }

    /// Keys of every registered hook, in registration order.
    pub fn hook_keys(&self) -> impl Iterator<Item = String> + '_ {
        self.hooks.iter().map(|entry| self.hook_key(entry.phase, &entry.pattern))
    }

    /// Builds the hook table with fully qualified keys.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidPattern`] for an invalid glob.
    pub fn hook_table(&self) -> Result<HookTable, RegistrationError> {
        let mut table = HookTable::new();
        for entry in &self.hooks {
            table.insert(self.hook_key(entry.phase, &entry.pattern), entry.hook.clone())?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Handler;
    use serde_json::json;

    fn method(name: &str, value: Value) -> MethodDefinition {
        MethodDefinition::new(name, Handler::sync(move |_| Ok(value.clone()))).unwrap()
    }

    fn noop() -> Hook {
        Hook::sync(|_, _| Ok(()))
    }

    #[test]
    fn define_binds_the_registry() {
        let mut registry = MethodRegistry::new("users").unwrap();
        registry.define(method("info", json!(1))).unwrap();
        let info = registry.method("info").unwrap();
        assert_eq!(info.registry(), Some("users"));
        assert_eq!(info.full_name(), "users.info");
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert!(MethodRegistry::new("").is_ok());
        assert_eq!(
            MethodRegistry::new("my-users").err(),
            Some(RegistrationError::InvalidName("my-users".into()))
        );
    }

    #[test]
    fn redefinition_follows_policy() {
        let mut registry = MethodRegistry::new("users").unwrap();
        registry.define(method("info", json!(1))).unwrap();
        registry.define(method("list", json!(2))).unwrap();
        registry.define(method("info", json!(3))).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["info", "list"]);

        let mut strict = MethodRegistry::new("users")
            .unwrap()
            .with_policy(RedefinePolicy::Reject);
        strict.define(method("info", json!(1))).unwrap();
        assert_eq!(
            strict.define(method("info", json!(2))).err(),
            Some(RegistrationError::DuplicateMethod {
                registry: "users".into(),
                method: "info".into(),
            })
        );
    }

    #[test]
    fn prepend_requires_both_methods() {
        let mut registry = MethodRegistry::new("users").unwrap();
        registry.define(method("info", json!(1))).unwrap();
        assert!(matches!(
            registry.prepend("info", "nope"),
            Err(RegistrationError::MethodNotFound { .. })
        ));
        assert!(registry.prepend("info", "info").is_ok());
    }

    #[test]
    fn hook_keys_are_qualified() {
        let mut registry = MethodRegistry::new("users").unwrap();
        registry.before(["*", "info"], noop()).unwrap();
        registry.after_error(["**"], noop()).unwrap();
        assert_eq!(
            registry.hook_keys().collect::<Vec<_>>(),
            ["before.users.*", "before.users.info", "afterError.users.**"]
        );

        let mut root = MethodRegistry::new("").unwrap();
        root.after(["ping"], noop()).unwrap();
        assert_eq!(root.hook_keys().collect::<Vec<_>>(), ["after.ping"]);
        assert!(root.before(["[bad"], noop()).is_err());
    }

    #[test]
    fn base_path_defaults_to_name() {
        let registry = MethodRegistry::new("users").unwrap();
        assert_eq!(registry.base_path(), "users");

        let mut options = Map::new();
        options.insert("basePath".into(), json!("/api/users"));
        let registry = registry.with_options(options);
        assert_eq!(registry.base_path(), "/api/users");
    }
}
