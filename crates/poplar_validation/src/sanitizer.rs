//! The sanitization engine.

use std::sync::{Arc, LazyLock};

use hashbrown::HashMap;
use parking_lot::RwLock;
use poplar_types::value::is_blank;
use serde_json::{Map, Value};

use crate::arg::{ArgSpec, SanitizerOption};
use crate::builtin;

/// Error raised by a sanitizer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SanitizeError(String);

impl SanitizeError {
    /// Creates an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// A named sanitizer: `(value, declared args) -> new value`.
pub type SanitizerFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, SanitizeError> + Send + Sync>;

static SANITIZERS: LazyLock<RwLock<HashMap<String, SanitizerFn>>> = LazyLock::new(|| {
    RwLock::new(
        builtin::sanitizers()
            .into_iter()
            .map(|(name, sanitizer)| (name.to_string(), sanitizer))
            .collect(),
    )
});

/// Registers a named sanitizer, replacing any existing one.
pub fn extend<F>(name: impl Into<String>, sanitizer: F)
where
    F: Fn(&Value, &[Value]) -> Result<Value, SanitizeError> + Send + Sync + 'static,
{
    let name = name.into();
    tracing::debug!(sanitizer = %name, "registering sanitizer");
    SANITIZERS.write().insert(name, Arc::new(sanitizer));
}

/// Looks up a named sanitizer.
#[must_use]
pub fn sanitizer(name: &str) -> Option<SanitizerFn> {
    SANITIZERS.read().get(name).cloned()
}

/// Sanitizes `params` in place.
///
/// Each argument's sanitizers run in declaration order, each one consuming the
/// previous one's output. Blank values are left alone. A failing sanitizer is
/// logged and leaves the value as it was before that step.
pub fn sanitize(params: &mut Map<String, Value>, accepts: &[ArgSpec]) {
    for spec in accepts {
        if spec.sanitizers().is_empty() {
            continue;
        }
        let field = spec.name();
        let Some(mut current) = params.get(field).filter(|v| !is_blank(v)).cloned() else {
            continue;
        };

        for (name, option) in spec.sanitizers() {
            let outcome = match option {
                SanitizerOption::Enabled(false) => continue,
                SanitizerOption::Custom(custom) => custom(current.clone(), params).map(Some),
                SanitizerOption::Enabled(true) => apply_named(name, &current, &[]),
                SanitizerOption::Args(args) => apply_named(name, &current, args),
            };
            match outcome {
                Ok(Some(next)) => current = next,
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(sanitizer = %name, field = %field, %error, "sanitizer failed");
                }
            }
        }

        params.insert(field.to_string(), current);
    }
}

fn apply_named(name: &str, value: &Value, args: &[Value]) -> Result<Option<Value>, SanitizeError> {
    match sanitizer(name) {
        Some(sanitizer) => sanitizer(value, args).map(Some),
        None => {
            tracing::debug!(sanitizer = %name, "unknown sanitizer, skipping");
            Ok(None)
        }
    }
}
