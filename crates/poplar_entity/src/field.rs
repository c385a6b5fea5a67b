use core::fmt;
use std::sync::Arc;

use poplar_types::TypeSpec;
use serde_json::{Map, Value};

use crate::entity::Entity;

/// Error type returned by computed fields.
pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

/// A computed field: `(source, options) -> value`.
pub type FieldFn = Arc<dyn Fn(&Value, &Map<String, Value>) -> Result<Value, BoxError> + Send + Sync>;

/// A field condition: `(source, options) -> include field`.
pub type Condition = Arc<dyn Fn(&Value, &Map<String, Value>) -> bool + Send + Sync>;

/// Options for an entity field.
#[derive(Clone, Default)]
pub struct FieldOptions {
    pub(crate) as_name: Option<String>,
    pub(crate) value: Option<Value>,
    pub(crate) default: Option<Value>,
    pub(crate) condition: Option<Condition>,
    pub(crate) using: Option<Arc<Entity>>,
    pub(crate) type_hint: Option<TypeSpec>,
}

impl FieldOptions {
    /// Empty options: the field aliases the source key of the same name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits the field under `name` instead, still reading the declared key.
    #[must_use]
    pub fn as_name(mut self, name: impl Into<String>) -> Self {
        self.as_name = Some(name.into());
        self
    }

    /// Emits a fixed value.
    #[must_use]
    pub fn value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Substituted when the computed value is `null`.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Only emits the field when `condition` holds for the source.
    #[must_use]
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Value, &Map<String, Value>) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Shapes the value through a nested entity.
    #[must_use]
    pub fn using(mut self, entity: impl Into<Arc<Entity>>) -> Self {
        self.using = Some(entity.into());
        self
    }

    /// Coerces the value to a declared type.
    #[must_use]
    pub fn with_type(mut self, ty: impl Into<TypeSpec>) -> Self {
        self.type_hint = Some(ty.into());
        self
    }
}

impl fmt::Debug for FieldOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldOptions")
            .field("as_name", &self.as_name)
            .field("value", &self.value)
            .field("default", &self.default)
            .field("condition", &self.condition.is_some())
            .field("using", &self.using)
            .field("type_hint", &self.type_hint)
            .finish()
    }
}

/// How a field obtains its raw value.
#[derive(Clone)]
pub(crate) enum FieldKind {
    /// Reads a single source key.
    Alias(String),
    /// A fixed value.
    Value(Value),
    /// Computed from the source.
    Function(FieldFn),
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias(key) => f.debug_tuple("Alias").field(key).finish(),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// One resolved output field.
#[derive(Clone)]
pub(crate) struct FieldMapping {
    pub(crate) kind: FieldKind,
    pub(crate) default: Value,
    pub(crate) condition: Option<Condition>,
    pub(crate) using: Option<Arc<Entity>>,
    pub(crate) type_hint: Option<TypeSpec>,
}

impl fmt::Debug for FieldMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMapping")
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("condition", &self.condition.is_some())
            .field("using", &self.using)
            .field("type_hint", &self.type_hint)
            .finish()
    }
}
