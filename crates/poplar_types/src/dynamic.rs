//! Named type conversion.
//!
//! A [`TypeRegistry`] maps type names to [`Converter`] functions. Method
//! arguments and entity fields name their declared type, and the registry
//! coerces raw values into that type before they reach business code.
//!
//! The registry used by the invocation pipeline is process-wide; [`define`],
//! [`undefine`], [`can_convert`] and [`convert`] operate on it.
//!
//! # Built-in Converters
//!
//! | Name | Behavior |
//! |------|----------|
//! | `number` | Falsy values pass through, everything else goes through `Number()` (unparsable input becomes `null`) |
//! | `date` | Parses timestamps and date strings into ISO strings; unparsable input becomes `"Invalid Date"` |
//! | `string` | Strings and falsy values pass through, everything else is stringified |
//! | `boolean` | `"false"`, `"undefined"`, `"null"`, `"0"` and `""` are false, other strings true; `0` is false |
//! | `object` | JSON-decodes string input into an object or array |
//! | `buffer` | Passthrough |
//! | `any` | Identity |
//!
//! # Example
//!
//! ```
//! use poplar_types::{TypeSpec, dynamic};
//! use serde_json::{Map, json};
//!
//! dynamic::define("addOne", |value, _options| {
//!     let number = poplar_types::value::parse_js_number(&poplar_types::value::js_string(&value));
//!     Ok(poplar_types::value::number_value(number + 1.0))
//! });
//!
//! let value = dynamic::convert(json!("12"), &TypeSpec::scalar("addOne"), &Map::new())?;
//! assert_eq!(value, json!(13));
//! # dynamic::undefine("addOne");
//! # Ok::<(), poplar_types::ConvertError>(())
//! ```

use std::sync::{Arc, LazyLock};

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::spec::TypeSpec;
use crate::value::{
    INVALID_DATE, format_date, is_truthy, js_string, number_value, parse_date, parse_js_number,
};

/// A type conversion function.
///
/// Receives the raw value and the invocation options.
pub type Converter =
    Arc<dyn Fn(Value, &Map<String, Value>) -> Result<Value, ConvertError> + Send + Sync>;

/// Errors raised while converting a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    /// No converter is registered under the requested type name.
    #[error("no type converter defined for '{0}'")]
    NoConverter(String),

    /// The converter rejected the value.
    #[error("invalid value for type '{type_name}': {message}")]
    Invalid {
        /// The target type name.
        type_name: String,
        /// Why the value was rejected.
        message: String,
    },
}

impl ConvertError {
    /// Creates an [`Invalid`](Self::Invalid) error.
    pub fn invalid(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

/// Registry of named type converters.
#[derive(Clone)]
pub struct TypeRegistry {
    converters: HashMap<String, Converter>,
}

impl core::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut names: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("TypeRegistry")
            .field("converters", &names)
            .finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TypeRegistry {
    /// Creates a registry without any converters.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Creates a registry holding the built-in converters.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.define("number", |value, _| Ok(convert_number(value)));
        registry.define("date", |value, _| Ok(convert_date(value)));
        registry.define("string", |value, _| Ok(convert_string(value)));
        registry.define("boolean", |value, _| Ok(Value::Bool(convert_boolean(&value))));
        registry.define("object", |value, _| convert_object(value));
        registry.define("buffer", |value, _| Ok(value));
        registry.define("any", |value, _| Ok(value));
        registry
    }

    /// Registers a converter, replacing any previous one with the same name.
    pub fn define<F>(&mut self, name: impl Into<String>, converter: F) -> &mut Self
    where
        F: Fn(Value, &Map<String, Value>) -> Result<Value, ConvertError> + Send + Sync + 'static,
    {
        self.converters.insert(name.into(), Arc::new(converter));
        self
    }

    /// Removes a converter. Returns whether one was registered.
    pub fn undefine(&mut self, name: &str) -> bool {
        self.converters.remove(name).is_some()
    }

    /// Returns the converter registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Converter> {
        self.converters.get(name).cloned()
    }

    /// Whether a converter is registered under `name`.
    #[must_use]
    pub fn can_convert(&self, name: &str) -> bool {
        self.converters.contains_key(name)
    }

    /// Converts `value` into the given type.
    ///
    /// List types wrap non-array input into a single element array first
    /// (`null` and `""` become an empty array) and convert element-wise.
    /// Array input to a scalar type is also converted element-wise.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::NoConverter`] when the type is unknown, or the
    /// converter's own error.
    pub fn convert(
        &self,
        value: Value,
        spec: &TypeSpec,
        options: &Map<String, Value>,
    ) -> Result<Value, ConvertError> {
        let converter = self
            .get(spec.name())
            .ok_or_else(|| ConvertError::NoConverter(spec.name().to_string()))?;
        apply(&converter, value, spec.is_list(), options)
    }
}

fn apply(
    converter: &Converter,
    value: Value,
    list: bool,
    options: &Map<String, Value>,
) -> Result<Value, ConvertError> {
    let value = if list {
        match value {
            Value::Array(items) => Value::Array(items),
            Value::Null => Value::Array(Vec::new()),
            Value::String(text) if text.is_empty() => Value::Array(Vec::new()),
            other => Value::Array(vec![other]),
        }
    } else {
        value
    };

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| converter(item, options))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => converter(other, options),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Process-wide registry
// ─────────────────────────────────────────────────────────────────────────────

static GLOBAL: LazyLock<RwLock<TypeRegistry>> =
    LazyLock::new(|| RwLock::new(TypeRegistry::with_builtins()));

/// Registers a converter in the process-wide registry.
pub fn define<F>(name: impl Into<String>, converter: F)
where
    F: Fn(Value, &Map<String, Value>) -> Result<Value, ConvertError> + Send + Sync + 'static,
{
    let name = name.into();
    tracing::debug!(type_name = %name, "defining type converter");
    GLOBAL.write().define(name, converter);
}

/// Removes a converter from the process-wide registry.
pub fn undefine(name: &str) -> bool {
    GLOBAL.write().undefine(name)
}

/// Whether the process-wide registry can convert to `name`.
#[must_use]
pub fn can_convert(name: &str) -> bool {
    GLOBAL.read().can_convert(name)
}

/// Returns a converter from the process-wide registry.
#[must_use]
pub fn converter(name: &str) -> Option<Converter> {
    GLOBAL.read().get(name)
}

/// Converts a value with the process-wide registry.
///
/// The registry lock is released before the converter runs, so converters may
/// themselves call [`convert`].
///
/// # Errors
///
/// See [`TypeRegistry::convert`].
pub fn convert(
    value: Value,
    spec: &TypeSpec,
    options: &Map<String, Value>,
) -> Result<Value, ConvertError> {
    let converter =
        converter(spec.name()).ok_or_else(|| ConvertError::NoConverter(spec.name().to_string()))?;
    apply(&converter, value, spec.is_list(), options)
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-in converters
// ─────────────────────────────────────────────────────────────────────────────

fn convert_number(value: Value) -> Value {
    match value {
        Value::Number(_) => value,
        Value::Bool(true) => Value::from(1),
        Value::String(ref text) if !text.is_empty() => number_value(parse_js_number(text)),
        Value::Array(_) | Value::Object(_) => Value::Null,
        falsy => falsy,
    }
}

fn convert_date(value: Value) -> Value {
    if !is_truthy(&value) {
        return value;
    }
    Value::String(parse_date(&value).map_or_else(|| INVALID_DATE.to_string(), |d| format_date(&d)))
}

fn convert_string(value: Value) -> Value {
    if value.is_string() || !is_truthy(&value) {
        return value;
    }
    Value::String(js_string(&value))
}

fn convert_boolean(value: &Value) -> bool {
    match value {
        Value::String(text) => !matches!(text.as_str(), "false" | "undefined" | "null" | "0" | ""),
        other => is_truthy(other),
    }
}

fn convert_object(value: Value) -> Result<Value, ConvertError> {
    match value {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => Ok(parsed),
            Ok(_) | Err(_) => Err(ConvertError::invalid("object", format!("'{text}' is not a JSON object"))),
        },
        other => Ok(other),
    }
}
