//! Declared method arguments.

use core::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use poplar_types::TypeSpec;
use serde_json::{Map, Value};

use crate::sanitizer::SanitizeError;

/// A custom validator function.
///
/// Receives the argument value and the full argument map. Returning a
/// non-empty message marks the argument invalid with that message.
pub type CustomValidator = Arc<dyn Fn(&Value, &Map<String, Value>) -> Option<String> + Send + Sync>;

/// A custom sanitizer function.
///
/// Receives the current argument value and the full argument map and returns
/// the replacement value.
pub type CustomSanitizer =
    Arc<dyn Fn(Value, &Map<String, Value>) -> Result<Value, SanitizeError> + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// ValidatorOption
// ─────────────────────────────────────────────────────────────────────────────

/// How a validator is configured for one argument.
#[derive(Clone)]
pub enum ValidatorOption {
    /// Run the named validator without extra arguments (`true`) or not at all (`false`).
    Enabled(bool),
    /// Run the named validator and report this message on failure.
    Message(String),
    /// Run the named validator with extra arguments and an optional message.
    Args {
        /// Extra arguments passed after the value.
        args: Vec<Value>,
        /// Message reported on failure.
        message: Option<String>,
    },
    /// Run a custom validator instead of a named one.
    Custom(CustomValidator),
}

impl ValidatorOption {
    /// Creates an [`Args`](Self::Args) option without a message.
    pub fn args(args: impl IntoIterator<Item = Value>) -> Self {
        Self::Args {
            args: args.into_iter().collect(),
            message: None,
        }
    }

    /// Creates a [`Custom`](Self::Custom) option.
    pub fn custom<F>(validator: F) -> Self
    where
        F: Fn(&Value, &Map<String, Value>) -> Option<String> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(validator))
    }

    /// Attaches a failure message.
    ///
    /// Custom validators report their own messages, so this is a no-op for them.
    #[must_use]
    pub fn with_message(self, message: impl Into<String>) -> Self {
        let message = Some(message.into());
        match self {
            Self::Enabled(_) | Self::Message(_) => Self::Args {
                args: Vec::new(),
                message,
            },
            Self::Args { args, .. } => Self::Args { args, message },
            custom @ Self::Custom(_) => custom,
        }
    }

    /// Whether this option disables the validator.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Enabled(false))
    }
}

impl fmt::Debug for ValidatorOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled(flag) => f.debug_tuple("Enabled").field(flag).finish(),
            Self::Message(message) => f.debug_tuple("Message").field(message).finish(),
            Self::Args { args, message } => f
                .debug_struct("Args")
                .field("args", args)
                .field("message", message)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<bool> for ValidatorOption {
    fn from(value: bool) -> Self {
        Self::Enabled(value)
    }
}

impl From<&str> for ValidatorOption {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<String> for ValidatorOption {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<Value> for ValidatorOption {
    /// Reads the loosely typed option forms: `true`, `"message"`, or
    /// `{"args": [..], "message": ".."}`.
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(flag) => Self::Enabled(flag),
            Value::String(message) => Self::Message(message),
            Value::Object(mut map) => {
                let args = match map.remove("args") {
                    Some(Value::Array(items)) => items,
                    Some(Value::Null) | None => Vec::new(),
                    Some(single) => vec![single],
                };
                let message = map
                    .remove("message")
                    .and_then(|m| m.as_str().map(str::to_string));
                Self::Args { args, message }
            }
            Value::Null => Self::Enabled(false),
            Value::Number(_) | Value::Array(_) => Self::Enabled(true),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SanitizerOption
// ─────────────────────────────────────────────────────────────────────────────

/// How a sanitizer is configured for one argument.
#[derive(Clone)]
pub enum SanitizerOption {
    /// Run the named sanitizer without extra arguments (`true`) or not at all (`false`).
    Enabled(bool),
    /// Run the named sanitizer with extra arguments.
    Args(Vec<Value>),
    /// Run a custom sanitizer instead of a named one.
    Custom(CustomSanitizer),
}

impl SanitizerOption {
    /// Creates a [`Custom`](Self::Custom) option.
    pub fn custom<F>(sanitizer: F) -> Self
    where
        F: Fn(Value, &Map<String, Value>) -> Result<Value, SanitizeError> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(sanitizer))
    }
}

impl fmt::Debug for SanitizerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled(flag) => f.debug_tuple("Enabled").field(flag).finish(),
            Self::Args(args) => f.debug_tuple("Args").field(args).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<bool> for SanitizerOption {
    fn from(value: bool) -> Self {
        Self::Enabled(value)
    }
}

impl From<&str> for SanitizerOption {
    fn from(value: &str) -> Self {
        Self::Args(vec![Value::String(value.to_string())])
    }
}

impl From<Value> for SanitizerOption {
    /// Booleans toggle the sanitizer, arrays are spread into arguments and
    /// anything else becomes a single argument.
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(flag) => Self::Enabled(flag),
            Value::Null => Self::Enabled(false),
            Value::Array(items) => Self::Args(items),
            other => Self::Args(vec![other]),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ArgSpec
// ─────────────────────────────────────────────────────────────────────────────

/// Declaration of one accepted method argument.
///
/// The declared type is normalized to a basic type on construction: custom
/// model names degrade to `object`.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    name: String,
    ty: TypeSpec,
    validations: IndexMap<String, ValidatorOption>,
    sanitizers: IndexMap<String, SanitizerOption>,
    default: Option<Value>,
    required: Option<ValidatorOption>,
    description: Option<String>,
}

impl ArgSpec {
    /// Declares an argument of type `any`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: TypeSpec::default(),
            validations: IndexMap::new(),
            sanitizers: IndexMap::new(),
            default: None,
            required: None,
            description: None,
        }
    }

    /// Sets the declared type.
    #[must_use]
    pub fn with_type(mut self, ty: impl Into<TypeSpec>) -> Self {
        self.ty = ty.into().basic();
        self
    }

    /// Shortcut for the `required` validator.
    ///
    /// Takes precedence over a `required` entry added through [`validate`](Self::validate).
    #[must_use]
    pub fn required(mut self, option: impl Into<ValidatorOption>) -> Self {
        self.required = Some(option.into());
        self
    }

    /// Adds a named validator.
    ///
    /// Re-adding a name replaces its option but keeps its position.
    #[must_use]
    pub fn validate(mut self, name: impl Into<String>, option: impl Into<ValidatorOption>) -> Self {
        self.validations.insert(name.into(), option.into());
        self
    }

    /// Adds a custom validator under `name`.
    #[must_use]
    pub fn validate_with<F>(self, name: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&Value, &Map<String, Value>) -> Option<String> + Send + Sync + 'static,
    {
        self.validate(name, ValidatorOption::custom(validator))
    }

    /// Adds a named sanitizer.
    #[must_use]
    pub fn sanitize(mut self, name: impl Into<String>, option: impl Into<SanitizerOption>) -> Self {
        self.sanitizers.insert(name.into(), option.into());
        self
    }

    /// Adds a custom sanitizer under `name`.
    #[must_use]
    pub fn sanitize_with<F>(self, name: impl Into<String>, sanitizer: F) -> Self
    where
        F: Fn(Value, &Map<String, Value>) -> Result<Value, SanitizeError> + Send + Sync + 'static,
    {
        self.sanitize(name, SanitizerOption::custom(sanitizer))
    }

    /// Sets the value used when the argument is absent or `null`.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets a human readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The argument name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared (basic) type.
    #[must_use]
    pub fn ty(&self) -> &TypeSpec {
        &self.ty
    }

    /// The default value, if any.
    #[must_use]
    pub fn get_default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// The description, if any.
    #[must_use]
    pub fn get_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The configured sanitizers in declaration order.
    #[must_use]
    pub fn sanitizers(&self) -> &IndexMap<String, SanitizerOption> {
        &self.sanitizers
    }

    /// The effective `required` option: the shortcut, else a `required`
    /// (or `require`) validator.
    #[must_use]
    pub fn required_option(&self) -> Option<&ValidatorOption> {
        self.required
            .as_ref()
            .or_else(|| self.validations.get("required"))
            .or_else(|| self.validations.get("require"))
    }

    /// Validators other than `required`, in declaration order.
    pub fn validators(&self) -> impl Iterator<Item = (&str, &ValidatorOption)> {
        self.validations
            .iter()
            .filter(|(name, _)| !is_required_name(name))
            .map(|(name, option)| (name.as_str(), option))
    }

    /// Whether any validator, including `required`, is configured.
    #[must_use]
    pub fn has_validators(&self) -> bool {
        self.required.is_some() || !self.validations.is_empty()
    }
}

fn is_required_name(name: &str) -> bool {
    matches!(name, "required" | "require")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shortcut_required_overrides_validator() {
        let spec = ArgSpec::new("name")
            .validate("required", json!({"message": "overwritten"}))
            .required("name is required");
        assert!(matches!(
            spec.required_option(),
            Some(ValidatorOption::Message(message)) if message == "name is required"
        ));
        assert_eq!(spec.validators().count(), 0);
    }

    #[test]
    fn validator_option_from_loose_json() {
        match ValidatorOption::from(json!({"args": [5, 15], "message": "bad length"})) {
            ValidatorOption::Args { args, message } => {
                assert_eq!(args, vec![json!(5), json!(15)]);
                assert_eq!(message.as_deref(), Some("bad length"));
            }
            other => panic!("unexpected option {other:?}"),
        }
        assert!(ValidatorOption::from(json!(false)).is_disabled());
    }

    #[test]
    fn sanitizer_option_spreads_arrays() {
        assert!(matches!(
            SanitizerOption::from(json!(["a", "b"])),
            SanitizerOption::Args(args) if args.len() == 2
        ));
        assert!(matches!(SanitizerOption::from(json!(10)), SanitizerOption::Args(args) if args == vec![json!(10)]));
    }

    #[test]
    fn custom_types_degrade_to_object() {
        assert_eq!(ArgSpec::new("user").with_type("UserModel").ty(), &TypeSpec::scalar("object"));
        assert_eq!(ArgSpec::new("ids").with_type("[number]").ty(), &TypeSpec::list("number"));
    }
}
