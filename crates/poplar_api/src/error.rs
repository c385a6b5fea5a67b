//! Error types for registration and invocation.

use poplar_validation::ValidationErrors;
use serde_json::{Value, json};

/// Errors raised while declaring registries, methods and hooks.
///
/// These are configuration mistakes: they surface at setup time and are
/// never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// A registry or method name contains characters outside `[A-Za-z0-9_]`.
    #[error("'{0}' is not a valid name, only 'a-z', 'A-Z', '0-9' and '_' are allowed")]
    InvalidName(String),

    /// A registry with this name is already used by the dispatcher.
    #[error("registry '{0}' cannot be used more than once")]
    DuplicateRegistry(String),

    /// The method is already defined and the registry rejects redefinition.
    #[error("method '{method}' has already been defined for registry '{registry}'")]
    DuplicateMethod {
        /// The registry name.
        registry: String,
        /// The method name.
        method: String,
    },

    /// A referenced method does not exist.
    #[error("method '{method}' is not defined in registry '{registry}'")]
    MethodNotFound {
        /// The registry name.
        registry: String,
        /// The method name.
        method: String,
    },

    /// A hook pattern is not a valid glob.
    #[error("invalid hook pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        message: String,
    },
}

/// Errors delivered by a method invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Argument validation failed; the business function did not run.
    #[error("{0}")]
    Validation(ValidationErrors),

    /// A hook, business function or presenter failed.
    #[error("{0}")]
    Message(String),

    /// No method is registered under the requested full name.
    #[error("method '{0}' not found")]
    MethodNotFound(String),
}

impl ApiError {
    /// Creates a [`Message`](Self::Message) error.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// The validation errors, when this is a validation failure.
    #[must_use]
    pub fn validations(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            Self::Message(_) | Self::MethodNotFound(_) => None,
        }
    }

    /// Transport-facing error body.
    ///
    /// Validation failures render as
    /// `{"validations": {"message": .., "errors": ..}}`, anything else as
    /// `{"message": ..}`.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Validation(errors) => json!({
                "validations": {
                    "message": errors.to_human(),
                    "errors": errors.to_json(),
                }
            }),
            other => json!({ "message": other.to_string() }),
        }
    }
}

impl From<&str> for ApiError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ApiError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}
