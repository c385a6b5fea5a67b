//! # Poplar Internal Library
//!
//! Re-exports the core Poplar crates for convenience.

/// Layer 1: JSON value helpers and type coercion.
pub use poplar_types;

/// Layer 1: argument validation and sanitization.
pub use poplar_validation;

/// Layer 1: declarative response shaping.
pub use poplar_entity;

/// Layer 2: registries, hooks and the invocation pipeline.
pub use poplar_api;

/// Ambient infrastructure.
pub use poplar_core;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use poplar_api::{
        ApiError, ArgSpec, Context, Dispatcher, Entity, FieldOptions, Handler, Hook, MethodDefinition,
        MethodInvocation, MethodRegistry, Phase, Presenter, RedefinePolicy, RegistrationError, Responder,
        SharedConfig, ValidatorOption,
    };
    pub use poplar_core::{TracingConfig, TracingFormat};
    pub use poplar_types::TypeSpec;
    pub use poplar_validation::{SanitizerOption, ValidationErrors};
}
