//! Dynamic type conversion and JSON value helpers for Poplar.
//!
//! Everything that flows through a Poplar method invocation is a
//! [`serde_json::Value`]. This crate provides the pieces shared by every
//! other layer:
//!
//! - [`dynamic`] - the process-wide named type converter registry
//! - [`spec`] - [`TypeSpec`], the declared type of an argument or entity field
//! - [`value`] - emptiness checks, JS-style stringification, dotted paths and
//!   tagged argument decoding
//!
//! # Example
//!
//! ```
//! use poplar_types::{TypeSpec, dynamic};
//! use serde_json::{Map, json};
//!
//! let value = dynamic::convert(json!("000123"), &TypeSpec::scalar("number"), &Map::new())?;
//! assert_eq!(value, json!(123));
//! # Ok::<(), poplar_types::ConvertError>(())
//! ```

pub mod dynamic;
pub mod spec;
pub mod value;

pub use dynamic::{ConvertError, Converter, TypeRegistry};
pub use spec::TypeSpec;
