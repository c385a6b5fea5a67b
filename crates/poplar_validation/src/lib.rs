//! Argument specifications, validation and sanitization for Poplar methods.
//!
//! A method declares the arguments it accepts as an ordered list of
//! [`ArgSpec`]s. Before the business function runs, the formatted argument
//! map goes through two engines:
//!
//! - [`sanitize`] - rewrites values in place, composing sanitizers left to right
//! - [`validate`] - runs validators and collects [`ValidationErrors`]
//!
//! Both engines are lenient about configuration: an unknown validator or
//! sanitizer name is logged and skipped, never reported as a failure.
//!
//! # Example
//!
//! ```
//! use poplar_validation::{ArgSpec, ValidatorOption, sanitize, validate};
//! use serde_json::{Map, json};
//!
//! let accepts = vec![
//!     ArgSpec::new("name")
//!         .with_type("string")
//!         .sanitize("trim", true)
//!         .required(true)
//!         .validate("isLength", ValidatorOption::args([json!(5), json!(15)])),
//! ];
//!
//! let mut params = Map::new();
//! params.insert("name".into(), json!("  Felix  "));
//!
//! sanitize(&mut params, &accepts);
//! assert_eq!(params["name"], json!("Felix"));
//! assert!(!validate(&params, &accepts).any());
//! ```

pub mod arg;
pub mod errors;
pub mod sanitizer;
pub mod validation;

mod builtin;

pub use arg::{ArgSpec, CustomSanitizer, CustomValidator, SanitizerOption, ValidatorOption};
pub use errors::ValidationErrors;
pub use sanitizer::{SanitizeError, SanitizerFn, sanitize};
pub use validation::{ValidatorFn, validate};
