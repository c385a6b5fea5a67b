//! Declarative response shaping for Poplar methods.
//!
//! An [`Entity`] describes the object a method returns to its caller: an
//! ordered list of output fields, each one either copied from the raw result
//! (an alias), a fixed value, or computed by a function. Fields may carry a
//! default, a condition, a declared type and a nested entity.
//!
//! Output field order is declaration order, never input key order.
//!
//! # Example
//!
//! ```
//! use poplar_entity::{Entity, FieldOptions};
//! use serde_json::{Map, json};
//!
//! let mut user = Entity::new();
//! user.add("name", FieldOptions::new())?
//!     .add("age", FieldOptions::new().with_type("number"))?
//!     .add("nickname", FieldOptions::new().as_name("alias"))?
//!     .add_fn("isAdult", FieldOptions::new(), |user, _| {
//!         Ok(json!(user["age"].as_i64().unwrap_or_default() >= 18))
//!     })?;
//!
//! let shaped = user.parse(json!({"age": 21, "name": "Felix", "nickname": "fx"}), &Map::new(), None);
//! assert_eq!(shaped, json!({"name": "Felix", "age": 21, "alias": "fx", "isAdult": true}));
//! # Ok::<(), poplar_entity::EntityError>(())
//! ```

mod entity;
mod field;

pub use entity::{Entity, ValueConverter};
pub use field::{BoxError, Condition, FieldFn, FieldOptions};

/// Errors raised while declaring entity fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityError {
    /// The field name is empty.
    #[error("'{0}' is not a valid field name")]
    InvalidName(String),

    /// Options that cannot be combined were given together.
    #[error("field '{field}': {message}")]
    ConflictingOptions {
        /// The field being declared.
        field: String,
        /// Which options conflict.
        message: String,
    },

    /// An option that only applies to a single field was given to several.
    #[error("option '{0}' is not allowed when adding several fields at once")]
    MultiNameOption(String),
}
