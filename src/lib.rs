//! Method registries with glob-matched lifecycle hooks, argument validation
//! and response shaping.
//!
//! ```
//! use poplar::prelude::*;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut user = Entity::new();
//! user.add("id", FieldOptions::new())?
//!     .add("name", FieldOptions::new().default_value(json!("anonymous")))?;
//!
//! let info = MethodDefinition::new("info", Handler::sync(|args| Ok(json!({"id": args["id"], "secret": 1}))))?
//!     .accept(ArgSpec::new("id").with_type("number").required(true))
//!     .returns(user);
//!
//! let mut users = MethodRegistry::new("users")?;
//! users.define(info)?;
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.use_registry(users)?;
//!
//! let mut ctx = Context::from_json(json!({"id": "7"}));
//! dispatcher.invoke("users.info", &mut ctx).await?;
//! assert_eq!(ctx.result, Some(json!({"id": 7, "name": "anonymous"})));
//! # Ok(())
//! # }
//! ```

pub use poplar_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use poplar_internal::prelude::*;
}
