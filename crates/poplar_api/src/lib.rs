//! Method registries, lifecycle hooks and the invocation pipeline for Poplar.
//!
//! # Architecture
//!
//! - [`MethodDefinition`] - a callable: accepted arguments, business function,
//!   presenter and metadata
//! - [`MethodRegistry`] - a named group of methods plus hooks scoped to it
//! - [`Dispatcher`] - aggregates registries and runs the lifecycle
//! - [`Hook`] / [`Phase`] - callbacks run before, after, or after a failure
//! - [`Context`] - what one invocation reads and writes
//! - [`StateManager`] - advisory lifecycle state of an invocation
//!
//! # Example
//!
//! ```
//! use poplar_api::{ApiError, ArgSpec, Context, Dispatcher, Handler, Hook, MethodDefinition, MethodRegistry};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let info = MethodDefinition::new("info", Handler::sync(|args| Ok(json!({"id": args["id"]}))))?
//!     .accept(ArgSpec::new("id").with_type("number").required(true));
//!
//! let mut users = MethodRegistry::new("users")?;
//! users.define(info)?;
//! users.before(["*"], Hook::sync(|ctx, _| match ctx.args.get("token") {
//!     Some(_) => Ok(()),
//!     None => Err(ApiError::new("denied")),
//! }))?;
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.use_registry(users)?;
//!
//! let mut ctx = Context::from_json(json!({"id": "42", "token": "t"}));
//! dispatcher.invoke("users.info", &mut ctx).await?;
//! assert_eq!(ctx.result, Some(json!({"id": 42})));
//!
//! let mut ctx = Context::from_json(json!({"id": "42"}));
//! let error = dispatcher.invoke("users.info", &mut ctx).await.unwrap_err();
//! assert_eq!(error, ApiError::new("denied"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod hooks;
pub mod method;
pub mod pattern;
pub mod registry;
pub mod state;

pub use config::{ConfigStore, SharedConfig};
pub use context::{Context, Responder};
pub use dispatcher::Dispatcher;
pub use error::{ApiError, RegistrationError};
pub use hooks::{BoxFuture, Hook, HookResult, HookTable, Phase};
pub use method::{DEFAULT_FINISH_TIMEOUT, Handler, MethodDefinition, MethodInvocation, Presenter};
pub use pattern::Pattern;
pub use registry::{MethodRegistry, RedefinePolicy};
pub use state::{INITIAL_STATE, StateChange, StateListener, StateManager};

// Re-export the building blocks methods are declared with.
pub use poplar_entity::{Entity, FieldOptions};
pub use poplar_validation::{ArgSpec, ValidationErrors, ValidatorOption};
