//! Ambient infrastructure shared by Poplar services.
//!
//! Everything in Poplar logs through [`tracing`](https://docs.rs/tracing).
//! This crate installs a subscriber for those events; libraries never do so
//! on their own.
//!
//! ```
//! use poplar_core::tracing::{TracingConfig, TracingFormat};
//! use tracing::Level;
//!
//! TracingConfig::new()
//!     .with_level(Level::DEBUG)
//!     .with_format(TracingFormat::Compact)
//!     .with_env_filter("poplar_api=trace,poplar_validation=debug")
//!     .init();
//! ```

pub mod tracing;

pub use crate::tracing::{TracingConfig, TracingFormat};
