//! Method definitions and per-call invocations.
//!
//! A [`MethodDefinition`] is declared once and never changes after it is
//! registered. Every external call works on its own [`MethodInvocation`], a
//! copy of the definition plus the mutable state of that call.
//!
//! # Argument Pipeline
//!
//! [`MethodInvocation::invoke`] runs the declared arguments through:
//!
//! 1. tagged value decoding and defaults
//! 2. type coercion (failures are logged, the raw value is kept)
//! 3. sanitization, once per invocation
//! 4. validation, once per invocation; failures short-circuit
//! 5. the business function
//! 6. the presenter

use core::fmt;
use core::future::Future;
use core::time::Duration;
use std::sync::Arc;

use parking_lot::RwLock;
use poplar_entity::Entity;
use poplar_types::dynamic;
use poplar_types::value::{decode_tagged, get_path, set_path};
use poplar_validation::{ArgSpec, ValidationErrors, sanitize, validate};
use serde_json::{Map, Value};

use crate::context::{Context, Responder};
use crate::error::{ApiError, RegistrationError};
use crate::hooks::BoxFuture;

/// Whether `name` is a valid registry or method name.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler
// ─────────────────────────────────────────────────────────────────────────────

type ValueFn = dyn Fn(Map<String, Value>) -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync;
type DirectFn =
    dyn Fn(Map<String, Value>, Responder) -> BoxFuture<'static, Result<(), ApiError>> + Send + Sync;

/// The business function behind a method.
///
/// Value handlers return the raw result, which is then presented. Direct
/// handlers finalize the response themselves through a [`Responder`]; the
/// invocation completes once that responder is finished.
#[derive(Clone)]
pub enum Handler {
    /// Returns a raw result.
    Value(Arc<ValueFn>),
    /// Finalizes the response itself.
    Direct(Arc<DirectFn>),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Handler::Value(..)"),
            Self::Direct(_) => f.write_str("Handler::Direct(..)"),
        }
    }
}

impl Handler {
    /// Creates an async value handler.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        Self::Value(Arc::new(move |args| Box::pin(handler(args))))
    }

    /// Creates a value handler from a synchronous function.
    pub fn sync<F>(handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Result<Value, ApiError> + Send + Sync + 'static,
    {
        Self::Value(Arc::new(move |args| {
            let result = handler(args);
            Box::pin(async move { result })
        }))
    }

    /// Creates a direct handler.
    ///
    /// The handler must finish the [`Responder`] it is given, either before
    /// returning or from a task it spawned. The invocation waits for that up
    /// to [`MethodDefinition::finish_timeout`] and fails afterwards.
    pub fn direct<F, Fut>(handler: F) -> Self
    where
        F: Fn(Map<String, Value>, Responder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        Self::Direct(Arc::new(move |args, responder| Box::pin(handler(args, responder))))
    }

    /// Whether this handler finalizes the response itself.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Presenter
// ─────────────────────────────────────────────────────────────────────────────

type PresentFn = dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), ApiError>> + Send + Sync;

/// How a raw result becomes the delivered result.
#[derive(Clone, Default)]
pub enum Presenter {
    /// Deliver the raw result unchanged.
    #[default]
    Raw,
    /// Shape the raw result through an entity.
    Entity(Arc<Entity>),
    /// Hand the context, with `result` set to the raw result, to a function
    /// that performs the final delivery.
    Custom(Arc<PresentFn>),
}

impl fmt::Debug for Presenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => f.write_str("Raw"),
            Self::Entity(entity) => f.debug_tuple("Entity").field(entity).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Presenter {
    /// Presents through `entity`.
    pub fn entity(entity: impl Into<Arc<Entity>>) -> Self {
        Self::Entity(entity.into())
    }

    /// Presents through a custom function.
    pub fn custom<F>(present: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), ApiError>> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(present))
    }
}

impl From<Entity> for Presenter {
    fn from(entity: Entity) -> Self {
        Self::entity(entity)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MethodDefinition
// ─────────────────────────────────────────────────────────────────────────────

/// A callable operation: accepted arguments, presenter, business function
/// and descriptive metadata.
#[derive(Debug, Clone)]
pub struct MethodDefinition {
    name: String,
    registry: Option<String>,
    accepts: Vec<ArgSpec>,
    presenter: Presenter,
    response_source: Option<String>,
    handler: Handler,
    description: Option<String>,
    notes: Option<String>,
    documented: bool,
    http: Map<String, Value>,
    finish_timeout: Duration,
}

/// How long an invocation waits for a direct handler's response by default.
pub const DEFAULT_FINISH_TIMEOUT: Duration = Duration::from_secs(30);

impl MethodDefinition {
    /// Declares a method.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidName`] unless `name` matches
    /// `[A-Za-z0-9_]+`.
    pub fn new(name: impl Into<String>, handler: Handler) -> Result<Self, RegistrationError> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(RegistrationError::InvalidName(name));
        }
        Ok(Self {
            name,
            registry: None,
            accepts: Vec::new(),
            presenter: Presenter::Raw,
            response_source: None,
            handler,
            description: None,
            notes: None,
            documented: true,
            http: Map::new(),
            finish_timeout: DEFAULT_FINISH_TIMEOUT,
        })
    }

    /// Appends an accepted argument.
    #[must_use]
    pub fn accept(mut self, arg: ArgSpec) -> Self {
        self.accepts.push(arg);
        self
    }

    /// Replaces the accepted arguments.
    #[must_use]
    pub fn accepts(mut self, args: impl IntoIterator<Item = ArgSpec>) -> Self {
        self.accepts = args.into_iter().collect();
        self
    }

    /// Sets the presenter.
    #[must_use]
    pub fn returns(mut self, presenter: impl Into<Presenter>) -> Self {
        self.presenter = presenter.into();
        self
    }

    /// Presents only the slice of the raw result at a dotted path, keeping
    /// its siblings.
    #[must_use]
    pub fn response_source(mut self, path: impl Into<String>) -> Self {
        self.response_source = Some(path.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the notes.
    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Whether the method shows up in generated documentation.
    #[must_use]
    pub fn documented(mut self, documented: bool) -> Self {
        self.documented = documented;
        self
    }

    /// Transport metadata, passed through untouched.
    #[must_use]
    pub fn http(mut self, http: Map<String, Value>) -> Self {
        self.http = http;
        self
    }

    /// How long to wait for a direct handler to finish its response after
    /// it returned.
    #[must_use]
    pub fn finish_timeout(mut self, timeout: Duration) -> Self {
        self.finish_timeout = timeout;
        self
    }

    pub(crate) fn bind(&mut self, registry: &str) {
        self.registry = Some(registry.to_string());
    }

    /// The method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning registry, once registered.
    #[must_use]
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    /// `"{registry}.{name}"`, or just the name for an unnamed or missing
    /// registry.
    #[must_use]
    pub fn full_name(&self) -> String {
        match self.registry.as_deref() {
            Some(registry) if !registry.is_empty() => format!("{registry}.{}", self.name),
            _ => self.name.clone(),
        }
    }

    /// The accepted arguments in declaration order.
    #[must_use]
    pub fn get_accepts(&self) -> &[ArgSpec] {
        &self.accepts
    }

    /// The presenter.
    #[must_use]
    pub fn presenter(&self) -> &Presenter {
        &self.presenter
    }

    /// The response source path, if any.
    #[must_use]
    pub fn get_response_source(&self) -> Option<&str> {
        self.response_source.as_deref()
    }

    /// The business function.
    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// The description, if any.
    #[must_use]
    pub fn get_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The notes, if any.
    #[must_use]
    pub fn get_notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Whether the method is documented.
    #[must_use]
    pub fn is_documented(&self) -> bool {
        self.documented
    }

    /// Transport metadata.
    #[must_use]
    pub fn get_http(&self) -> &Map<String, Value> {
        &self.http
    }

    /// The wait for an unfinished direct response.
    #[must_use]
    pub fn get_finish_timeout(&self) -> Duration {
        self.finish_timeout
    }

    /// Starts a fresh invocation of this method.
    #[must_use]
    pub fn invocation(&self) -> MethodInvocation {
        MethodInvocation::new(self.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MethodInvocation
// ─────────────────────────────────────────────────────────────────────────────

/// One call of a method.
///
/// Never shared between concurrent calls. Sanitization and validation run at
/// most once per invocation: invoking again reuses the processed arguments.
///
/// Hooks share per-call data through [`locals`](Self::set_local), which are
/// writable through a shared reference.
#[derive(Debug)]
pub struct MethodInvocation {
    definition: MethodDefinition,
    formatted: Option<Map<String, Value>>,
    validation: Option<ValidationErrors>,
    locals: RwLock<Map<String, Value>>,
    is_sanitized: bool,
    is_validated: bool,
}

impl Clone for MethodInvocation {
    fn clone(&self) -> Self {
        Self {
            definition: self.definition.clone(),
            formatted: self.formatted.clone(),
            validation: self.validation.clone(),
            locals: RwLock::new(self.locals()),
            is_sanitized: self.is_sanitized,
            is_validated: self.is_validated,
        }
    }
}

impl MethodInvocation {
    /// Starts an invocation of `definition`.
    #[must_use]
    pub fn new(definition: MethodDefinition) -> Self {
        Self {
            definition,
            formatted: None,
            validation: None,
            locals: RwLock::new(Map::new()),
            is_sanitized: false,
            is_validated: false,
        }
    }

    /// Reads a local variable.
    #[must_use]
    pub fn local(&self, name: &str) -> Option<Value> {
        self.locals.read().get(name).cloned()
    }

    /// Sets a local variable, returning the previous value.
    pub fn set_local(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.locals.write().insert(name.into(), value)
    }

    /// Removes a local variable.
    pub fn unset_local(&self, name: &str) -> Option<Value> {
        self.locals.write().remove(name)
    }

    /// A snapshot of all local variables.
    #[must_use]
    pub fn locals(&self) -> Map<String, Value> {
        self.locals.read().clone()
    }

    /// The definition being invoked.
    #[must_use]
    pub fn definition(&self) -> &MethodDefinition {
        &self.definition
    }

    /// The method name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// The method full name.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.definition.full_name()
    }

    /// Whether the arguments were sanitized.
    #[must_use]
    pub fn is_sanitized(&self) -> bool {
        self.is_sanitized
    }

    /// Whether the arguments were validated.
    #[must_use]
    pub fn is_validated(&self) -> bool {
        self.is_validated
    }

    /// The processed arguments, once available.
    #[must_use]
    pub fn formatted_args(&self) -> Option<&Map<String, Value>> {
        self.formatted.as_ref()
    }

    /// Builds the formatted argument map from raw arguments.
    ///
    /// Every declared argument is present in the output. An absent scalar is
    /// `null`; an absent list becomes an empty array.
    #[must_use]
    pub fn format_args(&self, args: &Map<String, Value>, options: &Map<String, Value>) -> Map<String, Value> {
        let mut formatted = Map::new();
        for spec in &self.definition.accepts {
            let mut value = args.get(spec.name()).cloned().map_or(Value::Null, decode_tagged);
            if value.is_null()
                && let Some(default) = spec.get_default()
            {
                value = default.clone();
            }
            if !value.is_null() || spec.ty().is_list() {
                value = match dynamic::convert(value.clone(), spec.ty(), options) {
                    Ok(converted) => converted,
                    Err(error) => {
                        tracing::debug!(
                            method = %self.definition.name,
                            arg = %spec.name(),
                            %error,
                            "argument coercion failed, keeping raw value"
                        );
                        value
                    }
                };
            }
            formatted.insert(spec.name().to_string(), value);
        }
        formatted
    }

    /// Runs the argument pipeline, the business function and the presenter.
    ///
    /// On success the presented result is in `ctx.result`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] when arguments fail validation, or the
    /// error of the business function or presenter.
    pub async fn invoke(&mut self, ctx: &mut Context) -> Result<(), ApiError> {
        let args = self.prepare(ctx)?;
        ctx.options.insert("args".to_string(), Value::Object(args.clone()));

        tracing::debug!(method = %self.definition.full_name(), "invoking business function");
        match &self.definition.handler {
            Handler::Value(handler) => {
                let raw = handler(args).await?;
                self.present(raw, ctx).await
            }
            Handler::Direct(handler) => {
                handler(args, ctx.responder.clone()).await?;
                self.await_response(ctx).await?;
                ctx.result = ctx.responder.body();
                Ok(())
            }
        }
    }

    async fn await_response(&self, ctx: &Context) -> Result<(), ApiError> {
        if ctx.responder.is_finished() {
            return Ok(());
        }
        let full_name = self.definition.full_name();
        let timeout = self.definition.finish_timeout;
        tracing::debug!(method = %full_name, ?timeout, "direct handler returned, waiting for the response");
        if tokio::time::timeout(timeout, ctx.responder.finished()).await.is_err() {
            tracing::warn!(method = %full_name, ?timeout, "direct handler never finished its response");
            return Err(ApiError::new(format!(
                "method '{full_name}' returned without finishing its response"
            )));
        }
        Ok(())
    }

    fn prepare(&mut self, ctx: &Context) -> Result<Map<String, Value>, ApiError> {
        let accepts = &self.definition.accepts;
        let mut args = match self.formatted.take() {
            Some(args) => args,
            None => self.format_args(&ctx.args, &ctx.options),
        };

        if !self.is_sanitized {
            sanitize(&mut args, accepts);
            self.is_sanitized = true;
        }
        if !self.is_validated {
            self.validation = Some(validate(&args, accepts));
            self.is_validated = true;
        }
        self.formatted = Some(args.clone());

        match &self.validation {
            Some(errors) if errors.any() => {
                tracing::debug!(method = %self.definition.full_name(), %errors, "validation failed");
                Err(ApiError::Validation(errors.clone()))
            }
            _ => Ok(args),
        }
    }

    async fn present(&self, raw: Value, ctx: &mut Context) -> Result<(), ApiError> {
        match &self.definition.presenter {
            Presenter::Raw => {
                ctx.result = Some(raw);
                Ok(())
            }
            Presenter::Entity(entity) => {
                ctx.result = Some(self.shape(entity, raw, &ctx.options));
                Ok(())
            }
            Presenter::Custom(present) => {
                ctx.result = Some(raw);
                present(ctx).await
            }
        }
    }

    fn shape(&self, entity: &Entity, mut raw: Value, options: &Map<String, Value>) -> Value {
        let Some(path) = self.definition.response_source.as_deref() else {
            return entity.parse(raw, options, None);
        };
        let Some(slice) = get_path(&raw, path).cloned() else {
            tracing::debug!(method = %self.definition.full_name(), %path, "response source not found, result left unshaped");
            return raw;
        };
        let shaped = entity.parse(slice, options, None);
        if !set_path(&mut raw, path, shaped) {
            tracing::debug!(method = %self.definition.full_name(), %path, "could not write shaped response source");
        }
        raw
    }
}
