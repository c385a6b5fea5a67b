use std::sync::Arc;

use indexmap::IndexMap;
use poplar_types::dynamic;
use serde_json::{Map, Value};

use crate::EntityError;
use crate::field::{BoxError, FieldFn, FieldKind, FieldMapping, FieldOptions};

/// An external value converter applied to every field during [`Entity::parse`].
pub type ValueConverter = dyn Fn(Value, &Map<String, Value>) -> Value + Send + Sync;

/// Ordered output-field mapping used to shape method results.
#[derive(Debug, Clone, Default)]
pub struct Entity {
    fields: IndexMap<String, FieldMapping>,
}

impl Entity {
    /// Creates an entity without fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one field.
    ///
    /// With [`FieldOptions::value`] the field emits a fixed value, otherwise it
    /// aliases the source key `name`. [`FieldOptions::as_name`] renames the
    /// output key. Re-adding a name replaces the earlier field.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty name or when `as` and `value` are combined.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        options: FieldOptions,
    ) -> Result<&mut Self, EntityError> {
        self.insert(name.into(), options, None)?;
        Ok(self)
    }

    /// Same as [`add`](Self::add).
    ///
    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn expose(
        &mut self,
        name: impl Into<String>,
        options: FieldOptions,
    ) -> Result<&mut Self, EntityError> {
        self.add(name, options)
    }

    /// Adds several fields sharing the same options.
    ///
    /// # Errors
    ///
    /// `as` only makes sense for a single field and is rejected, as are the
    /// errors of [`add`](Self::add).
    pub fn add_many<I, S>(&mut self, names: I, options: FieldOptions) -> Result<&mut Self, EntityError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if options.as_name.is_some() {
            return Err(EntityError::MultiNameOption("as".to_string()));
        }
        for name in names {
            self.insert(name.into(), options.clone(), None)?;
        }
        Ok(self)
    }

    /// Adds a computed field.
    ///
    /// The function receives the source object and the parse options. An
    /// error is logged and yields `null`, which then falls back to the
    /// field's default.
    ///
    /// # Errors
    ///
    /// `as` and `value` cannot be combined with a function.
    pub fn add_fn<F>(
        &mut self,
        name: impl Into<String>,
        options: FieldOptions,
        function: F,
    ) -> Result<&mut Self, EntityError>
    where
        F: Fn(&Value, &Map<String, Value>) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        for (set, option) in [(options.as_name.is_some(), "as"), (options.value.is_some(), "value")] {
            if set {
                return Err(EntityError::ConflictingOptions {
                    field: name,
                    message: format!("'{option}' cannot be combined with a function"),
                });
            }
        }
        let function: FieldFn = Arc::new(function);
        self.insert(name, options, Some(function))?;
        Ok(self)
    }

    fn insert(
        &mut self,
        name: String,
        options: FieldOptions,
        function: Option<FieldFn>,
    ) -> Result<(), EntityError> {
        if name.is_empty() {
            return Err(EntityError::InvalidName(name));
        }
        if options.as_name.is_some() && options.value.is_some() {
            return Err(EntityError::ConflictingOptions {
                field: name,
                message: "'as' cannot be combined with 'value'".to_string(),
            });
        }

        let FieldOptions {
            as_name,
            value,
            default,
            condition,
            using,
            type_hint,
        } = options;

        let output = match as_name {
            Some(alias) if alias.is_empty() => return Err(EntityError::InvalidName(alias)),
            Some(alias) => alias,
            None => name.clone(),
        };
        let kind = match (function, value) {
            (Some(function), _) => FieldKind::Function(function),
            (None, Some(value)) => FieldKind::Value(value),
            (None, None) => FieldKind::Alias(name),
        };

        self.fields.insert(
            output,
            FieldMapping {
                kind,
                default: default.unwrap_or(Value::Null),
                condition,
                using,
                type_hint,
            },
        );
        Ok(())
    }

    /// Output field names in emission order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Shapes `input`.
    ///
    /// Arrays are shaped element-wise and `null` is treated as an empty
    /// object. For each field, in declaration order:
    ///
    /// 1. a failing condition skips the field entirely
    /// 2. the raw value is read, fixed, or computed
    /// 3. `null` falls back to the default
    /// 4. `converter` runs on the value
    /// 5. a nested entity shapes the value, unless the default was used
    /// 6. the value is coerced to the declared type; failures keep the value
    #[must_use]
    pub fn parse(
        &self,
        input: Value,
        options: &Map<String, Value>,
        converter: Option<&ValueConverter>,
    ) -> Value {
        match input {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.parse(item, options, converter))
                    .collect(),
            ),
            Value::Null => self.parse_one(&Value::Object(Map::new()), options, converter),
            source => self.parse_one(&source, options, converter),
        }
    }

    fn parse_one(
        &self,
        source: &Value,
        options: &Map<String, Value>,
        converter: Option<&ValueConverter>,
    ) -> Value {
        let mut output = Map::new();
        for (key, field) in &self.fields {
            if let Some(condition) = &field.condition
                && !condition(source, options)
            {
                continue;
            }

            let raw = match &field.kind {
                FieldKind::Alias(source_key) => source.get(source_key).cloned().unwrap_or(Value::Null),
                FieldKind::Value(value) => value.clone(),
                FieldKind::Function(function) => function(source, options).unwrap_or_else(|error| {
                    tracing::warn!(field = %key, %error, "computed entity field failed");
                    Value::Null
                }),
            };

            let defaulted = raw.is_null();
            let mut value = if defaulted { field.default.clone() } else { raw };

            if let Some(converter) = converter {
                value = converter(value, options);
            }
            if !defaulted && let Some(nested) = &field.using {
                value = nested.parse(value, options, converter);
            }
            if let Some(ty) = &field.type_hint {
                value = match dynamic::convert(value.clone(), ty, options) {
                    Ok(converted) => converted,
                    Err(error) => {
                        tracing::debug!(field = %key, type_name = %ty, %error, "entity field coercion failed");
                        value
                    }
                };
            }

            output.insert(key.clone(), value);
        }
        Value::Object(output)
    }
}
