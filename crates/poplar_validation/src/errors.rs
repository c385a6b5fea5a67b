//! Structured validation errors.

use core::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

/// Validation failures keyed by field, then by validator name.
///
/// Fields keep the order in which they first failed, which is the argument
/// declaration order. Within a field, validators keep declaration order and a
/// second failure under the same validator name replaces the first message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: IndexMap<String, IndexMap<String, String>>,
}

impl ValidationErrors {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure.
    ///
    /// Without a message, `"{field}: '{validator}' validation failed"` is used.
    pub fn add(&mut self, field: &str, validator: &str, message: Option<String>) {
        let message =
            message.unwrap_or_else(|| format!("{field}: '{validator}' validation failed"));
        self.fields
            .entry(field.to_string())
            .or_default()
            .insert(validator.to_string(), message);
    }

    /// Whether any failure was recorded.
    #[must_use]
    pub fn any(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Failures recorded for one field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&IndexMap<String, String>> {
        self.fields.get(name)
    }

    /// `field -> validator -> message` as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let fields = self
            .fields
            .iter()
            .map(|(field, validators)| {
                let inner: Map<String, Value> = validators
                    .iter()
                    .map(|(name, message)| (name.clone(), Value::String(message.clone())))
                    .collect();
                (field.clone(), Value::Object(inner))
            })
            .collect();
        Value::Object(fields)
    }

    /// All messages, field order then validator order.
    #[must_use]
    pub fn flatten(&self) -> Vec<String> {
        self.fields
            .values()
            .flat_map(|validators| validators.values().cloned())
            .collect()
    }

    /// All messages joined with `"; "`.
    #[must_use]
    pub fn to_human(&self) -> String {
        self.flatten().join("; ")
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_message_and_json_shape() {
        let mut errors = ValidationErrors::new();
        errors.add("id", "required", None);
        assert_eq!(
            errors.to_json(),
            json!({"id": {"required": "id: 'required' validation failed"}})
        );
        assert_eq!(errors.to_string(), "id: 'required' validation failed");
    }

    #[test]
    fn same_validator_overwrites_distinct_accumulate() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "isLength", Some("too short".into()));
        errors.add("name", "isAlpha", Some("letters only".into()));
        errors.add("email", "isEmail", Some("bad email".into()));
        errors.add("name", "isLength", Some("too long".into()));

        assert_eq!(errors.flatten(), vec!["too long", "letters only", "bad email"]);
        assert_eq!(errors.to_human(), "too long; letters only; bad email");
        assert_eq!(errors.field("name").map(IndexMap::len), Some(2));
    }

    #[test]
    fn serializes_like_json_form() {
        let mut errors = ValidationErrors::new();
        errors.add("a", "x", Some("m".into()));
        assert_eq!(serde_json::to_value(&errors).ok(), Some(errors.to_json()));
        assert!(!ValidationErrors::new().any());
    }
}
