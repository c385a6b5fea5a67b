//! The validation engine.
//!
//! Named validators live in a process-wide registry seeded with the built-in
//! library. They are string predicates: every value is validated through its
//! JS-style string form, followed by the arguments declared on the
//! [`ArgSpec`](crate::ArgSpec).

use std::sync::{Arc, LazyLock};

use hashbrown::HashMap;
use parking_lot::RwLock;
use poplar_types::value::{is_blank, is_missing, js_string};
use serde_json::{Map, Value};

use crate::arg::{ArgSpec, ValidatorOption};
use crate::builtin;
use crate::errors::ValidationErrors;

/// A named validator: `(value, declared args) -> passes`.
pub type ValidatorFn = Arc<dyn Fn(&str, &[Value]) -> bool + Send + Sync>;

static VALIDATORS: LazyLock<RwLock<HashMap<String, ValidatorFn>>> = LazyLock::new(|| {
    RwLock::new(
        builtin::validators()
            .into_iter()
            .map(|(name, validator)| (name.to_string(), validator))
            .collect(),
    )
});

/// Registers a named validator, replacing any existing one.
pub fn extend<F>(name: impl Into<String>, validator: F)
where
    F: Fn(&str, &[Value]) -> bool + Send + Sync + 'static,
{
    let name = name.into();
    tracing::debug!(validator = %name, "registering validator");
    VALIDATORS.write().insert(name, Arc::new(validator));
}

/// Looks up a named validator.
#[must_use]
pub fn validator(name: &str) -> Option<ValidatorFn> {
    VALIDATORS.read().get(name).cloned()
}

/// Validates `params` against the declared arguments.
///
/// A blank value only goes through `required` (when configured); every other
/// validator is skipped for it. Non-blank values go through every other
/// configured validator in declaration order.
#[must_use]
pub fn validate(params: &Map<String, Value>, accepts: &[ArgSpec]) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    for spec in accepts.iter().filter(|spec| spec.has_validators()) {
        let field = spec.name();
        let value = params.get(field).unwrap_or(&Value::Null);

        if is_blank(value) {
            if let Some(option) = spec.required_option() {
                check_required(field, value, option, params, &mut errors);
            }
            continue;
        }

        for (name, option) in spec.validators() {
            run(field, name, value, option, params, &mut errors);
        }
    }
    errors
}

fn check_required(
    field: &str,
    value: &Value,
    option: &ValidatorOption,
    params: &Map<String, Value>,
    errors: &mut ValidationErrors,
) {
    match option {
        ValidatorOption::Enabled(false) => {}
        ValidatorOption::Custom(custom) => {
            if let Some(message) = custom(value, params).filter(|m| !m.is_empty()) {
                errors.add(field, "required", Some(message));
            }
        }
        named => {
            if is_missing(value) {
                errors.add(field, "required", message_of(named));
            }
        }
    }
}

fn run(
    field: &str,
    name: &str,
    value: &Value,
    option: &ValidatorOption,
    params: &Map<String, Value>,
    errors: &mut ValidationErrors,
) {
    let args: &[Value] = match option {
        ValidatorOption::Enabled(false) => return,
        ValidatorOption::Custom(custom) => {
            if let Some(message) = custom(value, params).filter(|m| !m.is_empty()) {
                errors.add(field, name, Some(message));
            }
            return;
        }
        ValidatorOption::Args { args, .. } => args.as_slice(),
        ValidatorOption::Enabled(true) | ValidatorOption::Message(_) => &[],
    };

    let Some(validator) = validator(name) else {
        tracing::debug!(validator = %name, field = %field, "unknown validator, skipping");
        return;
    };
    if !validator(&js_string(value), args) {
        errors.add(field, name, message_of(option));
    }
}

fn message_of(option: &ValidatorOption) -> Option<String> {
    match option {
        ValidatorOption::Message(message) => Some(message.clone()),
        ValidatorOption::Args { message, .. } => message.clone(),
        ValidatorOption::Enabled(_) | ValidatorOption::Custom(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn required_reports_once_and_skips_the_rest() {
        let accepts = vec![
            ArgSpec::new("id")
                .required(true)
                .validate("isInt", true)
                .validate("isLength", ValidatorOption::args([json!(3)])),
        ];
        let errors = validate(&Map::new(), &accepts);
        assert_eq!(
            errors.to_json(),
            json!({"id": {"required": "id: 'required' validation failed"}})
        );
    }

    #[test]
    fn zero_and_false_satisfy_required() {
        let accepts = vec![
            ArgSpec::new("count").required(true).validate("isInt", true),
            ArgSpec::new("flag").required(true),
        ];
        let errors = validate(&params(json!({"count": 0, "flag": false})), &accepts);
        assert!(!errors.any(), "{errors}");
    }

    #[test]
    fn blank_values_skip_non_required_validators() {
        let accepts = vec![ArgSpec::new("email").validate("isEmail", true)];
        assert!(!validate(&params(json!({"email": ""})), &accepts).any());
        assert!(validate(&params(json!({"email": "nope"})), &accepts).any());
    }

    #[test]
    fn messages_and_order() {
        let accepts = vec![
            ArgSpec::new("name")
                .validate("isLength", ValidatorOption::args([json!(5), json!(15)]).with_message("length"))
                .validate("isAlpha", "letters"),
            ArgSpec::new("email").validate("isEmail", true),
        ];
        let errors = validate(&params(json!({"name": "a1", "email": "x"})), &accepts);
        assert_eq!(
            errors.flatten(),
            vec!["length", "letters", "email: 'isEmail' validation failed"]
        );
    }

    #[test]
    fn custom_validator_truthy_message_fails() {
        let accepts = vec![
            ArgSpec::new("password").validate_with("match", |value, all| {
                (Some(value) != all.get("confirm")).then(|| "passwords differ".to_string())
            }),
        ];
        let ok = validate(&params(json!({"password": "a", "confirm": "a"})), &accepts);
        assert!(!ok.any());
        let bad = validate(&params(json!({"password": "a", "confirm": "b"})), &accepts);
        assert_eq!(bad.to_human(), "passwords differ");
    }

    #[test]
    fn unknown_validators_are_skipped() {
        let accepts = vec![ArgSpec::new("x").validate("isMadeUp", true)];
        assert!(!validate(&params(json!({"x": "value"})), &accepts).any());
    }

    #[test]
    fn extended_validators_are_used() {
        extend("isPoplarTestEven", |value, _| {
            value.parse::<i64>().is_ok_and(|n| n % 2 == 0)
        });
        let accepts = vec![ArgSpec::new("n").validate("isPoplarTestEven", true)];
        assert!(!validate(&params(json!({"n": 4})), &accepts).any());
        assert!(validate(&params(json!({"n": 3})), &accepts).any());
        assert!(validator("isPoplarTestEven").is_some());
    }
}
