//! Helpers for working with argument and result values.
//!
//! Arguments arrive from transports that speak loosely typed formats, so the
//! helpers here follow the conventions those transports expect: numbers that
//! cannot be represented become `null`, strings are produced the way a
//! JavaScript client would print them, and object paths are dot separated.

use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Value};

/// Placeholder produced when a date cannot be parsed.
pub const INVALID_DATE: &str = "Invalid Date";

static DECIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("decimal pattern is valid")
});

/// Whether a value counts as blank.
///
/// Blank values are `null`, `false`, `0`, `""`, `[]` and `{}`. Blank values
/// are skipped by sanitizers and by every validator except `required`.
#[must_use]
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64().is_none_or(|n| n == 0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Whether a value is missing for the purpose of the `required` check.
///
/// Only values whose string form is empty are missing, so `0` and `false`
/// satisfy `required`.
#[must_use]
pub fn is_missing(value: &Value) -> bool {
    js_string(value).is_empty()
}

/// JavaScript truthiness.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Renders a value the way a JavaScript client would stringify it.
///
/// `null` renders as the empty string, arrays are comma joined and objects
/// render as `[object Object]`.
#[must_use]
pub fn js_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                int.to_string()
            } else if let Some(uint) = number.as_u64() {
                uint.to_string()
            } else {
                number.as_f64().map_or_else(String::new, format_float)
            }
        }
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(js_string).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn format_float(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e21 {
        format!("{number:.0}")
    } else {
        number.to_string()
    }
}

/// Builds a JSON number, preferring an integer representation.
///
/// Non-finite numbers cannot be represented and become `null`.
#[must_use]
pub fn number_value(number: f64) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if !number.is_finite() {
        return Value::Null;
    }
    if number.fract() == 0.0 && number.abs() <= MAX_SAFE {
        return Value::from(number as i64);
    }
    Value::from(number)
}

/// Parses a string with JavaScript `Number()` semantics.
///
/// Returns `NaN` for anything that is not a number literal.
#[must_use]
pub fn parse_js_number(input: &str) -> f64 {
    let text = input.trim();
    if text.is_empty() {
        return 0.0;
    }
    match text {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let radix = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)]
        .into_iter()
        .find_map(|(prefix, radix)| text.strip_prefix(prefix).map(|digits| (digits, radix)));
    if let Some((digits, radix)) = radix {
        return u64::from_str_radix(digits, radix).map_or(f64::NAN, |n| n as f64);
    }
    if DECIMAL.is_match(text) {
        text.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// Parses a date from a timestamp in milliseconds or a date string.
#[must_use]
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => {
            let millis = number.as_f64()? as i64;
            DateTime::from_timestamp_millis(millis)
        }
        Value::String(text) => parse_date_str(text.trim()),
        _ => None,
    }
}

fn parse_date_str(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(parsed) = NaiveDate::parse_from_str(text, format) {
            return parsed.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Formats a date as an ISO 8601 string with millisecond precision.
#[must_use]
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Looks up a dot separated path such as `data.items`.
///
/// Array segments are addressed by index.
#[must_use]
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Writes `new_value` at a dot separated path, creating intermediate objects.
///
/// Returns `false` when an intermediate segment is a scalar or an array index
/// out of range.
pub fn set_path(value: &mut Value, path: &str, new_value: Value) -> bool {
    let mut segments = path.split('.').peekable();
    let mut current = value;
    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let slot = match current {
            Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(slot) => slot,
                None => return false,
            },
            _ => return false,
        };
        if last {
            *slot = new_value;
            return true;
        }
        current = slot;
    }
    false
}

/// Decodes tagged values nested anywhere inside a raw argument.
///
/// `{"$type": "date", "$data": ..}` becomes an ISO date string (or
/// [`INVALID_DATE`]) and `{"$type": "base64", "$data": ..}` becomes an array
/// of bytes. Other values are returned untouched.
#[must_use]
pub fn decode_tagged(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(decoded) = decode_tag(&map) {
                return decoded;
            }
            Value::Object(
                map.into_iter()
                    .map(|(key, nested)| (key, decode_tagged(nested)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(decode_tagged).collect()),
        other => other,
    }
}

fn decode_tag(map: &Map<String, Value>) -> Option<Value> {
    let data = map.get("$data")?;
    match map.get("$type")?.as_str()? {
        "date" => Some(Value::String(
            parse_date(data).map_or_else(|| INVALID_DATE.to_string(), |date| format_date(&date)),
        )),
        "base64" => {
            let bytes = STANDARD.decode(data.as_str()?).ok()?;
            Some(Value::Array(bytes.into_iter().map(Value::from).collect()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_values() {
        for value in [json!(null), json!(false), json!(0), json!(""), json!([]), json!({})] {
            assert!(is_blank(&value), "{value} should be blank");
        }
        for value in [json!(1), json!(-1.5), json!("a"), json!([0]), json!({"a": 1}), json!(true)] {
            assert!(!is_blank(&value), "{value} should not be blank");
        }
    }

    #[test]
    fn zero_and_false_are_not_missing() {
        assert!(!is_missing(&json!(0)));
        assert!(!is_missing(&json!(false)));
        assert!(is_missing(&json!(null)));
        assert!(is_missing(&json!("")));
        assert!(is_missing(&json!([])));
    }

    #[test]
    fn js_string_formats_like_a_client() {
        assert_eq!(js_string(&json!(12)), "12");
        assert_eq!(js_string(&json!(1.5)), "1.5");
        assert_eq!(js_string(&json!(3.0)), "3");
        assert_eq!(js_string(&json!([1, "a", null])), "1,a,");
        assert_eq!(js_string(&json!({"a": 1})), "[object Object]");
    }

    #[test]
    fn parse_js_number_cases() {
        assert_eq!(parse_js_number("000123"), 123.0);
        assert_eq!(parse_js_number(" -12.5 "), -12.5);
        assert_eq!(parse_js_number("0x1A"), 26.0);
        assert_eq!(parse_js_number(""), 0.0);
        assert!(parse_js_number("-123.1.1").is_nan());
        assert!(parse_js_number("inf").is_nan());
    }

    #[test]
    fn number_value_prefers_integers() {
        assert_eq!(number_value(123.0), json!(123));
        assert_eq!(number_value(1.25), json!(1.25));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }

    #[test]
    fn paths_read_and_write() {
        let mut value = json!({"data": {"items": [1, 2]}, "total": 2});
        assert_eq!(get_path(&value, "data.items.1"), Some(&json!(2)));
        assert!(set_path(&mut value, "data.items", json!([])));
        assert!(set_path(&mut value, "meta.page", json!(1)));
        assert_eq!(value, json!({"data": {"items": []}, "total": 2, "meta": {"page": 1}}));
        assert!(!set_path(&mut value, "total.x", json!(1)));
    }

    #[test]
    fn decode_tagged_values() {
        let raw = json!({
            "when": {"$type": "date", "$data": "2020-01-02"},
            "nested": [{"$type": "base64", "$data": "aGk="}],
            "plain": 1
        });
        assert_eq!(
            decode_tagged(raw),
            json!({
                "when": "2020-01-02T00:00:00.000Z",
                "nested": [[104, 105]],
                "plain": 1
            })
        );
    }
}
