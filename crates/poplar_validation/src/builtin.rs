//! Built-in validator and sanitizer libraries.
//!
//! Validators are string predicates over the JS-style string form of a value.
//! Sanitizers take the value and return its replacement.

use std::borrow::Cow;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, LazyLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use poplar_types::value::{format_date, js_string, number_value, parse_date};
use regex::{Captures, Regex, RegexBuilder};
use serde_json::Value;
use url::{Host, Url};
use uuid::{Uuid, Variant};

use crate::sanitizer::{SanitizeError, SanitizerFn};
use crate::validation::ValidatorFn;

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("built-in pattern is valid")
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
});
static FLOAT: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"^[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?$"));
static INT: LazyLock<Regex> = LazyLock::new(|| pattern(r"^[-+]?(?:0|[1-9]\d*)$"));
static NUMERIC: LazyLock<Regex> = LazyLock::new(|| pattern(r"^[-+]?(?:\d*\.)?\d+$"));
static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"^#?(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{4}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})$")
});
static HEXADECIMAL: LazyLock<Regex> = LazyLock::new(|| pattern(r"^(?:0[xXhH])?[0-9a-fA-F]+$"));
static MONGO_ID: LazyLock<Regex> = LazyLock::new(|| pattern(r"^[0-9a-fA-F]{24}$"));
static FQDN_LABEL: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?$"));
static FULL_WIDTH: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"[^\x20-\x7E\x{FF61}-\x{FF9F}\x{FFA0}-\x{FFDC}\x{FFE8}-\x{FFEE}0-9a-zA-Z]")
});
static HALF_WIDTH: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"[\x20-\x7E\x{FF61}-\x{FF9F}\x{FFA0}-\x{FFDC}\x{FFE8}-\x{FFEE}0-9a-zA-Z]")
});
static ISIN: LazyLock<Regex> = LazyLock::new(|| pattern(r"^[A-Z]{2}[0-9A-Z]{9}[0-9]$"));
static ISBN10: LazyLock<Regex> = LazyLock::new(|| pattern(r"^(?:[0-9]{9}X|[0-9]{10})$"));
static ISBN13: LazyLock<Regex> = LazyLock::new(|| pattern(r"^[0-9]{13}$"));

/// Mobile numbers by locale. The `en-US` exchange code may not end in `11`,
/// which is checked on capture group 1.
static MOBILE_PHONES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("zh-CN", r"^(?:\+?0?86-?)?1[345789]\d{9}$"),
        ("en-ZA", r"^(?:\+?27|0)\d{9}$"),
        ("en-AU", r"^(?:\+?61|0)4\d{8}$"),
        ("en-HK", r"^(?:\+?852-?)?[569]\d{3}-?\d{4}$"),
        ("fr-FR", r"^(?:\+?33|0)[67]\d{8}$"),
        ("pt-PT", r"^(?:\+351)?9[1236]\d{7}$"),
        ("el-GR", r"^(?:\+30)?(?:2\d{9}|69\d{8})$"),
        ("en-GB", r"^(?:\+?44|0)7\d{9}$"),
        ("en-US", r"^(?:\+?1)?[2-9]\d{2}[2-9](\d{2})\d{4}$"),
        ("en-ZM", r"^(?:\+26)?09[567]\d{7}$"),
        ("ru-RU", r"^(?:\+?7|8)?9\d{9}$"),
    ]
    .into_iter()
    .map(|(locale, source)| (locale, pattern(source)))
    .collect()
});
static FLOAT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"^[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?"));

// ─────────────────────────────────────────────────────────────────────────────
// Argument helpers
// ─────────────────────────────────────────────────────────────────────────────

fn arg_str(args: &[Value], index: usize) -> Option<String> {
    args.get(index).map(js_string)
}

fn arg_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Reads `(min, max)` bounds given either positionally or as `{min, max}`.
fn bounds(args: &[Value]) -> (Option<f64>, Option<f64>) {
    match args.first() {
        Some(Value::Object(options)) => (
            options.get("min").and_then(arg_f64),
            options.get("max").and_then(arg_f64),
        ),
        _ => (args.first().and_then(arg_f64), args.get(1).and_then(arg_f64)),
    }
}

fn within(n: f64, (min, max): (Option<f64>, Option<f64>)) -> bool {
    min.is_none_or(|min| n >= min) && max.is_none_or(|max| n <= max)
}

fn compare_date(args: &[Value]) -> Option<DateTime<Utc>> {
    match args.first() {
        Some(value) => parse_date(value),
        None => Some(Utc::now()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validators
// ─────────────────────────────────────────────────────────────────────────────

fn validator<F>(f: F) -> ValidatorFn
where
    F: Fn(&str, &[Value]) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn validators() -> Vec<(&'static str, ValidatorFn)> {
    vec![
        ("contains", validator(|s, a| arg_str(a, 0).is_some_and(|seed| s.contains(&seed)))),
        ("equals", validator(|s, a| arg_str(a, 0).is_some_and(|other| s == other))),
        ("isAfter", validator(|s, a| {
            let date = parse_date(&Value::String(s.to_string()));
            date.zip(compare_date(a)).is_some_and(|(d, c)| d > c)
        })),
        ("isBefore", validator(|s, a| {
            let date = parse_date(&Value::String(s.to_string()));
            date.zip(compare_date(a)).is_some_and(|(d, c)| d < c)
        })),
        ("isAlpha", validator(|s, _| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic()))),
        ("isAlphanumeric", validator(|s, _| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
        })),
        ("isAscii", validator(|s, _| s.is_ascii())),
        ("isBase64", validator(|s, _| {
            !s.is_empty() && s.len() % 4 == 0 && STANDARD.decode(s).is_ok()
        })),
        ("isBoolean", validator(|s, _| matches!(s, "true" | "false" | "1" | "0"))),
        ("isByteLength", validator(|s, a| within(s.len() as f64, bounds(a)))),
        ("isCreditCard", validator(|s, _| is_credit_card(s))),
        ("isCurrency", validator(|s, a| is_currency(s, a.first()))),
        ("isDate", validator(|s, _| parse_date(&Value::String(s.to_string())).is_some())),
        ("isDivisibleBy", validator(|s, a| {
            let divisor = a.first().and_then(arg_f64).filter(|d| *d != 0.0);
            let number = s.trim().parse::<f64>().ok();
            number.zip(divisor).is_some_and(|(n, d)| n % d == 0.0)
        })),
        ("isEmail", validator(|s, _| EMAIL.is_match(s))),
        ("isFQDN", validator(|s, _| is_fqdn(s))),
        ("isFullWidth", validator(|s, _| FULL_WIDTH.is_match(s))),
        ("isHalfWidth", validator(|s, _| HALF_WIDTH.is_match(s))),
        ("isVariableWidth", validator(|s, _| FULL_WIDTH.is_match(s) && HALF_WIDTH.is_match(s))),
        ("isSurrogatePair", validator(|s, _| s.chars().any(|c| u32::from(c) > 0xFFFF))),
        ("isISBN", validator(|s, a| is_isbn(s, a.first().and_then(arg_f64)))),
        ("isISIN", validator(|s, _| is_isin(s))),
        ("isMobilePhone", validator(|s, a| is_mobile_phone(s, arg_str(a, 0).as_deref()))),
        ("isFloat", validator(|s, a| {
            FLOAT.is_match(s) && s.parse::<f64>().is_ok_and(|n| within(n, bounds(a)))
        })),
        ("isHexColor", validator(|s, _| HEX_COLOR.is_match(s))),
        ("isHexadecimal", validator(|s, _| HEXADECIMAL.is_match(s))),
        ("isIP", validator(|s, a| is_ip(s, a.first().and_then(arg_f64)))),
        ("isIn", validator(|s, a| match a.first() {
            Some(Value::Array(options)) => options.iter().any(|option| js_string(option) == s),
            Some(Value::Object(options)) => options.contains_key(s),
            Some(other) => js_string(other) == s,
            None => false,
        })),
        ("isInt", validator(|s, a| {
            INT.is_match(s) && s.parse::<f64>().is_ok_and(|n| within(n, bounds(a)))
        })),
        ("isJSON", validator(|s, _| {
            matches!(serde_json::from_str::<Value>(s), Ok(Value::Object(_) | Value::Array(_)))
        })),
        ("isLength", validator(|s, a| {
            let (min, max) = bounds(a);
            within(s.chars().count() as f64, (min.or(Some(0.0)), max))
        })),
        ("isLowercase", validator(|s, _| s == s.to_lowercase())),
        ("isUppercase", validator(|s, _| s == s.to_uppercase())),
        ("isMongoId", validator(|s, _| MONGO_ID.is_match(s))),
        ("isMultibyte", validator(|s, _| !s.is_ascii())),
        ("isNull", validator(|s, _| s.is_empty())),
        ("isNumeric", validator(|s, _| NUMERIC.is_match(s))),
        ("isURL", validator(|s, _| is_url(s))),
        ("isUUID", validator(|s, a| is_uuid(s, a.first().map(js_string)))),
        ("matches", validator(|s, a| matches_pattern(s, a))),
        ("required", validator(|s, _| !s.is_empty())),
    ]
}

fn is_credit_card(input: &str) -> bool {
    let digits: Vec<u32> = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .map(|c| c.to_digit(10))
        .collect::<Option<_>>()
        .unwrap_or_default();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Currency amounts, e.g. `$1,000.00`.
///
/// Options: `symbol` (`$`), `require_symbol`, `allow_space_after_symbol`,
/// `symbol_after_digits`, `allow_negatives` (true), `thousands_separator`
/// (`,`) and `decimal_separator` (`.`).
fn is_currency(input: &str, options: Option<&Value>) -> bool {
    let option = |key: &str| options.and_then(|o| o.get(key));
    let flag = |key: &str, default: bool| option(key).and_then(Value::as_bool).unwrap_or(default);
    let text = |key: &str, default: &str| {
        regex::escape(&option(key).map_or_else(|| default.to_string(), js_string))
    };

    let symbol = format!(
        "(?:{}){}",
        text("symbol", "$"),
        if flag("require_symbol", false) { "" } else { "?" }
    );
    let space = if flag("allow_space_after_symbol", false) { r"\s?" } else { "" };
    let thousands = text("thousands_separator", ",");
    let decimal = text("decimal_separator", ".");
    let number = format!(r"(?:0|[1-9]\d{{0,2}}(?:{thousands}\d{{3}})*|[1-9]\d*)(?:{decimal}\d{{2}})?");
    let negative = if flag("allow_negatives", true) { "-?" } else { "" };
    let source = if flag("symbol_after_digits", false) {
        format!("^{negative}{number}{space}{symbol}$")
    } else {
        format!("^{negative}{symbol}{space}{number}$")
    };
    Regex::new(&source).is_ok_and(|regex| regex.is_match(input))
}

fn is_isbn(input: &str, version: Option<f64>) -> bool {
    let compact: String = input.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    let digit = |c: char| c.to_digit(10).unwrap_or(10);
    let isbn10 = || {
        ISBN10.is_match(&compact) && {
            let sum: u32 = compact
                .chars()
                .enumerate()
                .map(|(i, c)| (i as u32 + 1) * digit(c))
                .sum();
            sum % 11 == 0
        }
    };
    let isbn13 = || {
        ISBN13.is_match(&compact) && {
            let digits: Vec<u32> = compact.chars().map(digit).collect();
            let sum: u32 = digits[..12]
                .iter()
                .enumerate()
                .map(|(i, d)| if i % 2 == 0 { *d } else { d * 3 })
                .sum();
            (10 - sum % 10) % 10 == digits[12]
        }
    };
    match version {
        Some(v) if v == 10.0 => isbn10(),
        Some(v) if v == 13.0 => isbn13(),
        Some(_) => false,
        None => isbn10() || isbn13(),
    }
}

fn is_isin(input: &str) -> bool {
    if !ISIN.is_match(input) {
        return false;
    }
    // Letters expand to their base-36 value before the Luhn pass.
    let expanded: Vec<u32> = input
        .chars()
        .filter_map(|c| c.to_digit(36))
        .flat_map(|n| {
            if n >= 10 {
                vec![n / 10, n % 10]
            } else {
                vec![n]
            }
        })
        .collect();
    let Some((check, body)) = expanded.split_last() else {
        return false;
    };
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled >= 10 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    (10 - sum % 10) % 10 == *check
}

fn is_mobile_phone(input: &str, locale: Option<&str>) -> bool {
    let Some((locale, regex)) = MOBILE_PHONES.iter().find(|(name, _)| Some(*name) == locale) else {
        tracing::debug!(locale = ?locale, "unknown mobile phone locale");
        return false;
    };
    match regex.captures(input) {
        Some(captures) if *locale == "en-US" => captures.get(1).is_some_and(|m| m.as_str() != "11"),
        Some(_) => true,
        None => false,
    }
}

fn is_fqdn(input: &str) -> bool {
    let host = input.strip_suffix('.').unwrap_or(input);
    let labels: Vec<&str> = host.split('.').collect();
    let Some(tld) = labels.last() else {
        return false;
    };
    labels.len() >= 2
        && tld.len() >= 2
        && tld.chars().all(|c| c.is_ascii_alphabetic())
        && labels.iter().all(|label| FQDN_LABEL.is_match(label))
}

fn is_ip(input: &str, version: Option<f64>) -> bool {
    match version {
        Some(v) if v == 4.0 => input.parse::<Ipv4Addr>().is_ok(),
        Some(v) if v == 6.0 => input.parse::<Ipv6Addr>().is_ok(),
        _ => input.parse::<Ipv4Addr>().is_ok() || input.parse::<Ipv6Addr>().is_ok(),
    }
}

fn is_url(input: &str) -> bool {
    if input.is_empty() || input.len() >= 2083 || input.chars().any(char::is_whitespace) {
        return false;
    }
    let absolute = if input.contains("://") {
        input.to_string()
    } else {
        format!("http://{input}")
    };
    let Ok(url) = Url::parse(&absolute) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https" | "ftp") {
        return false;
    }
    match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost" || is_fqdn(domain),
        Some(Host::Ipv4(_) | Host::Ipv6(_)) => true,
        None => false,
    }
}

/// Hyphenated RFC 4122 UUIDs, versions 1 to 5, optionally pinned to one
/// version.
fn is_uuid(input: &str, version: Option<String>) -> bool {
    if input.len() != 36 {
        return false;
    }
    let Ok(uuid) = Uuid::parse_str(input) else {
        return false;
    };
    let actual = uuid.get_version_num();
    if uuid.get_variant() != Variant::RFC4122 || !(1..=5).contains(&actual) {
        return false;
    }
    match version.as_deref() {
        None | Some("all" | "") => true,
        Some(version) => version.parse::<usize>().is_ok_and(|v| v == actual),
    }
}

fn matches_pattern(input: &str, args: &[Value]) -> bool {
    let Some(source) = arg_str(args, 0) else {
        return false;
    };
    let flags = arg_str(args, 1).unwrap_or_default();
    match RegexBuilder::new(&source)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
    {
        Ok(regex) => regex.is_match(input),
        Err(error) => {
            tracing::debug!(pattern = %source, %error, "invalid pattern for 'matches'");
            false
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sanitizers
// ─────────────────────────────────────────────────────────────────────────────

fn sanitizer<F>(f: F) -> SanitizerFn
where
    F: Fn(&Value, &[Value]) -> Result<Value, SanitizeError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn text<F>(f: F) -> SanitizerFn
where
    F: Fn(&str, &[Value]) -> String + Send + Sync + 'static,
{
    sanitizer(move |value, args| Ok(Value::String(f(&js_string(value), args))))
}

pub(crate) fn sanitizers() -> Vec<(&'static str, SanitizerFn)> {
    vec![
        ("blacklist", text(|s, a| {
            let chars = arg_str(a, 0).unwrap_or_default();
            s.chars().filter(|c| !chars.contains(*c)).collect()
        })),
        ("whitelist", text(|s, a| {
            let chars = arg_str(a, 0).unwrap_or_default();
            s.chars().filter(|c| chars.contains(*c)).collect()
        })),
        ("escape", text(|s, _| escape(s))),
        ("ltrim", text(|s, a| match arg_str(a, 0) {
            Some(chars) => s.trim_start_matches(|c| chars.contains(c)).to_string(),
            None => s.trim_start().to_string(),
        })),
        ("rtrim", text(|s, a| match arg_str(a, 0) {
            Some(chars) => s.trim_end_matches(|c| chars.contains(c)).to_string(),
            None => s.trim_end().to_string(),
        })),
        ("trim", text(|s, a| match arg_str(a, 0) {
            Some(chars) => s.trim_matches(|c| chars.contains(c)).to_string(),
            None => s.trim().to_string(),
        })),
        ("stripLow", text(|s, a| {
            let keep_new_lines = a.first().is_some_and(|v| v.as_bool() == Some(true));
            s.chars()
                .filter(|&c| {
                    let low = (c as u32) < 32 || c == '\u{7f}';
                    !low || (keep_new_lines && matches!(c, '\n' | '\r'))
                })
                .collect()
        })),
        ("normalizeEmail", sanitizer(|value, _| Ok(normalize_email(&js_string(value))))),
        ("toBoolean", sanitizer(|value, args| {
            let s = js_string(value);
            let strict = args.first().is_some_and(|v| v.as_bool() == Some(true));
            Ok(Value::Bool(if strict {
                matches!(s.as_str(), "1" | "true")
            } else {
                !matches!(s.as_str(), "0" | "false" | "")
            }))
        })),
        ("toDate", sanitizer(|value, _| {
            let date = match value {
                Value::Number(_) => parse_date(value),
                other => parse_date(&Value::String(js_string(other))),
            };
            Ok(date.map_or(Value::Null, |d| Value::String(format_date(&d))))
        })),
        ("toFloat", sanitizer(|value, _| Ok(to_float(&js_string(value))))),
        ("toInt", sanitizer(|value, args| {
            let radix = args.first().and_then(arg_f64).map_or(10, |r| r as u32);
            Ok(to_int(&js_string(value), radix))
        })),
        ("toString", text(|s, _| s.to_string())),
        ("xss", text(|s, _| xss(s))),
    ]
}

fn escape(input: &str) -> String {
    html_escape::encode_safe(input)
        .replace('\\', "&#x5C;")
        .replace('`', "&#96;")
}

fn normalize_email(input: &str) -> Value {
    if !EMAIL.is_match(input) {
        return Value::Bool(false);
    }
    let Some((local, domain)) = input.rsplit_once('@') else {
        return Value::Bool(false);
    };
    let domain = domain.to_lowercase();
    let mut local = local.to_lowercase();
    if matches!(domain.as_str(), "gmail.com" | "googlemail.com") {
        local = local.split('+').next().unwrap_or_default().replace('.', "");
        return Value::String(format!("{local}@gmail.com"));
    }
    Value::String(format!("{local}@{domain}"))
}

fn to_float(input: &str) -> Value {
    FLOAT_PREFIX
        .find(input.trim_start())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map_or(Value::Null, number_value)
}

fn to_int(input: &str, radix: u32) -> Value {
    if !(2..=36).contains(&radix) {
        return Value::Null;
    }
    let trimmed = input.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits)
    } else {
        digits
    };
    let prefix: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
    match i64::from_str_radix(&prefix, radix) {
        Ok(n) => Value::from(if negative { -n } else { n }),
        Err(_) => Value::Null,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// XSS filtering
// ─────────────────────────────────────────────────────────────────────────────

const ALLOWED_TAGS: &[&str] = &[
    "a", "b", "blockquote", "br", "code", "div", "em", "h1", "h2", "h3", "h4", "h5", "h6", "hr",
    "i", "img", "li", "ol", "p", "pre", "small", "span", "strong", "sub", "sup", "table", "tbody",
    "td", "th", "thead", "tr", "u", "ul",
];

const ALLOWED_ATTRIBUTES: &[&str] = &[
    "alt", "class", "height", "href", "src", "target", "title", "width",
];

static IGNORED_BODIES: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"<(script|style|iframe)\b[^>]*>.*?</(?:script|style|iframe)\s*>")
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .expect("built-in pattern is valid")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| pattern(r"<(/?)([A-Za-z][A-Za-z0-9]*)([^<>]*)>"));
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*("[^"]*"|'[^']*'|[^\s"'>]+))?"#)
});

/// Removes script bodies, escapes tags outside the allow list and drops
/// unknown attributes and unsafe links from the remaining ones.
fn xss(input: &str) -> String {
    let without_bodies = IGNORED_BODIES.replace_all(input, "");
    TAG.replace_all(&without_bodies, |caps: &Captures<'_>| {
        let tag = caps[2].to_ascii_lowercase();
        if !ALLOWED_TAGS.contains(&tag.as_str()) {
            return caps[0].replace('<', "&lt;").replace('>', "&gt;");
        }
        if !caps[1].is_empty() {
            return format!("</{tag}>");
        }
        let mut out = format!("<{tag}");
        for attr in ATTRIBUTE.captures_iter(&caps[3]) {
            let name = attr[1].to_ascii_lowercase();
            if !ALLOWED_ATTRIBUTES.contains(&name.as_str()) {
                continue;
            }
            let raw = attr.get(2).map_or("", |m| m.as_str());
            let value = raw.trim_matches(|c| c == '"' || c == '\'');
            if matches!(name.as_str(), "href" | "src") && is_unsafe_url(value) {
                continue;
            }
            out.push_str(&format!(" {name}=\"{}\"", value.replace('"', "&quot;")));
        }
        if caps[3].trim_end().ends_with('/') {
            out.push_str(" /");
        }
        out.push('>');
        out
    })
    .into_owned()
}

const SAFE_SCHEMES: &[&str] = &["http", "https", "ftp", "mailto", "tel"];

/// Whether an attribute value carries a scheme outside [`SAFE_SCHEMES`] once
/// entity and percent escapes are resolved. Relative URLs are safe.
fn is_unsafe_url(value: &str) -> bool {
    let mut decoded = value.to_string();
    // Nested encodings like `&amp;#106;` need more than one pass.
    for _ in 0..4 {
        let entities = html_escape::decode_html_entities(&decoded).into_owned();
        let next = urlencoding::decode(&entities).map_or_else(|_| entities.clone(), Cow::into_owned);
        if next == decoded {
            break;
        }
        decoded = next;
    }
    let compact: String = decoded
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    let Some((scheme, _)) = compact.split_once(':') else {
        return false;
    };
    let relative = scheme.starts_with('#') || scheme.contains(['/', '?']);
    !relative && !SAFE_SCHEMES.contains(&scheme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(name: &str, value: &str, args: &[Value]) -> bool {
        let validators = validators();
        let (_, validator) = validators
            .iter()
            .find(|(n, _)| *n == name)
            .expect("validator exists");
        validator(value, args)
    }

    fn run(name: &str, value: Value, args: &[Value]) -> Value {
        let sanitizers = sanitizers();
        let (_, sanitizer) = sanitizers
            .iter()
            .find(|(n, _)| *n == name)
            .expect("sanitizer exists");
        sanitizer(&value, args).expect("sanitizer succeeds")
    }

    #[test]
    fn length_and_numbers() {
        assert!(check("isLength", "Felix", &[json!(5), json!(15)]));
        assert!(!check("isLength", "Fel", &[json!(5), json!(15)]));
        assert!(check("isLength", "abc", &[json!({"min": 1, "max": 3})]));
        assert!(check("isInt", "-12", &[]));
        assert!(!check("isInt", "012", &[]));
        assert!(check("isInt", "7", &[json!({"min": 1, "max": 10})]));
        assert!(!check("isInt", "11", &[json!({"min": 1, "max": 10})]));
        assert!(check("isFloat", "1.5e3", &[]));
        assert!(check("isNumeric", "+.5", &[]));
        assert!(check("isDivisibleBy", "12", &[json!(4)]));
        assert!(!check("isDivisibleBy", "12", &[json!(0)]));
    }

    #[test]
    fn formats() {
        assert!(check("isEmail", "felix@example.com", &[]));
        assert!(!check("isEmail", "felix@localhost", &[]));
        assert!(check("isURL", "https://example.com:8080/path?q=1", &[]));
        assert!(check("isURL", "example.com", &[]));
        assert!(!check("isURL", "javascript://alert", &[]));
        assert!(check("isIP", "::1", &[json!(6)]));
        assert!(!check("isIP", "::1", &[json!(4)]));
        assert!(check("isUUID", "a987fbc9-4bed-3078-af07-9141ba07c9f3", &[json!(3)]));
        assert!(!check("isUUID", "a987fbc9-4bed-3078-af07-9141ba07c9f3", &[json!(4)]));
        assert!(check("isUUID", "A987FBC9-4BED-4078-8F07-9141BA07C9F3", &[json!("all")]));
        assert!(!check("isUUID", "a987fbc94bed3078af079141ba07c9f3", &[]));
        assert!(!check("isUUID", "a987fbc9-4bed-3078-cf07-9141ba07c9f3", &[]));
        assert!(check("isURL", "http://[::1]:8080/", &[]));
        assert!(check("isURL", "ftp://user@files.example.com/a.txt", &[]));
        assert!(!check("isURL", "http://example.com:99999", &[]));
        assert!(!check("isURL", "http://exa mple.com", &[]));
        assert!(check("isCreditCard", "4111 1111 1111 1111", &[]));
        assert!(!check("isCreditCard", "4111 1111 1111 1112", &[]));
        assert!(check("isMongoId", "507f1f77bcf86cd799439011", &[]));
        assert!(check("isBase64", "aGVsbG8=", &[]));
        assert!(check("isJSON", "{\"a\":1}", &[]));
        assert!(!check("isJSON", "1", &[]));
        assert!(check("isHexColor", "#ff0000", &[]));
        assert!(check("isFQDN", "poplar.example.org", &[]));
        assert!(!check("isFQDN", "localhost", &[]));
    }

    #[test]
    fn identifiers_and_amounts() {
        assert!(check("isISBN", "3836221195", &[]));
        assert!(check("isISBN", "3-8362-2119-5", &[json!(10)]));
        assert!(check("isISBN", "080442957X", &[json!(10)]));
        assert!(!check("isISBN", "3836221196", &[]));
        assert!(check("isISBN", "9783836221191", &[json!(13)]));
        assert!(check("isISBN", "978-3-8362-2119-1", &[]));
        assert!(!check("isISBN", "9783836221190", &[]));
        assert!(!check("isISBN", "3836221195", &[json!(13)]));

        assert!(check("isISIN", "US0378331005", &[]));
        assert!(check("isISIN", "AU0000XVGZA3", &[]));
        assert!(!check("isISIN", "US0378331004", &[]));
        assert!(!check("isISIN", "us0378331005", &[]));

        assert!(check("isCurrency", "$10,123.45", &[]));
        assert!(check("isCurrency", "-$1,000", &[]));
        assert!(check("isCurrency", "10123.45", &[]));
        assert!(!check("isCurrency", "$1,00", &[]));
        assert!(!check("isCurrency", "10.1", &[]));
        assert!(!check("isCurrency", "10", &[json!({"require_symbol": true})]));
        assert!(check("isCurrency", "10 €", &[json!({
            "symbol": "€",
            "symbol_after_digits": true,
            "allow_space_after_symbol": true
        })]));
        assert!(check("isCurrency", "1.000,50", &[json!({
            "thousands_separator": ".",
            "decimal_separator": ","
        })]));
        assert!(!check("isCurrency", "-5", &[json!({"allow_negatives": false})]));
    }

    #[test]
    fn widths_and_phones() {
        assert!(check("isFullWidth", "ｆｕｌｌ", &[]));
        assert!(!check("isFullWidth", "half", &[]));
        assert!(check("isHalfWidth", "ｌａｔｅｒ later", &[]));
        assert!(!check("isHalfWidth", "ｆｕｌｌ", &[]));
        assert!(check("isVariableWidth", "ｆｕｌｌ half", &[]));
        assert!(!check("isVariableWidth", "half", &[]));
        assert!(check("isSurrogatePair", "poplar 🌳", &[]));
        assert!(!check("isSurrogatePair", "poplar", &[]));

        assert!(check("isMobilePhone", "15323456787", &[json!("zh-CN")]));
        assert!(check("isMobilePhone", "+447912345678", &[json!("en-GB")]));
        assert!(check("isMobilePhone", "0612345678", &[json!("fr-FR")]));
        assert!(check("isMobilePhone", "2125556789", &[json!("en-US")]));
        assert!(!check("isMobilePhone", "2125116789", &[json!("en-US")]));
        assert!(!check("isMobilePhone", "2125556789", &[json!("xx-XX")]));
        assert!(!check("isMobilePhone", "2125556789", &[]));
    }

    #[test]
    fn membership_and_patterns() {
        assert!(check("isIn", "b", &[json!(["a", "b"])]));
        assert!(!check("isIn", "c", &[json!(["a", "b"])]));
        assert!(check("matches", "ABC", &[json!("^abc$"), json!("i")]));
        assert!(!check("matches", "ABC", &[json!("^abc$")]));
        assert!(!check("matches", "x", &[json!("(")]));
        assert!(check("contains", "poplar", &[json!("pla")]));
        assert!(check("equals", "12", &[json!(12)]));
        assert!(check("isAfter", "2020-01-02", &[json!("2020-01-01")]));
        assert!(check("isBefore", "2020-01-01", &[json!("2020-01-02")]));
    }

    #[test]
    fn string_sanitizers() {
        assert_eq!(run("trim", json!("  x  "), &[]), json!("x"));
        assert_eq!(run("ltrim", json!("--x--"), &[json!("-")]), json!("x--"));
        assert_eq!(run("rtrim", json!("--x--"), &[json!("-")]), json!("--x"));
        assert_eq!(run("whitelist", json!("a1b2"), &[json!("ab")]), json!("ab"));
        assert_eq!(run("stripLow", json!("a\u{0}b\nc"), &[json!(true)]), json!("ab\nc"));
        assert_eq!(run("escape", json!("<a href='x'>"), &[]), json!("&lt;a href=&#x27;x&#x27;&gt;"));
        assert_eq!(run("toString", json!(12), &[]), json!("12"));
        assert_eq!(run("escape", json!("a/b\\c`d\"&"), &[]), json!("a&#x2F;b&#x5C;c&#96;d&quot;&amp;"));
    }

    #[test]
    fn coercing_sanitizers() {
        assert_eq!(run("toInt", json!("42px"), &[]), json!(42));
        assert_eq!(run("toInt", json!("ff"), &[json!(16)]), json!(255));
        assert_eq!(run("toInt", json!("px"), &[]), json!(null));
        assert_eq!(run("toFloat", json!(" 3.25abc"), &[]), json!(3.25));
        assert_eq!(run("toBoolean", json!("yes"), &[]), json!(true));
        assert_eq!(run("toBoolean", json!("yes"), &[json!(true)]), json!(false));
        assert_eq!(run("toDate", json!("2016-01-01"), &[]), json!("2016-01-01T00:00:00.000Z"));
        assert_eq!(run("toDate", json!("nope"), &[]), json!(null));
    }

    #[test]
    fn normalize_email_rules() {
        assert_eq!(
            run("normalizeEmail", json!("Some.One+tag@GoogleMail.com"), &[]),
            json!("someone@gmail.com")
        );
        assert_eq!(run("normalizeEmail", json!("A@Example.COM"), &[]), json!("a@example.com"));
        assert_eq!(run("normalizeEmail", json!("nope"), &[]), json!(false));
    }

    #[test]
    fn xss_filtering() {
        assert_eq!(run("xss", json!("<script>alert(1)</script>hi"), &[]), json!("hi"));
        assert_eq!(
            run("xss", json!("<a href=\"javascript:alert(1)\" onclick=\"x\" title='t'>l</a>"), &[]),
            json!("<a title=\"t\">l</a>")
        );
        assert_eq!(run("xss", json!("<blink>x</blink>"), &[]), json!("&lt;blink&gt;x&lt;/blink&gt;"));
        assert_eq!(run("xss", json!("<br/>"), &[]), json!("<br />"));
    }

    #[test]
    fn xss_resolves_encoded_schemes() {
        let dropped = json!("<a>x</a>");
        for href in [
            "&#106;avascript:alert(1)",
            "&#x6A;avascript:alert(1)",
            "&#106avascript:alert(1)",
            "&amp;#106;avascript:alert(1)",
            "%6Aavascript:alert(1)",
            "java&#x09;script:alert(1)",
            "JaVaScRiPt:alert(1)",
            "vbscript:msgbox(1)",
            "data:text/html;base64,PHNjcmlwdD4=",
        ] {
            let html = format!("<a href=\"{href}\">x</a>");
            assert_eq!(run("xss", json!(html), &[]), dropped, "{href}");
        }

        assert_eq!(
            run("xss", json!("<a href=\"https://example.com/a:b\">x</a>"), &[]),
            json!("<a href=\"https://example.com/a:b\">x</a>")
        );
        assert_eq!(
            run("xss", json!("<a href=\"/docs?at=10:30\">x</a>"), &[]),
            json!("<a href=\"/docs?at=10:30\">x</a>")
        );
        assert_eq!(
            run("xss", json!("<a href=\"#step:2\">x</a>"), &[]),
            json!("<a href=\"#step:2\">x</a>")
        );
        assert_eq!(
            run("xss", json!("<img src=\"&#x6A;avascript:x\" title=\"Note: kept\">"), &[]),
            json!("<img title=\"Note: kept\">")
        );
        assert_eq!(
            run("xss", json!("<a href=\"mailto:felix@example.com\">x</a>"), &[]),
            json!("<a href=\"mailto:felix@example.com\">x</a>")
        );
    }
}
