//! Declared value types.

use core::fmt;

/// Type names every converter registry understands out of the box.
pub const BASIC_TYPES: [&str; 7] = [
    "string", "number", "date", "boolean", "buffer", "object", "any",
];

/// The declared type of an argument or entity field.
///
/// A type is either a scalar name (`"number"`) or a list wrapping exactly one
/// scalar name (`["number"]`, written `"[number]"` in string form).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeSpec {
    name: String,
    list: bool,
}

impl TypeSpec {
    /// Creates a scalar type.
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            list: false,
        }
    }

    /// Creates a list type wrapping the given scalar type.
    #[must_use]
    pub fn list(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            list: true,
        }
    }

    /// Parses `"number"` or `"[number]"`.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        match trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            Some(inner) => Self::list(inner.trim()),
            None => Self::scalar(trimmed),
        }
    }

    /// Returns the same type with its scalar name reduced to one of
    /// [`BASIC_TYPES`].
    ///
    /// Names are compared case-insensitively; custom model names degrade to
    /// `object`.
    #[must_use]
    pub fn basic(&self) -> Self {
        let lowered = self.name.to_ascii_lowercase();
        let name = if BASIC_TYPES.contains(&lowered.as_str()) {
            lowered
        } else {
            "object".to_string()
        };
        Self {
            name,
            list: self.list,
        }
    }

    /// The scalar type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a list type.
    #[must_use]
    pub fn is_list(&self) -> bool {
        self.list
    }
}

impl Default for TypeSpec {
    fn default() -> Self {
        Self::scalar("any")
    }
}

impl From<&str> for TypeSpec {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.list {
            write!(f, "[{}]", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}
