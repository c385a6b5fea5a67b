//! Glob matching over dot separated names.
//!
//! Hook keys, method full names and state names are dot separated. Patterns
//! are matched segment-wise: `*` matches exactly one segment and `**` any
//! number of segments. `?`, `[..]` and `{a,b}` work within a segment.

use globset::{GlobBuilder, GlobMatcher};

use crate::error::RegistrationError;

/// A compiled dotted glob.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    matcher: GlobMatcher,
}

impl Pattern {
    /// Compiles `source`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidPattern`] when `source` is not a
    /// valid glob.
    pub fn new(source: impl Into<String>) -> Result<Self, RegistrationError> {
        let source = source.into();
        let matcher = GlobBuilder::new(&to_path(&source))
            .literal_separator(true)
            .build()
            .map_err(|error| RegistrationError::InvalidPattern {
                pattern: source.clone(),
                message: error.kind().to_string(),
            })?
            .compile_matcher();
        Ok(Self { source, matcher })
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `name` matches.
    #[must_use]
    pub fn is_match(&self, name: &str) -> bool {
        self.matcher.is_match(to_path(name))
    }
}

/// One-off match; an invalid pattern matches nothing.
#[must_use]
pub fn matches(pattern: &str, name: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(pattern) => pattern.is_match(name),
        Err(error) => {
            tracing::debug!(%error, "ignoring invalid pattern");
            false
        }
    }
}

fn to_path(name: &str) -> String {
    name.replace('.', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_double_star() {
        assert!(matches("before.users.*", "before.users.info"));
        assert!(!matches("before.users.*", "before.users.info.extra"));
        assert!(matches("before.**", "before.users.info"));
        assert!(matches("**", "users.info"));
        assert!(!matches("after.**", "afterError.users.info"));
        assert!(!matches("before.users.info", "before.users.infos"));
    }

    #[test]
    fn segment_wildcards() {
        assert!(matches("before.users.{info,list}", "before.users.list"));
        assert!(matches("before.users.inf?", "before.users.info"));
        assert!(matches("before.*.info", "before.posts.info"));
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(matches!(
            Pattern::new("before.users.[info"),
            Err(RegistrationError::InvalidPattern { .. })
        ));
        assert!(!matches("before.users.[info", "before.users.info"));
    }
}
