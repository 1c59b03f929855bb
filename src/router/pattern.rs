//! Route pattern compilation and path-variable extraction.
//!
//! Two wildcard tokens are recognised:
//!
//! | Token | Matches                                  |
//! |-------|------------------------------------------|
//! | `**`  | any run of characters, `/` included      |
//! | `*`   | any run of characters within one segment |
//!
//! Every pattern is a prefix match: the compiled expression is anchored at the
//! start of the path only, and an implicit trailing capture swallows whatever
//! remains. `/users` therefore matches `/users/42/edit` and captures `/42/edit`.
//!
//! Everything else in a pattern is regex syntax and reaches the engine
//! unchanged.

use regex::Regex;

const ACROSS_SEGMENTS: &str = "(.*)";
const WITHIN_SEGMENT: &str = "([^/]*)";

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a route pattern.
    ///
    /// `**` is resolved before `*`, so a `*` that belongs to a `**` is never
    /// reinterpreted as a single-segment wildcard. All other text is passed to
    /// the regex engine as written: `.` matches any character, and a group
    /// such as `(1|2)` captures into the path variables like a wildcard does.
    ///
    /// # Errors
    ///
    /// Returns the regex engine's error when the rewritten expression is not
    /// a valid regex or exceeds its size limits.
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let body = pattern
            .split("**")
            .map(|run| run.replace('*', WITHIN_SEGMENT))
            .collect::<Vec<_>>()
            .join(ACROSS_SEGMENTS);
        let expr = format!("^{body}{ACROSS_SEGMENTS}");

        Ok(Self {
            source: pattern.to_owned(),
            regex: Regex::new(&expr)?,
        })
    }

    /// The pattern string this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match `path`, returning the captured path variables on success.
    ///
    /// Every capture group, the implicit trailing one included, is split on
    /// `/`; the pieces are concatenated in order and empty pieces dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use waypost::router::Pattern;
    ///
    /// let pattern = Pattern::compile("/a/*").unwrap();
    /// assert_eq!(pattern.matches("/a/b/c"), Some(vec!["b".to_owned(), "c".to_owned()]));
    /// assert_eq!(pattern.matches("/x/b"), None);
    /// ```
    pub fn matches(&self, path: &str) -> Option<Vec<String>> {
        let captures = self.regex.captures(path)?;
        Some(
            captures
                .iter()
                .skip(1)
                .flatten()
                .flat_map(|group| group.as_str().split('/'))
                .filter(|piece| !piece.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }
}
