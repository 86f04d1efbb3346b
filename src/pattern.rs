use std::fmt;

use regex::Regex;

/// The compiled form of a bare `*` glob.
///
/// Callers test a pattern against this before invoking the regex at all:
/// a bare-wildcard pattern matches every non-empty string, so evaluating
/// it per record is wasted work.
pub const MATCH_ANY_PATTERN: &str = "^.+$";

/// A glob pattern compiled into an anchored regex.
///
/// Produced by [`escape_and_globify()`]. Matching is always a full-string
/// match, never a substring search.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    /// Whether the given text matches this pattern in full.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Whether this is the bare-`*` pattern that matches any non-empty
    /// string. The fast path for callers that special-case it.
    #[must_use]
    pub fn matches_any(&self) -> bool {
        self.source == MATCH_ANY_PATTERN
    }

    /// The anchored regex source this pattern compiled to.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for GlobPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Compile a glob string into an anchored [`GlobPattern`].
///
/// Every regex metacharacter in the input is escaped, then each literal
/// `*` becomes `.+`. One-or-more, not zero-or-more: `*@company.com` must
/// never match a zero-length local part.
///
/// # Errors
///
/// Returns [`regex::Error`] if the resulting expression fails to compile.
pub fn escape_and_globify(pattern: &str) -> Result<GlobPattern, regex::Error> {
    let escaped = regex::escape(pattern).replace("\\*", ".+");
    let source = format!("^{escaped}$");
    let regex = Regex::new(&source)?;
    Ok(GlobPattern { source, regex })
}
