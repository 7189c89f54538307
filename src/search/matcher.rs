//! Query matching for name searches and string literal scans.
//!
//! Plain queries are case-insensitive substrings. Regular expressions are compiled
//! case-insensitively under the configured size limit, and a pattern that fails to compile
//! matches nothing rather than failing the query.

use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Compiled form of a search query
#[derive(Debug, Clone)]
pub(crate) enum Matcher {
    /// Empty query
    All,
    /// Lowercased needle, matched case-insensitively
    Substring(String),
    Regex(Regex),
    /// A pattern that failed to compile
    Never,
}

impl Matcher {
    pub fn new(query: &str, use_regex: bool, size_limit: usize) -> Matcher {
        if query.is_empty() {
            return Matcher::All;
        }

        if !use_regex {
            return Matcher::Substring(query.to_lowercase());
        }

        match RegexBuilder::new(query)
            .case_insensitive(true)
            .size_limit(size_limit)
            .build()
        {
            Ok(regex) => Matcher::Regex(regex),
            Err(error) => {
                debug!(pattern = query, %error, "search pattern rejected");
                Matcher::Never
            }
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::All => true,
            Matcher::Substring(needle) => text.to_lowercase().contains(needle.as_str()),
            Matcher::Regex(regex) => regex.is_match(text),
            Matcher::Never => false,
        }
    }

    /// Matches against a simple name or a full name
    pub fn matches_name(&self, name: &str, full_name: &str) -> bool {
        self.is_match(name) || self.is_match(full_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_is_case_insensitive() {
        let matcher = Matcher::new("simple", false, 1 << 20);
        assert!(matcher.is_match("Sample.SimpleClass"));
        assert!(!matcher.is_match("Sample.Program"));
        assert!(matcher.matches_name("Other", "Ns.SIMPLE"));
    }

    #[test]
    fn empty_matches_everything() {
        assert!(Matcher::new("", true, 1 << 20).is_match(""));
        assert!(Matcher::new("", false, 1 << 20).is_match("anything"));
    }

    #[test]
    fn regex_and_limits() {
        let matcher = Matcher::new("^dog$", true, 1 << 20);
        assert!(matcher.is_match("Dog"));
        assert!(!matcher.is_match("Hotdog"));

        assert!(!Matcher::new("(unclosed", true, 1 << 20).is_match("(unclosed"));
        // a pattern whose compiled program exceeds the limit never matches
        assert!(!Matcher::new("\\w{1000}", true, 1024).is_match("a"));
    }
}
