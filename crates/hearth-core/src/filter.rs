//! Exact-word content filter.
//!
//! A message is blocked when any whitespace-delimited token, lowercased,
//! is in the blocklist. Substrings and punctuation-attached words do not
//! match.

use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    words: HashSet<String>,
}

impl ContentFilter {
    /// Build a filter; entries are trimmed and lowercased, blanks dropped.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        filter.extend(words);
        filter
    }

    pub fn extend<I, S>(&mut self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.words.extend(
            words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty()),
        );
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn is_blocked(&self, text: &str) -> bool {
        if self.words.is_empty() {
            return false;
        }
        text.to_lowercase()
            .split_whitespace()
            .any(|token| self.words.contains(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_is_case_insensitive_and_whole_word() {
        let filter = ContentFilter::new(["hello"]);
        assert!(filter.is_blocked("HELLO world"));
        assert!(filter.is_blocked("say\thello\nthere"));
        assert!(!filter.is_blocked("helloworld"));
        assert!(!filter.is_blocked("hello, world"));
    }

    #[test]
    fn entries_are_normalized() {
        let filter = ContentFilter::new(["  Darn ", "", "   "]);
        assert_eq!(filter.len(), 1);
        assert!(filter.is_blocked("oh darn"));
    }

    #[test]
    fn empty_filter_blocks_nothing() {
        let filter = ContentFilter::default();
        assert!(filter.is_empty());
        assert!(!filter.is_blocked("anything at all"));
    }
}
