//! Keyword filters applied to ranked search results.
//!
//! A [`FilterSet`] is a conjunction: every pattern must match somewhere in a
//! chunk's source id or text. Adding a second term (say a model number on
//! top of a manufacturer) narrows the set instead of replacing the first
//! condition.

use regex::{Regex, RegexBuilder};

use crate::{chunking::Chunk, error::Result};

/// Case-insensitive AND-combined keyword filters.
///
/// # Examples
///
/// ```
/// use attrieve::{chunking::Chunk, filter::FilterSet};
///
/// let chunk = Chunk::new("fujitec-exdn.pdf", None, 0, "Rated Load 1000 kg".into());
///
/// let mut filters = FilterSet::new();
/// filters.and_term("fujitec").unwrap();
/// assert!(filters.matches(&chunk));
///
/// filters.and_term("EXDN").unwrap();
/// assert!(filters.matches(&chunk));
///
/// filters.and_term("hitachi").unwrap();
/// assert!(!filters.matches(&chunk));
/// ```
#[derive(Debug, Default, Clone)]
pub struct FilterSet {
    patterns: Vec<Regex>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// AND a literal keyword: the term is matched case-insensitively as a
    /// substring, with regex metacharacters escaped.
    pub fn and_term(&mut self, term: &str) -> Result<()> {
        self.and_pattern(&regex::escape(term))
    }

    /// AND a raw regex pattern (case-insensitive).
    pub fn and_pattern(&mut self, pattern: &str) -> Result<()> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        self.patterns.push(regex);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether every pattern matches the chunk's source id or text.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.patterns
            .iter()
            .all(|p| p.is_match(&chunk.source_id) || p.is_match(&chunk.text))
    }
}
