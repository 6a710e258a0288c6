//! Source identity matching
//!
//! Maps binary package names back to the source package they were built
//! from, using shell-glob patterns (`*`, `?`, `[...]`). Matching is
//! case-sensitive and anchored to the whole name.

use glob::{MatchOptions, Pattern};
use indexmap::IndexMap;
use serde::Deserialize;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Returns true if `name` matches the glob `pattern` as a whole
///
/// Runs of `*` behave like a single `*`. A pattern that does not compile
/// as a glob is compared literally.
pub fn matches(name: &str, pattern: &str) -> bool {
    match Pattern::new(&collapse_stars(pattern)) {
        Ok(compiled) => compiled.matches_with(name, MATCH_OPTIONS),
        Err(_) => name == pattern,
    }
}

fn collapse_stars(pattern: &str) -> String {
    let mut collapsed = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if c == '*' && collapsed.ends_with('*') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed
}

/// Canonical source identity -> binary name patterns, in configuration order
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct SourceMapping(IndexMap<String, Vec<String>>);

impl SourceMapping {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn patterns(&self, identity: &str) -> &[String] {
        self.0.get(identity).map(Vec::as_slice).unwrap_or_default()
    }

    /// Names matching at least one pattern of `identity`, each reported once
    /// and in input order
    pub fn matching<'a, I>(&self, identity: &str, names: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let patterns = self.patterns(identity);
        names
            .into_iter()
            .filter(|name| patterns.iter().any(|pattern| matches(name, pattern)))
            .collect()
    }

    /// Every identity whose patterns match `name`
    ///
    /// Overlapping patterns attribute a name to several identities; this is
    /// kept as is.
    pub fn identities_for(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, patterns)| patterns.iter().any(|pattern| matches(name, pattern)))
            .map(|(identity, _)| identity.as_str())
            .collect()
    }
}

impl FromIterator<(String, Vec<String>)> for SourceMapping {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
