//! Commit hash recovery from version strings
//!
//! Snapshot builds append the abbreviated commit they were built from, e.g.
//! `19.pre+1452.65cb39696`. Only a trailing run of at least seven hex digits
//! counts, so plain numeric components like `1.2.3` are left alone.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::package::Package;
use crate::package::matcher::SourceMapping;

static TRAILING_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9a-fA-F]{7,})$").expect("valid hash pattern"));

/// Source identity -> hashes found in its packages, ordered for stable output
pub type HashesBySource = BTreeMap<String, BTreeSet<String>>;

/// Returns the trailing commit hash of `version`, if any
pub fn extract_hash(version: &str) -> Option<&str> {
    TRAILING_HASH_RE
        .captures(version)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Collects hashes per source identity from every package matching that
/// identity's patterns
///
/// Identities without any hash contribute no key.
pub fn extract_hashes(packages: &[Package], mapping: &SourceMapping) -> HashesBySource {
    let mut hashes = HashesBySource::new();

    for identity in mapping.identities() {
        let names = packages.iter().map(|p| p.name.as_str());
        let matched: BTreeSet<&str> = mapping.matching(identity, names).into_iter().collect();

        let found: BTreeSet<String> = packages
            .iter()
            .filter(|p| matched.contains(p.name.as_str()))
            .filter_map(|p| extract_hash(&p.version))
            .map(str::to_string)
            .collect();

        if !found.is_empty() {
            hashes.entry(identity.to_string()).or_default().extend(found);
        }
    }

    hashes
}

/// Folds `other` into `into` so every hash is resolved once per run
pub fn merge_hashes(into: &mut HashesBySource, other: HashesBySource) {
    for (identity, hashes) in other {
        into.entry(identity).or_default().extend(hashes);
    }
}
