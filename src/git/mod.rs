//! Commit resolution through local repository mirrors
//!
//! # Modules
//!
//! - [`mirror`]: Bare mirror lifecycle and per-commit queries
//! - [`resolver`]: Maps source identities to repositories and resolves hashes

pub mod mirror;
pub mod resolver;

pub use mirror::{MirrorState, RepositoryMirror};
pub use resolver::CommitResolver;

/// What is known about one commit
///
/// Missing fields mean the commit or a tag was not found, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommit {
    pub hash: String,
    pub timestamp: Option<String>,
    pub description: Option<String>,
}

impl ResolvedCommit {
    pub fn unresolved(hash: &str) -> Self {
        Self {
            hash: hash.to_string(),
            timestamp: None,
            description: None,
        }
    }
}

/// A resolved commit attributed to the source identity it was found in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub source: String,
    /// Repository the hash was resolved against, if any is configured
    pub repository_url: Option<String>,
    pub commit: ResolvedCommit,
}

impl CommitRecord {
    pub fn link(&self) -> Option<String> {
        self.repository_url
            .as_deref()
            .map(|url| commit_url(url, &self.commit.hash))
    }
}

/// Web link to `hash` in the repository at `repository_url`
pub fn commit_url(repository_url: &str, hash: &str) -> String {
    format!("{}/commit/{}", repository_url.trim_end_matches('/'), hash)
}
