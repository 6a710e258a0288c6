use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::cache::CacheLayout;
use crate::command::CommandRunner;
use crate::git::mirror::{MirrorState, RepositoryMirror};
use crate::git::{CommitRecord, ResolvedCommit};
use crate::package::hash::HashesBySource;

/// Resolves commit hashes against the configured repositories
///
/// Each repository mirror is synced at most once per resolver, and each
/// (repository, hash) pair is looked up at most once.
pub struct CommitResolver<'a> {
    runner: &'a dyn CommandRunner,
    layout: &'a CacheLayout,
    /// Repository name -> remote URL
    repositories: IndexMap<String, String>,
    synced: HashMap<String, MirrorState>,
    resolved: HashMap<(String, String), ResolvedCommit>,
}

impl<'a> CommitResolver<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        layout: &'a CacheLayout,
        repositories: IndexMap<String, String>,
    ) -> Self {
        Self {
            runner,
            layout,
            repositories,
            synced: HashMap::new(),
            resolved: HashMap::new(),
        }
    }

    /// Repository name and URL responsible for `identity`
    ///
    /// An exact name match wins. Otherwise the longest repository name
    /// contained in the identity is used (`rubygem-agama-yast` falls back
    /// to `agama`); ties go to the first configured one.
    pub fn repository_for(&self, identity: &str) -> Option<(&str, &str)> {
        if let Some((name, url)) = self.repositories.get_key_value(identity) {
            return Some((name.as_str(), url.as_str()));
        }

        self.repositories
            .iter()
            .filter(|(name, _)| !name.is_empty() && identity.contains(name.as_str()))
            .rev()
            .max_by_key(|(name, _)| name.len())
            .map(|(name, url)| (name.as_str(), url.as_str()))
    }

    /// Resolves every hash, one record per (identity, hash)
    ///
    /// Identities without a repository yield unresolved records.
    pub async fn resolve(&mut self, hashes: &HashesBySource) -> Vec<CommitRecord> {
        let mut records = Vec::new();

        for (identity, identity_hashes) in hashes {
            let Some((name, url)) = self
                .repository_for(identity)
                .map(|(name, url)| (name.to_string(), url.to_string()))
            else {
                warn!(
                    "No git configuration for {}; cannot resolve {} hash(es)",
                    identity,
                    identity_hashes.len()
                );
                records.extend(identity_hashes.iter().map(|hash| CommitRecord {
                    source: identity.clone(),
                    repository_url: None,
                    commit: ResolvedCommit::unresolved(hash),
                }));
                continue;
            };

            if name != *identity {
                debug!("Attributing {} to repository {}", identity, name);
            }

            let mirror = RepositoryMirror::new(&name, &url, self.layout.git_mirror(&name));
            let state = self.sync(&mirror).await;

            for hash in identity_hashes {
                let commit = self.resolve_one(&mirror, state, hash).await;
                records.push(CommitRecord {
                    source: identity.clone(),
                    repository_url: Some(url.clone()),
                    commit,
                });
            }
        }

        records
    }

    async fn sync(&mut self, mirror: &RepositoryMirror) -> MirrorState {
        if let Some(state) = self.synced.get(mirror.name()) {
            return *state;
        }

        let state = mirror.sync(self.runner).await;
        if state == MirrorState::Absent {
            warn!("Repository {} unavailable; its commits stay unresolved", mirror.name());
        }
        self.synced.insert(mirror.name().to_string(), state);
        state
    }

    async fn resolve_one(
        &mut self,
        mirror: &RepositoryMirror,
        state: MirrorState,
        hash: &str,
    ) -> ResolvedCommit {
        let key = (mirror.name().to_string(), hash.to_string());
        if let Some(commit) = self.resolved.get(&key) {
            return commit.clone();
        }

        let commit = match state {
            MirrorState::Present => ResolvedCommit {
                hash: hash.to_string(),
                timestamp: mirror.commit_timestamp(self.runner, hash).await,
                description: mirror.describe(self.runner, hash).await,
            },
            MirrorState::Absent => ResolvedCommit::unresolved(hash),
        };
        info!(
            "Resolved {} in {}: {}",
            hash,
            mirror.name(),
            commit.description.as_deref().unwrap_or("no tag")
        );

        self.resolved.insert(key, commit.clone());
        commit
    }
}
