use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::command::CommandRunner;
use crate::error::CommandError;

/// Whether the local copy of a repository exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Absent,
    Present,
}

/// Local bare copy of a remote repository, used to look up commits
///
/// Created by a full clone on first use and fetched on every later run.
/// Never deleted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryMirror {
    name: String,
    url: String,
    path: PathBuf,
}

impl RepositoryMirror {
    pub fn new(name: &str, url: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> MirrorState {
        if self.path.exists() {
            MirrorState::Present
        } else {
            MirrorState::Absent
        }
    }

    /// Clones the mirror when absent, fetches it when present
    ///
    /// A failed fetch is tolerated and the stale mirror used; a failed clone
    /// leaves the mirror absent. Returns the resulting state.
    pub async fn sync(&self, runner: &dyn CommandRunner) -> MirrorState {
        let path: &str = &self.path.to_string_lossy();

        match self.state() {
            MirrorState::Absent => {
                info!("Cloning {} into {}", self.url, path);
                if let Some(parent) = self.path.parent()
                    && let Err(e) = fs::create_dir_all(parent)
                {
                    warn!("Failed to create {:?}: {}", parent, e);
                    return MirrorState::Absent;
                }

                if let Err(e) = runner.run(&["git", "clone", "--mirror", &self.url, path]).await {
                    warn!("Failed to clone {}: {}", self.url, e);
                }
            }
            MirrorState::Present => {
                debug!("Fetching updates for {}", self.name);
                if let Err(e) = runner.run(&["git", "-C", path, "fetch", "--all", "--tags"]).await {
                    warn!("Failed to update {}, using cached data: {}", self.name, e);
                }
            }
        }

        self.state()
    }

    /// Committer date of `hash`, or `None` if the commit is not in the mirror
    pub async fn commit_timestamp(&self, runner: &dyn CommandRunner, hash: &str) -> Option<String> {
        self.query(runner, &["show", "-s", "--format=%ci", hash]).await
    }

    /// Nearest tag description of `hash`, or `None` without a reachable tag
    pub async fn describe(&self, runner: &dyn CommandRunner, hash: &str) -> Option<String> {
        self.query(runner, &["describe", "--tags", hash]).await
    }

    async fn query(&self, runner: &dyn CommandRunner, args: &[&str]) -> Option<String> {
        let path: &str = &self.path.to_string_lossy();
        let mut argv = vec!["git", "-C", path];
        argv.extend_from_slice(args);

        match runner.run(&argv).await {
            Ok(output) => non_empty(&output),
            Err(CommandError::Failed { stderr, .. }) => {
                debug!("git {} failed in {}: {}", args.join(" "), self.name, stderr);
                None
            }
            Err(e) => {
                warn!("git {} failed in {}: {}", args.join(" "), self.name, e);
                None
            }
        }
    }
}

fn non_empty(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
