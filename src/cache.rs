//! On-disk cache layout
//!
//! Everything the tool keeps between runs lives below one root directory,
//! which is passed around explicitly so tests can point it at a temp dir.
//!
//! ```text
//! <root>/
//! ├── git/<repo>/                          bare commit mirrors
//! ├── mirrorcache/<stage>/index.html       index page snapshot
//! ├── mirrorcache/<stage>/*.iso            downloaded images (newest 3 kept)
//! ├── mirrorcache/<stage>/mnt/             transient mount point
//! ├── obsproject/<stage>/osc_commands/     cached command output
//! ├── obsproject/<stage>/osc_requests/
//! ├── giteaproject/<stage>/<package>/      sparse package checkouts
//! └── giteaproject/<stage>/tea_commands/
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

/// Directory name used in log lines instead of the full cache root
pub const CACHE_DIR_PLACEHOLDER: &str = "$CACHE_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Working directory of one stage, e.g. `<root>/obsproject/<stage>`
    pub fn stage_dir(&self, kind: &str, stage: &str) -> PathBuf {
        self.root.join(kind).join(sanitize(stage))
    }

    pub fn git_mirror(&self, repo_name: &str) -> PathBuf {
        self.root.join("git").join(sanitize(repo_name))
    }

    /// Shortens `path` for logging by replacing the cache root
    pub fn display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rest) if rest.as_os_str().is_empty() => CACHE_DIR_PLACEHOLDER.to_string(),
            Ok(rest) => format!("{}/{}", CACHE_DIR_PLACEHOLDER, rest.display()),
            Err(_) => path.display().to_string(),
        }
    }
}

/// Replaces every character outside `[A-Za-z0-9_.-]` with `_`
pub fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Returns true if `path` exists and was modified less than `max_age` ago
pub fn is_fresh(path: &Path, max_age: Duration) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|meta| meta.modified()) else {
        return false;
    };

    SystemTime::now()
        .duration_since(modified)
        .map(|age| age < max_age)
        // Modification time in the future counts as fresh
        .unwrap_or(true)
}

/// Reads `path` if it is fresh, logging and ignoring unreadable files
pub fn read_fresh(path: &Path, max_age: Duration) -> Option<String> {
    if !is_fresh(path, max_age) {
        return None;
    }

    fs::read_to_string(path)
        .inspect_err(|e| warn!("Failed to read cache file {:?}: {}", path, e))
        .ok()
}

/// Writes `content` to `path`, creating parent directories
pub fn store(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

/// Deletes all but the `keep` most recently modified files with extension
/// `extension` in `dir`
///
/// Returns the removed paths.
pub fn prune_oldest(dir: &Path, extension: &str, keep: usize) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<(SystemTime, PathBuf)> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == extension))
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .collect();

    // Newest first; ties broken by name so pruning is deterministic
    files.sort_by(|(a_time, a_path), (b_time, b_path)| {
        b_time.cmp(a_time).then_with(|| b_path.cmp(a_path))
    });

    let mut removed = Vec::new();
    for (_, path) in files.into_iter().skip(keep) {
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Pruned old image {:?}", path);
                removed.push(path);
            }
            Err(e) => warn!("Failed to prune {:?}: {}", path, e),
        }
    }
    debug!("Kept {} newest .{} files in {:?}", keep, extension, dir);

    Ok(removed)
}
