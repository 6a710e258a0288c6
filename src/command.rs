//! External command execution
//!
//! Every tool the checker drives (`git`, `osc`, `tea`, `curl`, `fuseiso`)
//! goes through [`CommandRunner`], so whole pipelines can run against a
//! scripted fake instead of real processes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::{self, CacheLayout, sanitize};
use crate::error::CommandError;

/// Longest cache file stem before it is shortened with a digest
const MAX_CACHE_STEM: usize = 180;

/// Trait for running an external command and capturing its standard output
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `argv[0]` with the remaining arguments
    ///
    /// # Returns
    /// * `Ok(stdout)` - The command exited successfully
    /// * `Err(CommandError)` - The command could not be started or exited non-zero
    async fn run(&self, argv: &[&str]) -> Result<String, CommandError>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    layout: Option<CacheLayout>,
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shortens paths below the cache root in debug logs
    pub fn with_cache_layout(layout: CacheLayout) -> Self {
        Self {
            layout: Some(layout),
        }
    }

    fn describe(&self, argv: &[&str]) -> String {
        argv.iter()
            .map(|arg| match &self.layout {
                Some(layout) => layout.display(Path::new(arg)),
                None => arg.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait::async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, argv: &[&str]) -> Result<String, CommandError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(CommandError::Spawn {
                program: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        debug!("Running {}", self.describe(argv));

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(CommandError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Reuses the text output of recent successful commands
///
/// Output is stored as one file per command line below `dir`. Failed
/// commands are never cached. With `force_refresh` the cache is not read
/// but still refreshed.
pub struct CachedCommandRunner<'a> {
    inner: &'a dyn CommandRunner,
    dir: PathBuf,
    max_age: Duration,
    force_refresh: bool,
}

impl<'a> CachedCommandRunner<'a> {
    pub fn new(inner: &'a dyn CommandRunner, dir: PathBuf, max_age: Duration) -> Self {
        Self {
            inner,
            dir,
            max_age,
            force_refresh: false,
        }
    }

    pub fn force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub fn cache_file(&self, argv: &[&str]) -> PathBuf {
        self.dir.join(cache_file_name(argv))
    }

    pub async fn run(&self, argv: &[&str]) -> Result<String, CommandError> {
        let path = self.cache_file(argv);

        if !self.force_refresh
            && let Some(output) = cache::read_fresh(&path, self.max_age)
        {
            debug!("Cache hit for command: {}", argv.join(" "));
            return Ok(output);
        }

        let output = self.inner.run(argv).await?;

        if let Err(e) = cache::store(&path, &output) {
            warn!("Failed to write cache file {:?}: {}", path, e);
        }

        Ok(output)
    }
}

/// Readable, filesystem-safe file name derived from the command line
pub fn cache_file_name(argv: &[&str]) -> String {
    let stem = argv
        .iter()
        .map(|arg| sanitize(arg))
        .collect::<Vec<_>>()
        .join("_");

    if stem.len() <= MAX_CACHE_STEM {
        return format!("{stem}.txt");
    }

    format!("{}_{}.txt", &stem[..MAX_CACHE_STEM], argv_digest(argv))
}

/// First 8 bytes of the SHA-256 of the NUL-joined arguments, hex encoded
fn argv_digest(argv: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, arg) in argv.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(arg.as_bytes());
    }
    hex::encode(&hasher.finalize()[..8])
}
