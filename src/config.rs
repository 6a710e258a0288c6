use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::ConfigError;
use crate::package::matcher::SourceMapping;

// =============================================================================
// Time-related constants
// =============================================================================

/// Bounded wait for fetching a mirror index page (15 seconds)
pub const INDEX_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Age under which cached index snapshots and command outputs are reused (1 hour)
pub const CACHE_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Window used by `--recent` for change requests (14 days)
pub const RECENT_WINDOW_DAYS: i64 = 14;

/// Number of downloaded images retained per stage
pub const RETAINED_IMAGES: usize = 3;

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

const DEFAULT_TITLE: &str = "Release Status";

const APP_DIR_NAME: &str = "release-checker";

/// Image mirror stage (`type: mirrorcache`)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ImageMirrorStage {
    pub name: String,
    pub url: String,
    /// Glob patterns selecting image file names on the index page
    #[serde(default)]
    pub files: Vec<String>,
}

/// Build service project stage (`type: obsproject`)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BuildServiceStage {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub submit_requests: bool,
}

/// Source mirror stage (`type: giteaproject`)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SourceMirrorStage {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub submit_requests: bool,
}

/// Git repository used to resolve commit hashes (`type: git`)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GitSourceStage {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageConfig {
    ImageMirror(ImageMirrorStage),
    BuildService(BuildServiceStage),
    SourceMirror(SourceMirrorStage),
    GitSource(GitSourceStage),
}

impl StageConfig {
    pub fn name(&self) -> &str {
        match self {
            StageConfig::ImageMirror(s) => &s.name,
            StageConfig::BuildService(s) => &s.name,
            StageConfig::SourceMirror(s) => &s.name,
            StageConfig::GitSource(s) => &s.name,
        }
    }

    /// The `type` value this stage is configured with
    pub fn kind(&self) -> &'static str {
        match self {
            StageConfig::ImageMirror(_) => "mirrorcache",
            StageConfig::BuildService(_) => "obsproject",
            StageConfig::SourceMirror(_) => "giteaproject",
            StageConfig::GitSource(_) => "git",
        }
    }

    /// External commands this stage cannot run without
    pub fn required_tools(&self) -> &'static [&'static str] {
        match self {
            StageConfig::ImageMirror(_) => &["curl", "fuseiso", "fusermount"],
            StageConfig::BuildService(_) => &["osc"],
            StageConfig::SourceMirror(s) if s.submit_requests => &["git", "tea"],
            StageConfig::SourceMirror(_) => &["git"],
            StageConfig::GitSource(_) => &["git"],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub title: String,
    pub stages: Vec<StageConfig>,
    /// Source identity -> binary package name patterns
    pub rpms: SourceMapping,
    /// Source identity -> descriptor basenames, when they differ from the identity
    pub specs: IndexMap<String, Vec<String>>,
}

impl AppConfig {
    /// Descriptor basenames for `identity`, defaulting to the identity itself
    pub fn spec_basenames(&self, identity: &str) -> Vec<String> {
        self.specs
            .get(identity)
            .cloned()
            .unwrap_or_else(|| vec![identity.to_string()])
    }

    /// Repository URLs of all `git` stages, keyed by stage name
    pub fn git_repositories(&self) -> IndexMap<String, String> {
        self.stages
            .iter()
            .filter_map(|stage| match stage {
                StageConfig::GitSource(git) => Some((git.name.clone(), git.url.clone())),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    stages: Vec<serde_yaml::Value>,
    #[serde(default)]
    rpms: SourceMapping,
    #[serde(default)]
    specs: IndexMap<String, Vec<String>>,
}

/// Reads and validates the configuration file
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content, path)
}

/// Parses configuration text; `origin` is only used in error messages
pub fn parse_config(content: &str, origin: &Path) -> Result<AppConfig, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;

    let mut stages = Vec::with_capacity(raw.stages.len());
    for (index, value) in raw.stages.into_iter().enumerate() {
        if let Some(stage) = parse_stage(index, value)? {
            stages.push(stage);
        }
    }

    Ok(AppConfig {
        title: raw.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        stages,
        rpms: raw.rpms,
        specs: raw.specs,
    })
}

fn parse_stage(index: usize, value: serde_yaml::Value) -> Result<Option<StageConfig>, ConfigError> {
    let kind = value
        .get("type")
        .and_then(serde_yaml::Value::as_str)
        .ok_or(ConfigError::MissingStageType { index })?
        .to_string();

    let stage = match kind.as_str() {
        "mirrorcache" => StageConfig::ImageMirror(decode_stage(index, &kind, value)?),
        "obsproject" => StageConfig::BuildService(decode_stage(index, &kind, value)?),
        "giteaproject" => StageConfig::SourceMirror(decode_stage(index, &kind, value)?),
        "git" => StageConfig::GitSource(decode_stage(index, &kind, value)?),
        _ => {
            let name = value
                .get("name")
                .and_then(serde_yaml::Value::as_str)
                .unwrap_or("<unnamed>");
            warn!("Skipping stage '{}' with unknown type '{}'", name, kind);
            return Ok(None);
        }
    };

    Ok(Some(stage))
}

fn decode_stage<T: DeserializeOwned>(
    index: usize,
    kind: &str,
    value: serde_yaml::Value,
) -> Result<T, ConfigError> {
    serde_yaml::from_value(value).map_err(|source| ConfigError::InvalidStage {
        index,
        kind: kind.to_string(),
        source,
    })
}

/// Returns the cache root for this tool.
/// Uses $XDG_CACHE_HOME/release-checker if XDG_CACHE_HOME is set,
/// otherwise falls back to ~/.cache/release-checker,
/// or ./release-checker if neither is available.
pub fn cache_dir() -> PathBuf {
    cache_dir_with_env(std::env::var("XDG_CACHE_HOME").ok(), dirs::home_dir())
}

fn cache_dir_with_env(xdg_cache_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let cache_dir = xdg_cache_home
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".cache")))
        .unwrap_or_else(|| PathBuf::from("."));

    cache_dir.join(APP_DIR_NAME)
}
