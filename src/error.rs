use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid stage #{index} ({kind}): {source}")]
    InvalidStage {
        index: usize,
        kind: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Stage #{index} has no 'type' field")]
    MissingStageType { index: usize },
}

#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("Required command(s) not found in PATH: {}", .0.join(", "))]
    MissingTools(Vec<String>),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Metadata file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("Failed to read metadata: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of a single stage; logged by the runner, never fatal
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stage url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No images matching {patterns:?} at {url}")]
    NoImages { url: String, patterns: Vec<String> },

    #[error("No packages listed in project {0}")]
    EmptyProject(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tools_lists_every_tool() {
        let err = PreconditionError::MissingTools(vec!["curl".to_string(), "fuseiso".to_string()]);
        assert_eq!(
            err.to_string(),
            "Required command(s) not found in PATH: curl, fuseiso"
        );
    }

    #[test]
    fn command_failure_includes_program_and_stderr() {
        let err = CommandError::Failed {
            program: "osc".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "project not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("osc"));
        assert!(msg.contains("project not found"));
    }
}
