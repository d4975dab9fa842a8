#[cfg(feature = "live")]
use std::sync::mpsc::RecvError;

use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration.\n{0}")]
    Config(#[from] ConfigError),

    #[error("Invalid task graph.\n{0}")]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[cfg(feature = "live")]
    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read config file {0}.\n{1}")]
    Read(Utf8PathBuf, std::io::Error),

    #[error("Couldn't parse config file {0}.\n{1}")]
    Parse(Utf8PathBuf, toml::de::Error),

    #[error("Unsupported autoprefix query '{0}', expected 'last N versions' or 'none'")]
    Query(String),

    #[error("Unknown lint rule '{0}'")]
    UnknownRule(String),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task '{0}' is declared twice")]
    Duplicate(String),

    #[error("Task '{task}' depends on unknown task '{prerequisite}'")]
    UnknownPrerequisite { task: String, prerequisite: String },

    #[error("Cycle detected in task graph at '{0}'")]
    Cycle(String),

    #[error("Task '{0}' not found")]
    UnknownTask(String),
}

/// Errors that can occur inside a single task action.
#[derive(Debug, Error)]
pub enum TaskError {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A Sass compilation error occurred.
    #[error("Sass compilation error: {0}")]
    Sass(#[from] Box<grass::Error>),

    #[error("Entry stylesheet {0} does not exist")]
    MissingEntry(Utf8PathBuf),

    #[error("Stylesheet {0} does not exist, it is produced by the compile task")]
    MissingArtifact(Utf8PathBuf),

    /// The lint gate found at least one error-level violation.
    #[error("Lint failed with {errors} error(s) and {warnings} warning(s)")]
    Lint { errors: usize, warnings: usize },

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Couldn't serialize sourcemap.\n{0}")]
    SourceMap(#[from] serde_json::Error),

    #[error("Task panicked: {0}")]
    Panic(String),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Task '{0}':\n{1}")]
    Task(String, TaskError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Recv(#[from] RecvError),

    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),
}
