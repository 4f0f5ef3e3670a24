//! Error types for rustwasm

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for rustwasm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning a source unit into a WASM module
#[derive(Error, Debug)]
pub enum Error {
    /// The input is neither a Rust source file nor a Cargo manifest
    #[error("unsupported input '{path}': {reason}")]
    UnsupportedInput {
        /// Path that was rejected
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// An external tool exited non-zero or could not be started
    #[error("{}", tool_failure(tool, *status, stderr))]
    ToolInvocation {
        /// Executable name
        tool: String,
        /// Exit status, `None` if the process never started or died by signal
        status: Option<i32>,
        /// Everything the tool wrote to stderr
        stderr: String,
    },

    /// An external tool ran longer than the configured limit
    #[error("process {tool} timed out after {}s", after.as_secs_f64())]
    ToolTimeout {
        /// Executable name
        tool: String,
        /// The limit that was exceeded
        after: Duration,
    },

    /// The pipeline was cancelled while a tool was running
    #[error("process {tool} was cancelled")]
    Cancelled {
        /// Executable name
        tool: String,
    },

    /// The build output directory holds no matching binary
    #[error("no .{extension} artifacts found at build path {}", dir.display())]
    ArtifactNotFound {
        /// Directory that was scanned
        dir: PathBuf,
        /// Extension that was searched for
        extension: String,
    },

    /// The build output directory holds more than one matching binary
    #[error(
        "found {} .{extension} artifacts at build path {}, expected exactly one: {}",
        matches.len(),
        dir.display(),
        join_paths(matches)
    )]
    ArtifactAmbiguity {
        /// Directory that was scanned
        dir: PathBuf,
        /// Extension that was searched for
        extension: String,
        /// Every matching file
        matches: Vec<PathBuf>,
    },

    /// Filesystem operation on a known path failed
    #[error("filesystem error at {}: {source}", path.display())]
    Fs {
        /// Path being read or written
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Glue template rendering error
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error produced by a build that several callers were waiting on
    #[error(transparent)]
    Shared(Arc<Error>),
}

impl Error {
    /// Wrap an IO error with the path it concerns
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Fs {
            path: path.into(),
            source,
        }
    }

    /// The underlying error, looking through [`Error::Shared`]
    pub fn root(&self) -> &Error {
        match self {
            Error::Shared(inner) => inner.root(),
            other => other,
        }
    }
}

fn tool_failure(tool: &str, status: Option<i32>, stderr: &str) -> String {
    match status {
        Some(code) => format!("process {tool} ended with non-zero code {code}:\n{stderr}"),
        None => format!("process {tool} did not exit normally:\n{stderr}"),
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
