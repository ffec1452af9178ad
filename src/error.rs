use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the mutation pipeline.
///
/// Per-mutation failures (workspace, runner) are normally folded into a
/// `TestStatus::Error` entry instead of surfacing here; this type covers the
/// failures that abort an operation or need the caller's decision.
#[derive(Debug, Error)]
pub enum Error {
    /// A path argument or file handed to the pipeline is unusable.
    #[error("invalid input {path}: {message}")]
    Input { path: PathBuf, message: String },

    /// An exclude pattern did not compile.
    #[error("invalid exclude pattern: {0}")]
    Exclude(#[from] regex::Error),

    /// A source file could not be parsed. The file is skipped, not fatal.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Setting up or writing into a mutation workspace failed.
    #[error("workspace error for {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The spill or index on disk could not be written or read back.
    #[error("persistence error at {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    /// The cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn input(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Input {
            path: path.into(),
            message: message.into(),
        }
    }
}
