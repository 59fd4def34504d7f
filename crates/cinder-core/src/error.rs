//! Error types for Cinder.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A VCS client exited non-zero. `diagnostic` is the most specific
    /// single line the client wrote to stderr.
    #[error("{command} failed: {diagnostic}")]
    VcsCommand { command: String, diagnostic: String },

    /// A working copy could not be materialised. The destination is unusable.
    #[error("checkout into {path} failed: {message}")]
    Checkout { path: PathBuf, message: String },

    /// A required command-line tool is not on `PATH`.
    #[error("{0} is required but was not found in PATH")]
    ToolNotFound(String),

    /// The build command itself could not be started.
    #[error("could not run build command: {0}")]
    BuildRunner(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from source control (and should abort only
    /// the current poll cycle).
    pub fn is_source_control(&self) -> bool {
        matches!(
            self,
            Error::VcsCommand { .. } | Error::Checkout { .. } | Error::ToolNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
