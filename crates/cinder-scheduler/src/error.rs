//! Project and registry errors.

use std::path::PathBuf;

use cinder_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    /// A project with this name is already registered (or its directory
    /// already exists under the builds root).
    #[error("project '{0}' is already registered")]
    DuplicateProject(String),

    #[error("project not found: {0}")]
    NotFound(String),

    #[error("invalid project name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// The directory has neither `project.kdl` nor a recognisable working copy.
    #[error("not a project directory: {0}")]
    NotAProject(PathBuf),

    /// The project's directory is not `<builds-root>/<name>`.
    #[error("project directory {path} is not inside builds root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error(transparent)]
    Core(#[from] cinder_core::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("corrupt build record in {path}: {source}")]
    History {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProjectError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProjectError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProjectError>;
