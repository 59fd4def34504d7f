//! Source control trait and configuration.
//!
//! Adapters wrap a VCS command-line client (Git, Subversion). Every operation
//! is a blocking external process from the caller's point of view, so the
//! trait is async and callers await each call before moving on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Result, Revision};

/// Kind of version control system backing a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    Git,
    Subversion,
}

impl std::fmt::Display for VcsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VcsKind::Git => write!(f, "git"),
            VcsKind::Subversion => write!(f, "subversion"),
        }
    }
}

impl std::str::FromStr for VcsKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "git" => Ok(VcsKind::Git),
            "subversion" | "svn" => Ok(VcsKind::Subversion),
            _ => Err(format!("Unknown source control kind: {}", s)),
        }
    }
}

/// Persisted choice of source control for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceControlConfig {
    Git {
        /// Remote repository URL.
        repository: String,
        /// Branch to track. `None` follows the remote's default branch.
        branch: Option<String>,
        /// Update submodules along with the main working copy.
        submodules: bool,
    },
    Subversion {
        /// Repository URL (including the path to trunk/branch).
        repository: String,
    },
}

impl SourceControlConfig {
    pub fn git(repository: impl Into<String>) -> Self {
        SourceControlConfig::Git {
            repository: repository.into(),
            branch: None,
            submodules: false,
        }
    }

    pub fn subversion(repository: impl Into<String>) -> Self {
        SourceControlConfig::Subversion {
            repository: repository.into(),
        }
    }

    pub fn kind(&self) -> VcsKind {
        match self {
            SourceControlConfig::Git { .. } => VcsKind::Git,
            SourceControlConfig::Subversion { .. } => VcsKind::Subversion,
        }
    }

    pub fn repository(&self) -> &str {
        match self {
            SourceControlConfig::Git { repository, .. }
            | SourceControlConfig::Subversion { repository } => repository,
        }
    }
}

/// Uniform interface over a version control client.
///
/// Operations that touch an existing working copy take its path; scratch
/// files go into the working copy's parent (the project directory).
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Which VCS this adapter drives.
    fn kind(&self) -> VcsKind;

    /// Materialise a fresh working copy at `destination`.
    ///
    /// Fails with [`Error::Checkout`](crate::Error::Checkout); the destination
    /// must be treated as unusable afterwards.
    async fn checkout(&self, destination: &Path) -> Result<()>;

    /// Newest revision known to the repository, without touching the working
    /// copy. `message` holds the changelog since `since` (or this revision's
    /// own message when `since` is `None`).
    async fn latest_revision(&self, work_dir: &Path, since: Option<&Revision>) -> Result<Revision>;

    /// Returns `true` when the remote has nothing new. Otherwise resets the
    /// working copy to the new revision, pushes that revision onto `reasons`
    /// and returns `false`.
    async fn up_to_date(
        &self,
        work_dir: &Path,
        since: Option<&Revision>,
        reasons: &mut Vec<Revision>,
    ) -> Result<bool>;

    /// Fetch remote state and hard-reset the working copy to the tracked tip.
    async fn update(&self, work_dir: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vcs_kind_round_trip() {
        assert_eq!("git".parse::<VcsKind>().unwrap(), VcsKind::Git);
        assert_eq!("svn".parse::<VcsKind>().unwrap(), VcsKind::Subversion);
        assert_eq!(VcsKind::Subversion.to_string(), "subversion");
        assert!("hg".parse::<VcsKind>().is_err());
    }

    #[test]
    fn test_config_accessors() {
        let config = SourceControlConfig::git("https://example.com/repo.git");
        assert_eq!(config.kind(), VcsKind::Git);
        assert_eq!(config.repository(), "https://example.com/repo.git");
    }
}
