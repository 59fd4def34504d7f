//! Source control adapters for the Cinder build server.
//!
//! Provides [`SourceControl`] implementations that shell out to:
//! - `git`
//! - `svn`

pub mod command;
pub mod detect;
pub mod git;
pub mod subversion;

use cinder_core::{Error, Result, SourceControl, SourceControlConfig};
use std::path::Path;

pub use detect::detect;
pub use git::GitAdapter;
pub use subversion::SubversionAdapter;

/// Build the adapter described by a project's persisted configuration.
pub fn adapter_for(config: &SourceControlConfig) -> Box<dyn SourceControl> {
    match config {
        SourceControlConfig::Git {
            repository,
            branch,
            submodules,
        } => {
            let mut adapter = GitAdapter::new(repository.clone()).with_submodules(*submodules);
            if let Some(branch) = branch {
                adapter = adapter.with_branch(branch.clone());
            }
            Box::new(adapter)
        }
        SourceControlConfig::Subversion { repository } => {
            Box::new(SubversionAdapter::new(repository.clone()))
        }
    }
}

// VCS stderr is collected next to the working copy, in the project dir.
fn scratch_dir(work_dir: &Path) -> Result<&Path> {
    work_dir.parent().ok_or_else(|| {
        Error::InvalidInput(format!(
            "working copy {} has no parent directory",
            work_dir.display()
        ))
    })
}
