//! Bootstrap detection of the VCS behind an existing working copy.
//!
//! Only used to adopt a project directory that has a working copy but no
//! `project.kdl`; the result is persisted and never re-derived.

use cinder_core::{Result, SourceControlConfig};
use std::path::Path;
use tracing::info;

use crate::command;
use crate::scratch_dir;

/// Inspect `work_dir` and describe the source control it was checked out
/// from. Returns `None` when it is not a recognised working copy.
pub async fn detect(work_dir: &Path) -> Result<Option<SourceControlConfig>> {
    let scratch = scratch_dir(work_dir)?;

    if work_dir.join(".git").exists() {
        let url = command::run("git", &["remote", "get-url", "origin"], work_dir, scratch).await?;
        let branch = command::run(
            "git",
            &["rev-parse", "--abbrev-ref", "HEAD"],
            work_dir,
            scratch,
        )
        .await?;
        let branch = branch.trim();
        let config = SourceControlConfig::Git {
            repository: url.trim().to_string(),
            branch: (branch != "HEAD" && !branch.is_empty()).then(|| branch.to_string()),
            submodules: work_dir.join(".gitmodules").exists(),
        };
        info!(path = %work_dir.display(), repository = %config.repository(), "Detected git working copy");
        return Ok(Some(config));
    }

    if work_dir.join(".svn").exists() {
        let url = command::run(
            "svn",
            &["info", "--non-interactive", "--show-item", "url", "."],
            work_dir,
            scratch,
        )
        .await?;
        let config = SourceControlConfig::subversion(url.trim());
        info!(path = %work_dir.display(), repository = %config.repository(), "Detected subversion working copy");
        return Ok(Some(config));
    }

    Ok(None)
}
