//! Git adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinder_core::{Error, Result, Revision, SourceControl, VcsKind};
use std::path::Path;
use tracing::{debug, info};

use crate::command;
use crate::scratch_dir;

// Unit separator between fields of `git log --format` output.
const FIELD_SEP: char = '\u{1f}';
const REVISION_FORMAT: &str = "--format=%H%x1f%an%x1f%aI";

/// Drives the `git` command-line client.
#[derive(Debug, Clone)]
pub struct GitAdapter {
    repository: String,
    branch: Option<String>,
    submodules: bool,
}

impl GitAdapter {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: None,
            submodules: false,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_submodules(mut self, submodules: bool) -> Self {
        self.submodules = submodules;
        self
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Remote-tracking ref that builds follow.
    fn tracking_ref(&self) -> String {
        match &self.branch {
            Some(branch) => format!("origin/{}", branch),
            None => "origin/HEAD".to_string(),
        }
    }

    async fn git(&self, work_dir: &Path, args: &[&str]) -> Result<String> {
        command::run("git", args, work_dir, scratch_dir(work_dir)?).await
    }

    async fn fetch(&self, work_dir: &Path) -> Result<()> {
        self.git(work_dir, &["fetch", "--quiet", "origin"]).await?;
        Ok(())
    }

    async fn rev_parse(&self, work_dir: &Path, rev: &str) -> Result<String> {
        let out = self
            .git(work_dir, &["rev-parse", "--verify", "--quiet", rev])
            .await?;
        Ok(out.trim().to_string())
    }

    async fn reset_to(&self, work_dir: &Path, rev: &str) -> Result<()> {
        self.git(work_dir, &["reset", "--hard", "--quiet", rev]).await?;
        if self.submodules {
            self.git(
                work_dir,
                &["submodule", "update", "--init", "--recursive", "--quiet"],
            )
            .await?;
        }
        Ok(())
    }

    /// Describe `target`, with the changelog since `since` as its message.
    async fn describe(
        &self,
        work_dir: &Path,
        target: &str,
        since: Option<&Revision>,
    ) -> Result<Revision> {
        let line = self
            .git(work_dir, &["log", "-1", REVISION_FORMAT, target])
            .await?;
        let (number, committed_by, time) = parse_revision_line(&line)?;

        let changelog = match since {
            Some(since) if since.number != number => {
                let range = format!("{}..{}", since.number, number);
                // The old revision may be gone after a force push.
                self.git(work_dir, &["log", "--format=%h %s (%an)", &range])
                    .await
                    .ok()
                    .filter(|log| !log.trim().is_empty())
            }
            _ => None,
        };

        let message = match changelog {
            Some(log) => log.trim_end().to_string(),
            None => self
                .git(work_dir, &["log", "-1", "--format=%B", target])
                .await?
                .trim_end()
                .to_string(),
        };

        Ok(Revision::new(number, committed_by, time, message))
    }
}

fn parse_revision_line(line: &str) -> Result<(String, String, DateTime<Utc>)> {
    let parts: Vec<&str> = line.trim().split(FIELD_SEP).collect();
    if parts.len() < 3 || parts[0].is_empty() {
        return Err(Error::Internal(format!(
            "unexpected git log output: {:?}",
            line
        )));
    }
    let time = DateTime::parse_from_rfc3339(parts[2])
        .map_err(|e| Error::Internal(format!("bad commit date {:?}: {}", parts[2], e)))?
        .with_timezone(&Utc);
    Ok((parts[0].to_string(), parts[1].to_string(), time))
}

#[async_trait]
impl SourceControl for GitAdapter {
    fn kind(&self) -> VcsKind {
        VcsKind::Git
    }

    async fn checkout(&self, destination: &Path) -> Result<()> {
        let checkout_error = |message: String| Error::Checkout {
            path: destination.to_path_buf(),
            message,
        };

        let (Some(parent), Some(name)) = (destination.parent(), destination.file_name()) else {
            return Err(checkout_error("destination has no parent directory".to_string()));
        };
        let name = name.to_string_lossy();

        let mut args = vec!["clone", "--quiet"];
        if let Some(branch) = &self.branch {
            args.extend(["--branch", branch.as_str()]);
        }
        if self.submodules {
            args.push("--recurse-submodules");
        }
        args.extend([self.repository.as_str(), &*name]);

        info!(repository = %self.repository, path = %destination.display(), "Cloning repository");

        command::run("git", &args, parent, parent)
            .await
            .map_err(|e| checkout_error(e.to_string()))?;

        info!(path = %destination.display(), "Repository cloned successfully");
        Ok(())
    }

    async fn latest_revision(&self, work_dir: &Path, since: Option<&Revision>) -> Result<Revision> {
        self.fetch(work_dir).await?;
        self.describe(work_dir, &self.tracking_ref(), since).await
    }

    async fn up_to_date(
        &self,
        work_dir: &Path,
        since: Option<&Revision>,
        reasons: &mut Vec<Revision>,
    ) -> Result<bool> {
        self.fetch(work_dir).await?;

        let tracking = self.tracking_ref();
        let local = self.rev_parse(work_dir, "HEAD").await?;
        let remote = self.rev_parse(work_dir, &tracking).await?;
        if local == remote {
            debug!(head = %local, "Working copy is up to date");
            return Ok(true);
        }

        info!(from = %local, to = %remote, "New revision detected");
        self.reset_to(work_dir, &remote).await?;
        reasons.push(self.describe(work_dir, &remote, since).await?);
        Ok(false)
    }

    async fn update(&self, work_dir: &Path) -> Result<()> {
        self.fetch(work_dir).await?;
        self.reset_to(work_dir, &self.tracking_ref()).await
    }
}
