//! Subversion adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinder_core::{Error, Result, Revision, SourceControl, VcsKind};
use std::path::Path;
use tracing::{debug, info};

use crate::command;
use crate::scratch_dir;

/// Drives the `svn` command-line client.
#[derive(Debug, Clone)]
pub struct SubversionAdapter {
    repository: String,
}

impl SubversionAdapter {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    async fn svn(&self, work_dir: &Path, args: &[&str]) -> Result<String> {
        command::run("svn", args, work_dir, scratch_dir(work_dir)?).await
    }

    /// `svn info --show-item <item> <target>`, trimmed.
    async fn info(&self, work_dir: &Path, item: &str, target: &str) -> Result<String> {
        let out = self
            .svn(
                work_dir,
                &["info", "--non-interactive", "--show-item", item, target],
            )
            .await?;
        Ok(out.trim().to_string())
    }

    async fn last_changed(&self, work_dir: &Path, target: &str) -> Result<u64> {
        let rev = self.info(work_dir, "last-changed-revision", target).await?;
        parse_revision_number(&rev)
    }
}

fn parse_revision_number(value: &str) -> Result<u64> {
    value
        .trim()
        .trim_start_matches('r')
        .parse()
        .map_err(|_| Error::Internal(format!("unexpected svn revision: {:?}", value)))
}

#[async_trait]
impl SourceControl for SubversionAdapter {
    fn kind(&self) -> VcsKind {
        VcsKind::Subversion
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

        info!(repository = %self.repository, path = %destination.display(), "Checking out repository");

        command::run(
            "svn",
            &[
                "checkout",
                "--non-interactive",
                "--quiet",
                &self.repository,
                &name,
            ],
            parent,
            parent,
        )
        .await
        .map_err(|e| checkout_error(e.to_string()))?;

        Ok(())
    }

    async fn latest_revision(&self, work_dir: &Path, since: Option<&Revision>) -> Result<Revision> {
        let number = self.last_changed(work_dir, &self.repository).await?;
        let author = self
            .info(work_dir, "last-changed-author", &self.repository)
            .await?;
        let date = self
            .info(work_dir, "last-changed-date", &self.repository)
            .await?;
        let time = DateTime::parse_from_rfc3339(&date)
            .map_err(|e| Error::Internal(format!("bad svn date {:?}: {}", date, e)))?
            .with_timezone(&Utc);

        let first = since
            .and_then(|rev| parse_revision_number(&rev.number).ok())
            .filter(|prev| *prev < number)
            .map(|prev| prev + 1)
            .unwrap_or(number);
        let range = format!("{}:{}", first, number);
        let message = self
            .svn(
                work_dir,
                &["log", "--non-interactive", "-r", &range, &self.repository],
            )
            .await?;

        Ok(Revision::new(
            number.to_string(),
            author,
            time,
            message.trim().to_string(),
        ))
    }

    async fn up_to_date(
        &self,
        work_dir: &Path,
        since: Option<&Revision>,
        reasons: &mut Vec<Revision>,
    ) -> Result<bool> {
        let local = self.last_changed(work_dir, ".").await?;
        let remote = self.last_changed(work_dir, &self.repository).await?;
        if remote <= local {
            debug!(revision = local, "Working copy is up to date");
            return Ok(true);
        }

        info!(from = local, to = remote, "New revision detected");
        self.update(work_dir).await?;
        reasons.push(self.latest_revision(work_dir, since).await?);
        Ok(false)
    }

    async fn update(&self, work_dir: &Path) -> Result<()> {
        self.svn(work_dir, &["revert", "--recursive", "--quiet", "."])
            .await?;
        self.svn(work_dir, &["update", "--non-interactive", "--quiet"])
            .await?;
        Ok(())
    }
}
