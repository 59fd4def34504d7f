//! Local process runner.

use async_trait::async_trait;
use cinder_core::runner::{BuildOutcome, BuildRunner, BuildSpec};
use cinder_core::{Error, Result};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Runs build commands through `sh -c` on the local machine.
///
/// Stdout and stderr share one log file, so the captured output keeps the
/// interleaving the command produced.
#[derive(Debug, Clone)]
pub struct LocalProcessRunner {
    shell: String,
}

impl LocalProcessRunner {
    pub fn new() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
        }
    }

    /// Use a different shell (it must accept `-c <command>`).
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for LocalProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuildRunner for LocalProcessRunner {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn run(&self, spec: &BuildSpec) -> Result<BuildOutcome> {
        if !spec.working_dir.is_dir() {
            return Err(Error::BuildRunner(format!(
                "working copy {} does not exist",
                spec.working_dir.display()
            )));
        }

        if let Some(parent) = spec.log_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let log = std::fs::File::create(&spec.log_path)
            .map_err(|e| Error::io(&spec.log_path, e))?;
        let log_err = log.try_clone().map_err(|e| Error::io(&spec.log_path, e))?;

        info!(command = %spec.command, cwd = %spec.working_dir.display(), "Starting build command");

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&spec.command)
            .current_dir(&spec.working_dir)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| Error::BuildRunner(format!("{}: {}", self.shell, e)))?;

        let status = child
            .wait()
            .await
            .map_err(|e| Error::BuildRunner(format!("failed to wait for build: {}", e)))?;

        let output = std::fs::read(&spec.log_path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|e| Error::io(&spec.log_path, e))?;

        debug!(exit_code = ?status.code(), bytes = output.len(), "Build command finished");

        Ok(BuildOutcome {
            exit_code: status.code(),
            output,
        })
    }
}
