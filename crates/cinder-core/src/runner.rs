//! Build runner trait and job types.
//!
//! A runner executes a project's build command against an already updated
//! working copy and reports what happened.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::Result;

/// Specification for one build command invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Shell command line to run.
    pub command: String,
    /// Directory to run it in (the project's working copy).
    pub working_dir: PathBuf,
    /// File that receives combined stdout and stderr.
    pub log_path: PathBuf,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
}

/// What a build command did once it ran to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutcome {
    /// Exit code, `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
}

impl BuildOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for build runners.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Name of this runner.
    fn name(&self) -> &'static str;

    /// Run the build to completion.
    ///
    /// A command that runs and exits non-zero is an `Ok` outcome. An `Err`
    /// ([`Error::BuildRunner`](crate::Error::BuildRunner)) means the command
    /// could not be started at all.
    async fn run(&self, spec: &BuildSpec) -> Result<BuildOutcome>;
}
