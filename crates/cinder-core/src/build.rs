//! Build records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::label::BuildLabel;
use crate::revision::Revision;

/// Status of a build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    /// The build command is executing.
    Running,
    /// The build command exited zero.
    Success,
    /// The build command ran and exited non-zero.
    Failure,
    /// The build command could not be run at all.
    Error,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BuildStatus::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Running => write!(f, "running"),
            BuildStatus::Success => write!(f, "success"),
            BuildStatus::Failure => write!(f, "failure"),
            BuildStatus::Error => write!(f, "error"),
        }
    }
}

/// Whether a parsed entry was an unexpected error or an assertion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestErrorKind {
    Error,
    Failure,
}

impl std::fmt::Display for TestErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestErrorKind::Error => write!(f, "Error"),
            TestErrorKind::Failure => write!(f, "Failure"),
        }
    }
}

/// One failed test extracted from build output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestErrorEntry {
    pub kind: TestErrorKind,
    /// Test name or file/line locator.
    pub test_name: String,
    pub message: String,
    /// Stack trace or other free-form detail.
    pub stacktrace: String,
}

/// One attempt to build a project at a specific revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub label: BuildLabel,
    pub revision: Revision,
    pub status: BuildStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Combined stdout and stderr of the build command.
    pub output: String,
    pub errors: Vec<TestErrorEntry>,
}

impl Build {
    /// Start a new build record in the `Running` state.
    pub fn start(label: BuildLabel, revision: Revision) -> Self {
        Self {
            label,
            revision,
            status: BuildStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            output: String::new(),
            errors: Vec::new(),
        }
    }

    /// Move a running build into its terminal state. A build finishes exactly
    /// once; finishing an already terminal build is a no-op.
    pub fn finish(&mut self, status: BuildStatus, output: String, errors: Vec<TestErrorEntry>) {
        if self.status.is_terminal() || !status.is_terminal() {
            return;
        }
        self.status = status;
        self.output = output;
        self.errors = errors;
        self.end_time = Some(Utc::now());
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock duration, once finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}
