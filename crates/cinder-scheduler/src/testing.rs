//! In-memory source control and build runner for unit tests.

use async_trait::async_trait;
use chrono::Utc;
use cinder_config::ProjectSettings;
use cinder_core::runner::{BuildOutcome, BuildRunner, BuildSpec};
use cinder_core::{Error, Result, Revision, SourceControl, SourceControlConfig, VcsKind};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::project::Project;

pub fn settings() -> ProjectSettings {
    ProjectSettings::new(SourceControlConfig::git("https://example.com/demo.git"))
}

/// Create `<root>/<name>` with a working copy directory and a project wired to
/// the mocks.
pub async fn init_project(
    root: &Path,
    name: &str,
    vcs: &MockSourceControl,
    runner: &MockRunner,
) -> Project {
    let path = root.join(name);
    std::fs::create_dir_all(path.join(crate::project::WORK_DIR)).unwrap();
    mock_project(root, name, vcs, runner)
}

/// A project at `<root>/<name>` wired to the mocks, nothing created on disk.
pub fn mock_project(
    root: &Path,
    name: &str,
    vcs: &MockSourceControl,
    runner: &MockRunner,
) -> Project {
    Project::with_source_control(
        root.join(name),
        settings(),
        Box::new(vcs.clone()),
        runner.shared(),
    )
    .unwrap()
}

#[derive(Default)]
struct VcsState {
    head: Option<Revision>,
    pending: VecDeque<Revision>,
    fail_next: bool,
    unreachable: bool,
    polls: usize,
}

/// Source control whose remote is a queue of commits pushed by the test.
#[derive(Clone, Default)]
pub struct MockSourceControl {
    state: Arc<Mutex<VcsState>>,
}

impl MockSourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_commit(&self, number: &str) {
        let revision = Revision::new(number, "dev", Utc::now(), format!("commit {number}"));
        self.state.lock().unwrap().pending.push_back(revision);
    }

    pub fn fail_next_poll(&self) {
        self.state.lock().unwrap().fail_next = true;
    }

    /// Fail every poll from now on.
    pub fn go_offline(&self) {
        self.state.lock().unwrap().unreachable = true;
    }

    /// Number of change checks made so far.
    pub fn polls(&self) -> usize {
        self.state.lock().unwrap().polls
    }

    fn check_failure(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next) || state.unreachable {
            return Err(Error::VcsCommand {
                command: "git fetch".to_string(),
                diagnostic: "fatal: unable to access remote".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SourceControl for MockSourceControl {
    fn kind(&self) -> VcsKind {
        VcsKind::Git
    }

    async fn checkout(&self, destination: &Path) -> Result<()> {
        std::fs::create_dir_all(destination).map_err(|e| Error::io(destination, e))
    }

    async fn latest_revision(&self, _work_dir: &Path, _since: Option<&Revision>) -> Result<Revision> {
        self.check_failure()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .pending
            .back()
            .or(state.head.as_ref())
            .cloned()
            .unwrap_or_else(|| Revision::new("0000000000", "dev", Utc::now(), "initial")))
    }

    async fn up_to_date(
        &self,
        _work_dir: &Path,
        _since: Option<&Revision>,
        reasons: &mut Vec<Revision>,
    ) -> Result<bool> {
        self.state.lock().unwrap().polls += 1;
        self.check_failure()?;
        let mut state = self.state.lock().unwrap();
        if state.pending.is_empty() {
            return Ok(true);
        }
        let new: Vec<Revision> = state.pending.drain(..).collect();
        state.head = new.last().cloned();
        reasons.extend(new);
        Ok(false)
    }

    async fn update(&self, _work_dir: &Path) -> Result<()> {
        self.check_failure()
    }
}

#[derive(Default)]
struct RunnerState {
    runs: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    last_spec: Mutex<Option<BuildSpec>>,
}

/// Build runner that records its invocations instead of running anything.
#[derive(Clone, Default)]
pub struct MockRunner {
    state: Arc<RunnerState>,
    exit_code: i32,
    output: String,
    delay: Option<Duration>,
    fail_to_start: bool,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn output(mut self, output: &str) -> Self {
        self.output = output.to_string();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_to_start(mut self) -> Self {
        self.fail_to_start = true;
        self
    }

    pub fn shared(&self) -> Arc<dyn BuildRunner> {
        Arc::new(self.clone())
    }

    pub fn runs(&self) -> usize {
        self.state.runs.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_spec(&self) -> Option<BuildSpec> {
        self.state.last_spec.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildRunner for MockRunner {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, spec: &BuildSpec) -> Result<BuildOutcome> {
        *self.state.last_spec.lock().unwrap() = Some(spec.clone());
        if self.fail_to_start {
            return Err(Error::BuildRunner("sh: not found".to_string()));
        }

        self.state.runs.fetch_add(1, Ordering::SeqCst);
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        std::fs::write(&spec.log_path, &self.output).map_err(|e| Error::io(&spec.log_path, e))?;

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(BuildOutcome {
            exit_code: Some(self.exit_code),
            output: self.output.clone(),
        })
    }
}
