//! A single project: its working copy, source control, history and builder
//! state machine.
//!
//! On disk a project is a directory under the builds root:
//!
//! ```text
//! <builds-root>/<name>/
//!     project.kdl          settings (marker file)
//!     work/                working copy
//!     history.jsonl        finished builds, one per line
//!     build-<label>.log    raw output of each build
//!     builder.state        current state, for out-of-process readers
//!     build_requested      present while a force build is pending
//! ```

use cinder_config::{PROJECT_FILE, ProjectSettings};
use cinder_core::runner::{BuildRunner, BuildSpec};
use cinder_core::{
    Build, BuildLabel, BuildStatus, ProjectState, Revision, SourceControl, log_parser,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::{ProjectError, Result};
use crate::events::ProjectEvent;
use crate::history::BuildHistory;

/// Working copy directory inside a project.
pub const WORK_DIR: &str = "work";
/// Flag file whose presence requests a build on the next poll.
pub const FORCE_BUILD_FILE: &str = "build_requested";
/// File holding the current builder state.
pub const STATE_FILE: &str = "builder.state";

/// Read the builder state another process last recorded for a project.
pub fn read_state(project_dir: &Path) -> Option<ProjectState> {
    std::fs::read_to_string(project_dir.join(STATE_FILE))
        .ok()
        .and_then(|s| s.parse().ok())
}

/// Ask for a build of the project in `project_dir` on its next poll.
///
/// Creating the flag when it already exists changes nothing, so any number of
/// requests before the next poll yield one build.
pub fn request_force_build(project_dir: &Path) -> Result<()> {
    let flag = project_dir.join(FORCE_BUILD_FILE);
    std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&flag)
        .map_err(|e| ProjectError::io(&flag, e))?;
    Ok(())
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| ProjectError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name == "." || name == ".." || name.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if name.contains(['/', '\\']) || name.chars().any(char::is_control) {
        return Err(invalid("must be a single path component"));
    }
    Ok(())
}

pub struct Project {
    name: String,
    path: PathBuf,
    settings: ProjectSettings,
    source_control: Box<dyn SourceControl>,
    runner: Arc<dyn BuildRunner>,
    history: BuildHistory,
    state: ProjectState,
    current_build: Option<Build>,
    state_tx: watch::Sender<ProjectState>,
    events: Option<mpsc::Sender<ProjectEvent>>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("source_control", &self.source_control.kind())
            .field("state", &self.state)
            .field("builds", &self.history.len())
            .finish()
    }
}

impl Project {
    /// A new, not yet registered project living at `path`. The directory name
    /// is the project name.
    pub fn new(
        path: impl Into<PathBuf>,
        settings: ProjectSettings,
        runner: Arc<dyn BuildRunner>,
    ) -> Result<Self> {
        let source_control = cinder_vcs::adapter_for(&settings.source_control);
        Self::with_source_control(path, settings, source_control, runner)
    }

    /// Like [`Project::new`] with an explicit source control adapter.
    pub fn with_source_control(
        path: impl Into<PathBuf>,
        settings: ProjectSettings,
        source_control: Box<dyn SourceControl>,
        runner: Arc<dyn BuildRunner>,
    ) -> Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        validate_name(&name)?;

        let history = BuildHistory::empty(&path);
        let (state_tx, _) = watch::channel(ProjectState::Idle);

        Ok(Self {
            name,
            path,
            settings,
            source_control,
            runner,
            history,
            state: ProjectState::Idle,
            current_build: None,
            state_tx,
            events: None,
        })
    }

    /// Load the project persisted in `path`.
    ///
    /// A directory without `project.kdl` but with a recognisable working copy
    /// is adopted: its source control is detected once and written to
    /// `project.kdl` with default settings.
    pub async fn load_or_create(path: impl Into<PathBuf>, runner: Arc<dyn BuildRunner>) -> Result<Self> {
        let path = path.into();

        let settings = if path.join(PROJECT_FILE).is_file() {
            cinder_config::load_project(&path)?
        } else {
            let work = path.join(WORK_DIR);
            let detected = if work.is_dir() {
                cinder_vcs::detect(&work).await?
            } else {
                None
            };
            let Some(source_control) = detected else {
                return Err(ProjectError::NotAProject(path));
            };
            let settings = ProjectSettings::new(source_control);
            cinder_config::save_project(&path, &settings)?;
            info!(path = %path.display(), "Adopted existing working copy as a project");
            settings
        };

        let mut project = Self::new(path, settings, runner)?;
        project.history = BuildHistory::load(&project.path)?;
        debug!(project = %project.name, builds = project.history.len(), "Loaded project");
        Ok(project)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn work_dir(&self) -> PathBuf {
        self.path.join(WORK_DIR)
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    pub fn source_control(&self) -> &dyn SourceControl {
        self.source_control.as_ref()
    }

    pub fn state(&self) -> ProjectState {
        self.state
    }

    /// Receive every state change of this project.
    pub fn subscribe_state(&self) -> watch::Receiver<ProjectState> {
        self.state_tx.subscribe()
    }

    /// Send this project's events to `tx`.
    pub fn set_event_sender(&mut self, tx: mpsc::Sender<ProjectEvent>) {
        self.events = Some(tx);
    }

    /// Finished builds, oldest first.
    pub fn build_history(&self) -> &[Build] {
        self.history.builds()
    }

    /// The most recent build with a terminal status.
    pub fn last_complete_build(&self) -> Option<&Build> {
        self.history.last_complete()
    }

    /// The build in progress, if any.
    pub fn current_build(&self) -> Option<&Build> {
        self.current_build.as_ref()
    }

    /// How often this project should be polled.
    pub fn poll_interval(&self, default: Duration) -> Duration {
        self.settings.poll_interval.unwrap_or(default)
    }

    /// Request a build on the next poll even if nothing changed.
    pub fn request_force_build(&self) -> Result<()> {
        request_force_build(&self.path)?;
        info!(project = %self.name, "Force build requested");
        Ok(())
    }

    pub fn force_build_requested(&self) -> bool {
        self.path.join(FORCE_BUILD_FILE).exists()
    }

    fn clear_force_build_request(&self) {
        let flag = self.path.join(FORCE_BUILD_FILE);
        if let Err(e) = std::fs::remove_file(&flag) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(project = %self.name, error = %e, "Failed to clear build request");
            }
        }
    }

    /// Run one poll cycle: check source control and build if there is a new
    /// revision or a pending force-build request.
    ///
    /// Returns the published build, `None` when there was nothing to do. A
    /// source control failure aborts the cycle without creating a build.
    pub async fn poll(&mut self) -> Result<Option<&Build>> {
        self.transition(ProjectState::Checking).await;

        let revision = match self.check_for_changes().await {
            Ok(Some(revision)) => revision,
            Ok(None) => {
                self.transition(ProjectState::Idle).await;
                return Ok(None);
            }
            Err(e) => {
                warn!(project = %self.name, error = %e, "Poll cycle aborted");
                self.emit(ProjectEvent::PollFailed {
                    project: self.name.clone(),
                    message: e.to_string(),
                })
                .await;
                self.transition(ProjectState::Idle).await;
                return Err(e);
            }
        };

        // Requests arriving from here on are kept for the next cycle.
        self.clear_force_build_request();
        self.transition(ProjectState::Building).await;
        let build = self.build(revision).await;

        self.transition(ProjectState::Publishing).await;
        let published = self.publish(build).await;
        self.transition(ProjectState::Idle).await;
        published?;

        Ok(self.history.builds().last())
    }

    async fn check_for_changes(&mut self) -> Result<Option<Revision>> {
        let forced = self.force_build_requested();
        let work = self.work_dir();
        let since = self.last_complete_build().map(|b| b.revision.clone());

        let mut reasons = Vec::new();
        let up_to_date = self
            .source_control
            .up_to_date(&work, since.as_ref(), &mut reasons)
            .await?;

        if let Some(revision) = reasons.pop() {
            return Ok(Some(revision));
        }
        if up_to_date && !forced {
            return Ok(None);
        }

        if forced {
            info!(project = %self.name, "Building on request");
            self.source_control.update(&work).await?;
        }
        let revision = self
            .source_control
            .latest_revision(&work, since.as_ref())
            .await?;
        Ok(Some(revision))
    }

    /// Run the build command against the updated working copy. Never fails:
    /// every outcome becomes a terminal build record.
    async fn build(&mut self, revision: Revision) -> Build {
        let label = BuildLabel::next(
            revision.short_id(),
            self.history.builds().iter().map(|b| &b.label),
        );
        let mut build = Build::start(label.clone(), revision.clone());
        self.current_build = Some(build.clone());

        info!(project = %self.name, label = %label, revision = %revision.number, "Build started");
        self.emit(ProjectEvent::BuildStarted {
            project: self.name.clone(),
            label: label.clone(),
            revision: revision.clone(),
        })
        .await;

        let mut env: HashMap<String, String> = HashMap::new();
        env.insert("CI".to_string(), "true".to_string());
        env.insert("CINDER_PROJECT".to_string(), self.name.clone());
        env.insert("CINDER_BUILD_LABEL".to_string(), label.to_string());
        env.insert("CINDER_BUILD_REVISION".to_string(), revision.number.clone());
        env.extend(self.settings.env.clone());

        let spec = BuildSpec {
            command: self.settings.build_command.clone(),
            working_dir: self.work_dir(),
            log_path: self.path.join(format!("build-{}.log", label)),
            env,
        };

        match self.runner.run(&spec).await {
            Ok(outcome) => {
                let status = if outcome.succeeded() {
                    BuildStatus::Success
                } else {
                    BuildStatus::Failure
                };
                let errors = log_parser::parse(&outcome.output);
                build.finish(status, outcome.output, errors);
            }
            Err(e) => {
                error!(project = %self.name, label = %label, error = %e, "Build runner failed");
                build.finish(BuildStatus::Error, e.to_string(), Vec::new());
            }
        }

        info!(
            project = %self.name,
            label = %label,
            status = %build.status,
            errors = build.errors.len(),
            "Build finished"
        );
        build
    }

    async fn publish(&mut self, build: Build) -> Result<()> {
        let appended = self.history.append(build.clone());
        self.current_build = None;
        appended?;

        self.emit(ProjectEvent::BuildFinished {
            project: self.name.clone(),
            build: Box::new(build),
        })
        .await;
        Ok(())
    }

    async fn transition(&mut self, next: ProjectState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(project = %self.name, from = %self.state, to = %next, "State change");
        self.state = next;
        self.record_state();
        self.state_tx.send_replace(next);
        self.emit(ProjectEvent::StateChanged {
            project: self.name.clone(),
            state: next,
        })
        .await;
    }

    /// Persist the current state for out-of-process readers. Best effort.
    pub(crate) fn record_state(&self) {
        let path = self.path.join(STATE_FILE);
        if let Err(e) = std::fs::write(&path, self.state.to_string()) {
            debug!(project = %self.name, error = %e, "Could not record builder state");
        }
    }

    async fn emit(&self, event: ProjectEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}
