//! Per-project polling loops.
//!
//! Every project gets its own task. A task polls source control every
//! `poll_interval` and, between polls, wakes every `request_check_interval`
//! to look for a force-build request. Projects never wait on each other; a
//! project's own poll and build always run one after the other inside its
//! task.
//!
//! A discovery task rescans the builds root every `reload_interval` and
//! starts loops for projects that appeared since. A loop stops on its own
//! once its project directory is gone.

use cinder_config::ServerConfig;
use cinder_core::ProjectState;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ProjectError, Result};
use crate::events::ProjectEvent;
use crate::project::{self, Project};
use crate::registry::ProjectRegistry;

pub struct Scheduler {
    poll_interval: Duration,
    request_check_interval: Duration,
    reload_interval: Duration,
    events: Option<mpsc::Sender<ProjectEvent>>,
}

impl Scheduler {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            request_check_interval: config.request_check_interval,
            reload_interval: config.poll_interval,
            events: None,
        }
    }

    /// Forward every project's events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<ProjectEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// How often to look for new projects under the builds root. Defaults to
    /// the poll interval.
    pub fn with_reload_interval(mut self, interval: Duration) -> Self {
        self.reload_interval = interval;
        self
    }

    /// Start one polling task per registered project, plus the task that
    /// picks up projects added later.
    pub fn spawn(self, mut registry: ProjectRegistry) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let launcher = Launcher {
            poll_interval: self.poll_interval,
            check_interval: self.request_check_interval,
            events: self.events,
            shutdown: shutdown_rx,
        };

        let mut slots = BTreeMap::new();
        for project in registry.take_projects() {
            let name = project.name().to_string();
            slots.insert(name, launcher.launch(project));
        }
        info!(projects = slots.len(), "Scheduler started");

        let projects = Arc::new(Mutex::new(slots));
        let discovery = tokio::spawn(discover_projects(
            registry,
            launcher,
            self.reload_interval,
            projects.clone(),
        ));

        SchedulerHandle {
            shutdown: shutdown_tx,
            discovery,
            projects,
        }
    }
}

/// Everything needed to start a project loop.
#[derive(Clone)]
struct Launcher {
    poll_interval: Duration,
    check_interval: Duration,
    events: Option<mpsc::Sender<ProjectEvent>>,
    shutdown: watch::Receiver<bool>,
}

impl Launcher {
    fn launch(&self, mut project: Project) -> ProjectSlot {
        if let Some(tx) = &self.events {
            project.set_event_sender(tx.clone());
        }
        let path = project.path().to_path_buf();
        let state = project.subscribe_state();
        let poll_interval = project.poll_interval(self.poll_interval);
        let task = tokio::spawn(run_project(
            project,
            poll_interval,
            self.check_interval,
            self.shutdown.clone(),
        ));
        ProjectSlot { path, state, task }
    }
}

struct ProjectSlot {
    path: PathBuf,
    state: watch::Receiver<ProjectState>,
    task: JoinHandle<()>,
}

type Slots = Arc<Mutex<BTreeMap<String, ProjectSlot>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, BTreeMap<String, ProjectSlot>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Control surface of a running [`Scheduler`].
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    discovery: JoinHandle<()>,
    projects: Slots,
}

impl SchedulerHandle {
    /// Names of the projects currently being polled.
    pub fn project_names(&self) -> Vec<String> {
        lock(&self.projects).keys().cloned().collect()
    }

    /// Current state of a scheduled project.
    pub fn state(&self, name: &str) -> Option<ProjectState> {
        lock(&self.projects)
            .get(name)
            .map(|slot| *slot.state.borrow())
    }

    /// Receive state changes of a scheduled project.
    pub fn subscribe(&self, name: &str) -> Option<watch::Receiver<ProjectState>> {
        lock(&self.projects).get(name).map(|slot| slot.state.clone())
    }

    /// Ask for a build of `name`; picked up within one request-check interval.
    pub fn request_force_build(&self, name: &str) -> Result<()> {
        let path = lock(&self.projects)
            .get(name)
            .map(|slot| slot.path.clone())
            .ok_or_else(|| ProjectError::NotFound(name.to_string()))?;
        project::request_force_build(&path)?;
        info!(project = %name, "Force build requested");
        Ok(())
    }

    /// Stop polling. Builds already running finish first.
    pub async fn shutdown(self) {
        info!("Scheduler shutting down");
        let _ = self.shutdown.send(true);
        if let Err(e) = self.discovery.await {
            error!(error = %e, "Project discovery ended abnormally");
        }

        let tasks: Vec<_> = std::mem::take(&mut *lock(&self.projects))
            .into_values()
            .map(|slot| slot.task)
            .collect();
        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Project task ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn discover_projects(
    mut registry: ProjectRegistry,
    launcher: Launcher,
    interval: Duration,
    projects: Slots,
) {
    let mut shutdown = launcher.shutdown.clone();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        if let Err(e) = registry.load_all().await {
            warn!(root = %registry.root().display(), error = %e, "Failed to rescan projects");
            continue;
        }
        let found = registry.take_projects();
        if *shutdown.borrow() {
            break;
        }
        schedule_new(&projects, &launcher, found);
    }
}

fn schedule_new(projects: &Slots, launcher: &Launcher, found: Vec<Project>) {
    let mut slots = lock(projects);
    slots.retain(|name, slot| {
        let running = !slot.task.is_finished();
        if !running {
            debug!(project = %name, "Dropping stopped project");
        }
        running
    });
    for project in found {
        if slots.contains_key(project.name()) {
            continue;
        }
        let name = project.name().to_string();
        info!(project = %name, "Scheduling new project");
        slots.insert(name, launcher.launch(project));
    }
}

async fn run_project(
    mut project: Project,
    poll_interval: Duration,
    check_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(project = %project.name(), ?poll_interval, "Project loop started");
    let mut next_poll = Instant::now();
    // After a failed poll, requests wait for the regular schedule.
    let mut backing_off = false;

    loop {
        if *shutdown.borrow() {
            break;
        }
        if !project.path().is_dir() {
            info!(project = %project.name(), "Project directory removed, no longer polling");
            break;
        }

        let requested = !backing_off && project.force_build_requested();
        if Instant::now() >= next_poll || requested {
            backing_off = match project.poll().await {
                Ok(Some(build)) => {
                    let label = build.label.clone();
                    debug!(project = %project.name(), label = %label, "Cycle produced a build");
                    false
                }
                Ok(None) => false,
                // Logged by the project; retried at the next poll.
                Err(_) => true,
            };
            next_poll = Instant::now() + poll_interval;
        }

        let wait = check_interval.min(next_poll.saturating_duration_since(Instant::now()));
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!(project = %project.name(), "Project loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockRunner, MockSourceControl, mock_project};

    fn fast_config(root: &std::path::Path) -> ServerConfig {
        ServerConfig {
            builds_root: root.to_path_buf(),
            poll_interval: Duration::from_secs(3600),
            request_check_interval: Duration::from_millis(10),
        }
    }

    async fn wait_for_idle(handle: &SchedulerHandle, name: &str, path: &std::path::Path) {
        for _ in 0..500 {
            if handle.state(name) == Some(ProjectState::Idle)
                && !path.join(project::FORCE_BUILD_FILE).exists()
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{name} never settled");
    }

    #[tokio::test]
    async fn test_concurrent_requests_never_overlap_builds() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let vcs = MockSourceControl::new();
        let runner = MockRunner::new().delay(Duration::from_millis(40));
        let mut registry = ProjectRegistry::from_config(&config, runner.shared());
        registry
            .add(mock_project(dir.path(), "demo", &vcs, &runner))
            .await
            .unwrap();

        let handle = Scheduler::new(&config).spawn(registry);
        let project_dir = dir.path().join("demo");
        let mut requesters = Vec::new();
        for _ in 0..8 {
            let project_dir = project_dir.clone();
            requesters.push(tokio::spawn(async move {
                for _ in 0..5 {
                    project::request_force_build(&project_dir).unwrap();
                    tokio::time::sleep(Duration::from_millis(15)).await;
                }
            }));
        }
        handle.request_force_build("demo").unwrap();
        join_all(requesters).await;
        wait_for_idle(&handle, "demo", &project_dir).await;
        handle.shutdown().await;

        assert_eq!(runner.max_in_flight(), 1);
        assert!(runner.runs() >= 1);
        // Requests landing during a build collapse into one follow-up build.
        assert!(runner.runs() <= 5, "runs = {}", runner.runs());
    }

    #[tokio::test]
    async fn test_projects_build_in_parallel() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let runner = MockRunner::new().delay(Duration::from_millis(200));
        let mut registry = ProjectRegistry::from_config(&config, runner.shared());

        for name in ["alpha", "beta"] {
            let vcs = MockSourceControl::new();
            vcs.push_commit("abcdef0123");
            registry
                .add(mock_project(dir.path(), name, &vcs, &runner))
                .await
                .unwrap();
        }

        let handle = Scheduler::new(&config).spawn(registry);
        assert_eq!(handle.project_names(), vec!["alpha", "beta"]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.shutdown().await;

        assert_eq!(runner.runs(), 2);
        assert_eq!(runner.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_lets_running_build_finish() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let vcs = MockSourceControl::new();
        let runner = MockRunner::new().delay(Duration::from_millis(100));
        let mut registry = ProjectRegistry::from_config(&config, runner.shared());
        registry
            .add(mock_project(dir.path(), "demo", &vcs, &runner))
            .await
            .unwrap();
        vcs.push_commit("abcdef0123");

        let (tx, mut rx) = mpsc::channel(64);
        let handle = Scheduler::new(&config).with_events(tx).spawn(registry);
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.shutdown().await;

        let history = crate::history::BuildHistory::load(&dir.path().join("demo")).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            project::read_state(&dir.path().join("demo")),
            Some(ProjectState::Idle)
        );

        let mut finished = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ProjectEvent::BuildFinished { .. }) {
                finished += 1;
            }
        }
        assert_eq!(finished, 1);
    }

    #[tokio::test]
    async fn test_unknown_project_request() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let registry = ProjectRegistry::from_config(&config, MockRunner::new().shared());

        let handle = Scheduler::new(&config).spawn(registry);
        assert!(matches!(
            handle.request_force_build("ghost"),
            Err(ProjectError::NotFound(_))
        ));
        assert_eq!(handle.state("ghost"), None);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_poll_does_not_retry_until_next_interval() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let vcs = MockSourceControl::new();
        let runner = MockRunner::new();
        let mut registry = ProjectRegistry::from_config(&config, runner.shared());
        registry
            .add(mock_project(dir.path(), "demo", &vcs, &runner))
            .await
            .unwrap();
        vcs.go_offline();
        let project_dir = dir.path().join("demo");
        project::request_force_build(&project_dir).unwrap();

        let handle = Scheduler::new(&config).spawn(registry);
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.shutdown().await;

        assert_eq!(vcs.polls(), 1);
        assert_eq!(runner.runs(), 0);
        assert!(project_dir.join(project::FORCE_BUILD_FILE).exists());
    }

    #[tokio::test]
    async fn test_removed_project_stops_polling() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let vcs = MockSourceControl::new();
        let runner = MockRunner::new();
        let mut registry = ProjectRegistry::from_config(&config, runner.shared());
        registry
            .add(mock_project(dir.path(), "demo", &vcs, &runner))
            .await
            .unwrap();

        let handle = Scheduler::new(&config)
            .with_reload_interval(Duration::from_millis(20))
            .spawn(registry);
        wait_for_idle(&handle, "demo", &dir.path().join("demo")).await;
        std::fs::remove_dir_all(dir.path().join("demo")).unwrap();

        for _ in 0..200 {
            if handle.project_names().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(handle.project_names().is_empty());
        handle.shutdown().await;
    }
}
