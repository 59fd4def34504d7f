//! The set of projects rooted at a builds directory.

use cinder_config::ServerConfig;
use cinder_core::runner::BuildRunner;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ProjectError, Result};
use crate::project::{self, Project};

/// All projects under one builds root, keyed by name.
///
/// Membership mirrors the subdirectories of the root as of the last
/// [`load_all`](ProjectRegistry::load_all), plus whatever was added or
/// removed through this registry since.
pub struct ProjectRegistry {
    root: PathBuf,
    runner: Arc<dyn BuildRunner>,
    projects: Vec<Project>,
}

impl ProjectRegistry {
    pub fn new(root: impl Into<PathBuf>, runner: Arc<dyn BuildRunner>) -> Self {
        Self {
            root: root.into(),
            runner,
            projects: Vec::new(),
        }
    }

    pub fn from_config(config: &ServerConfig, runner: Arc<dyn BuildRunner>) -> Self {
        Self::new(config.builds_root.clone(), runner)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the project called `name` lives, registered or not.
    pub fn project_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Reload every project from disk, replacing the current collection.
    ///
    /// Subdirectories that are not projects are skipped, as are projects that
    /// fail to load (with a warning). Every call builds new [`Project`]
    /// instances.
    pub async fn load_all(&mut self) -> Result<&[Project]> {
        std::fs::create_dir_all(&self.root).map_err(|e| ProjectError::io(&self.root, e))?;

        let entries = std::fs::read_dir(&self.root).map_err(|e| ProjectError::io(&self.root, e))?;
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ProjectError::io(&self.root, e))?;
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();

        let mut projects = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if project::validate_name(name).is_err() {
                debug!(path = %dir.display(), "Skipping directory with reserved name");
                continue;
            }
            match Project::load_or_create(&dir, self.runner.clone()).await {
                Ok(project) => projects.push(project),
                Err(ProjectError::NotAProject(path)) => {
                    debug!(path = %path.display(), "Skipping non-project directory");
                }
                Err(ProjectError::InvalidName { name, .. }) => {
                    debug!(name = %name, "Skipping directory with reserved name");
                }
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Failed to load project");
                }
            }
        }

        info!(root = %self.root.display(), projects = projects.len(), "Loaded projects");
        self.projects = projects;
        Ok(&self.projects)
    }

    /// Register a new project: create its directory, persist its settings and
    /// check out its working copy.
    ///
    /// The directory is assembled under a hidden name and renamed into place
    /// once complete, so a concurrent [`load_all`](Self::load_all) never sees
    /// a half-made project. If any step fails, nothing is left behind.
    pub async fn add(&mut self, project: Project) -> Result<&Project> {
        let name = project.name().to_string();
        let expected = self.project_dir(&name);
        if project.path() != expected {
            return Err(ProjectError::OutsideRoot {
                path: project.path().to_path_buf(),
                root: self.root.clone(),
            });
        }
        if self.find(&name).is_some() || expected.exists() {
            return Err(ProjectError::DuplicateProject(name));
        }

        std::fs::create_dir_all(&self.root).map_err(|e| ProjectError::io(&self.root, e))?;
        let staging = self.root.join(format!(".{name}.adding"));
        match std::fs::create_dir(&staging) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ProjectError::DuplicateProject(name));
            }
            Err(e) => return Err(ProjectError::io(&staging, e)),
        }

        if let Err(e) = Self::initialize(&project, &staging, &expected).await {
            warn!(project = %name, error = %e, "Project setup failed, rolling back");
            if let Err(rm) = std::fs::remove_dir_all(&staging) {
                warn!(path = %staging.display(), error = %rm, "Rollback could not remove project directory");
            }
            return Err(e);
        }

        project.record_state();
        info!(project = %name, source_control = %project.source_control().kind(), "Added project");
        self.projects.push(project);
        self.projects.sort_by(|a, b| a.name().cmp(b.name()));
        self.find(&name)
            .ok_or_else(|| cinder_core::Error::Internal(format!("project {name} vanished")).into())
    }

    async fn initialize(project: &Project, staging: &Path, target: &Path) -> Result<()> {
        cinder_config::save_project(staging, project.settings())?;
        project
            .source_control()
            .checkout(&staging.join(project::WORK_DIR))
            .await?;
        if target.exists() {
            return Err(ProjectError::DuplicateProject(project.name().to_string()));
        }
        std::fs::rename(staging, target).map_err(|e| ProjectError::io(target, e))
    }

    /// Unregister a project and delete its directory.
    pub fn remove(&mut self, name: &str) -> Result<Project> {
        let idx = self
            .projects
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| ProjectError::NotFound(name.to_string()))?;
        let project = self.projects.remove(idx);

        match std::fs::remove_dir_all(project.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ProjectError::io(project.path(), e)),
        }
        info!(project = %name, "Removed project");
        Ok(project)
    }

    pub fn list(&self) -> &[Project] {
        &self.projects
    }

    pub fn find(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name() == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Project> {
        self.projects.iter()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Request a build of a registered project.
    pub fn request_force_build(&self, name: &str) -> Result<()> {
        match self.find(name) {
            Some(project) => project.request_force_build(),
            None => Err(ProjectError::NotFound(name.to_string())),
        }
    }

    /// Request a build of the project called `name` by its directory alone,
    /// without loading it. Used by processes other than the server.
    pub fn request_force_build_on_disk(&self, name: &str) -> Result<()> {
        project::validate_name(name)?;
        let dir = self.project_dir(name);
        if !dir.join(cinder_config::PROJECT_FILE).is_file() {
            return Err(ProjectError::NotFound(name.to_string()));
        }
        project::request_force_build(&dir)
    }

    /// Hand over every registered project, leaving the registry empty.
    pub fn take_projects(&mut self) -> Vec<Project> {
        std::mem::take(&mut self.projects)
    }
}

impl<'a> IntoIterator for &'a ProjectRegistry {
    type Item = &'a Project;
    type IntoIter = std::slice::Iter<'a, Project>;

    fn into_iter(self) -> Self::IntoIter {
        self.projects.iter()
    }
}
