//! Project metadata (`project.kdl`).
//!
//! The presence of this file is what makes a directory under the builds root
//! a project. Example:
//!
//! ```kdl
//! source-control "git" {
//!     url "https://example.com/widgets.git"
//!     branch "main"
//!     submodules #true
//! }
//! build-command "make test"
//! poll-interval 60
//! env {
//!     "RUST_LOG" "debug"
//! }
//! ```

use cinder_core::{SourceControlConfig, VcsKind};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use crate::nodes::{
    get_first_bool_arg, get_first_string_arg, quote, require_seconds_arg, require_string_arg,
};
use crate::{ConfigError, ConfigResult};

/// File name of the project marker inside a project directory.
pub const PROJECT_FILE: &str = "project.kdl";

/// Build command used when a project does not name one.
pub const DEFAULT_BUILD_COMMAND: &str = "make";

/// Persisted settings for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub source_control: SourceControlConfig,
    /// Shell command line that builds and tests the project.
    pub build_command: String,
    /// Overrides the server-wide poll interval.
    pub poll_interval: Option<Duration>,
    /// Extra environment for the build command.
    pub env: BTreeMap<String, String>,
}

impl ProjectSettings {
    pub fn new(source_control: SourceControlConfig) -> Self {
        Self {
            source_control,
            build_command: DEFAULT_BUILD_COMMAND.to_string(),
            poll_interval: None,
            env: BTreeMap::new(),
        }
    }

    pub fn with_build_command(mut self, command: impl Into<String>) -> Self {
        self.build_command = command.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Parse project settings from KDL text.
pub fn parse_project(kdl: &str) -> ConfigResult<ProjectSettings> {
    let doc: KdlDocument = kdl.parse()?;

    let mut source_control = None;
    let mut build_command = None;
    let mut poll_interval = None;
    let mut env = BTreeMap::new();

    for node in doc.nodes() {
        match node.name().value() {
            "source-control" => {
                if source_control.is_some() {
                    return Err(ConfigError::Duplicate("source-control".to_string()));
                }
                source_control = Some(parse_source_control(node)?);
            }
            "build-command" => {
                let command = require_string_arg(node, "build-command")?;
                if command.trim().is_empty() {
                    return Err(ConfigError::invalid("build-command", "must not be empty"));
                }
                build_command = Some(command);
            }
            "poll-interval" => {
                poll_interval = Some(require_seconds_arg(node, "poll-interval")?);
            }
            "env" => {
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        let key = child.name().value().to_string();
                        if let Some(val) = get_first_string_arg(child) {
                            env.insert(key, val);
                        }
                    }
                }
            }
            _ => {} // Ignore unknown nodes
        }
    }

    let source_control =
        source_control.ok_or_else(|| ConfigError::MissingField("source-control".to_string()))?;

    Ok(ProjectSettings {
        source_control,
        build_command: build_command.unwrap_or_else(|| DEFAULT_BUILD_COMMAND.to_string()),
        poll_interval,
        env,
    })
}

fn parse_source_control(node: &KdlNode) -> ConfigResult<SourceControlConfig> {
    let kind = require_string_arg(node, "source-control kind")?;
    let kind: VcsKind = kind
        .parse()
        .map_err(|e: String| ConfigError::invalid("source-control", e))?;

    let mut url = None;
    let mut branch = None;
    let mut submodules = false;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "url" => url = Some(require_string_arg(child, "source-control url")?),
                "branch" => branch = get_first_string_arg(child),
                "submodules" => submodules = get_first_bool_arg(child).unwrap_or(false),
                _ => {}
            }
        }
    }

    let repository = url.ok_or_else(|| ConfigError::MissingField("source-control url".to_string()))?;

    Ok(match kind {
        VcsKind::Git => SourceControlConfig::Git {
            repository,
            branch,
            submodules,
        },
        VcsKind::Subversion => SourceControlConfig::Subversion { repository },
    })
}

/// Render project settings as KDL text that [`parse_project`] accepts.
pub fn render_project(settings: &ProjectSettings) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "source-control {} {{",
        quote(&settings.source_control.kind().to_string())
    );
    let _ = writeln!(out, "    url {}", quote(settings.source_control.repository()));
    if let SourceControlConfig::Git {
        branch, submodules, ..
    } = &settings.source_control
    {
        if let Some(branch) = branch {
            let _ = writeln!(out, "    branch {}", quote(branch));
        }
        if *submodules {
            let _ = writeln!(out, "    submodules #true");
        }
    }
    let _ = writeln!(out, "}}");

    let _ = writeln!(out, "build-command {}", quote(&settings.build_command));
    if let Some(interval) = settings.poll_interval {
        let _ = writeln!(out, "poll-interval {}", interval.as_secs().max(1));
    }

    if !settings.env.is_empty() {
        let _ = writeln!(out, "env {{");
        for (key, value) in &settings.env {
            let _ = writeln!(out, "    {} {}", quote(key), quote(value));
        }
        let _ = writeln!(out, "}}");
    }

    out
}

/// Read `project.kdl` from a project directory.
pub fn load_project(project_dir: &Path) -> ConfigResult<ProjectSettings> {
    let path = project_dir.join(PROJECT_FILE);
    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::io(&path, e))?;
    parse_project(&content)
}

/// Write `project.kdl` into a project directory, replacing it atomically.
pub fn save_project(project_dir: &Path, settings: &ProjectSettings) -> ConfigResult<()> {
    let path = project_dir.join(PROJECT_FILE);
    let tmp = path.with_extension("kdl.tmp");
    let rendered = render_project(settings);
    // Never replace a good file with one that cannot be loaded back.
    parse_project(&rendered)?;
    std::fs::write(&tmp, rendered).map_err(|e| ConfigError::io(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| ConfigError::io(&path, e))?;
    Ok(())
}
