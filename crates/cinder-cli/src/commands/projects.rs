//! Project management commands.
//!
//! These run outside the server process and talk to it only through the
//! builds directory.

use anyhow::{Context, Result};
use cinder_config::{ProjectSettings, ServerConfig};
use cinder_core::{BuildStatus, SourceControlConfig, VcsKind};
use cinder_executor::LocalProcessRunner;
use cinder_scheduler::project::read_state;
use cinder_scheduler::{Project, ProjectRegistry};
use std::sync::Arc;

fn registry(config: &ServerConfig) -> ProjectRegistry {
    ProjectRegistry::from_config(config, Arc::new(LocalProcessRunner::new()))
}

fn status_marker(status: BuildStatus) -> &'static str {
    match status {
        BuildStatus::Success => "✓",
        BuildStatus::Failure => "✗",
        BuildStatus::Error => "!",
        BuildStatus::Running => "▶",
    }
}

pub async fn add(
    config: &ServerConfig,
    name: &str,
    url: &str,
    vcs: &str,
    branch: Option<String>,
    command: Option<String>,
) -> Result<()> {
    let kind: VcsKind = vcs.parse().map_err(anyhow::Error::msg)?;
    let source_control = match kind {
        VcsKind::Git => SourceControlConfig::Git {
            repository: url.to_string(),
            branch,
            submodules: false,
        },
        VcsKind::Subversion => {
            if branch.is_some() {
                anyhow::bail!("--branch is only supported for git");
            }
            SourceControlConfig::subversion(url)
        }
    };

    let mut settings = ProjectSettings::new(source_control);
    if let Some(command) = command {
        settings = settings.with_build_command(command);
    }

    let mut registry = registry(config);
    let dir = registry.project_dir(name);
    let project = Project::new(&dir, settings, Arc::new(LocalProcessRunner::new()))?;
    println!("Checking out {} into {}", url, dir.display());

    let project = registry
        .add(project)
        .await
        .with_context(|| format!("Failed to add project {}", name))?;
    println!("✓ Added project '{}'", project.name());
    Ok(())
}

pub async fn remove(config: &ServerConfig, name: &str) -> Result<()> {
    let mut registry = registry(config);
    registry.load_all().await?;
    registry
        .remove(name)
        .with_context(|| format!("Failed to remove project {}", name))?;
    println!("Removed project '{}'", name);
    Ok(())
}

pub async fn list(config: &ServerConfig) -> Result<()> {
    let mut registry = registry(config);
    let projects = registry.load_all().await?;

    if projects.is_empty() {
        println!("No projects in {}", config.builds_root.display());
        return Ok(());
    }

    for project in projects {
        let state = read_state(project.path()).unwrap_or_default();
        let last = match project.last_complete_build() {
            Some(build) => format!(
                "{} {} ({})",
                status_marker(build.status),
                build.label,
                build.status
            ),
            None => "never built".to_string(),
        };
        println!("{:<24} {:<11} {}", project.name(), state.to_string(), last);
    }
    Ok(())
}

pub async fn show(config: &ServerConfig, name: &str, limit: usize, json: bool) -> Result<()> {
    let mut registry = registry(config);
    registry.load_all().await?;
    let project = registry
        .find(name)
        .with_context(|| format!("No project named {}", name))?;

    let history = project.build_history();
    let recent = &history[history.len().saturating_sub(limit)..];

    if json {
        println!("{}", serde_json::to_string_pretty(recent)?);
        return Ok(());
    }

    let settings = project.settings();
    println!("Project: {}", project.name());
    println!(
        "  Source:  {} {}",
        settings.source_control.kind(),
        settings.source_control.repository()
    );
    println!("  Command: {}", settings.build_command);
    println!("  State:   {}", read_state(project.path()).unwrap_or_default());
    if project.force_build_requested() {
        println!("  Build requested");
    }

    if recent.is_empty() {
        println!("\nNo builds yet");
        return Ok(());
    }

    println!("\nBuilds:");
    for build in recent.iter().rev() {
        let elapsed = build
            .elapsed()
            .map(|d| format!("{}s", d.num_seconds()))
            .unwrap_or_default();
        println!(
            "  {} {:<12} {:<8} {} by {} {}",
            status_marker(build.status),
            build.label.to_string(),
            build.status.to_string(),
            build.start_time.format("%Y-%m-%d %H:%M:%S"),
            build.revision.committed_by,
            elapsed
        );
        for error in &build.errors {
            println!("      {}: {} ({})", error.kind, error.test_name, error.message);
        }
    }
    Ok(())
}

pub fn build(config: &ServerConfig, name: &str) -> Result<()> {
    registry(config)
        .request_force_build_on_disk(name)
        .with_context(|| format!("Failed to request a build of {}", name))?;
    println!("Build requested for '{}'", name);
    Ok(())
}
