//! Long-running build server.

use anyhow::{Context, Result};
use cinder_config::ServerConfig;
use cinder_executor::LocalProcessRunner;
use cinder_scheduler::{ProjectEvent, ProjectRegistry, Scheduler};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(config: ServerConfig) -> Result<()> {
    let mut registry = ProjectRegistry::from_config(&config, Arc::new(LocalProcessRunner::new()));
    registry
        .load_all()
        .await
        .with_context(|| format!("Failed to load projects from {}", config.builds_root.display()))?;

    if registry.is_empty() {
        warn!(root = %config.builds_root.display(), "No projects yet, watching for new ones");
    }

    let (tx, mut rx) = mpsc::channel(100);
    let handle = Scheduler::new(&config).with_events(tx).spawn(registry);

    // Notifiers hook in here.
    let notifier = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ProjectEvent::BuildFinished { project, build } => {
                    info!(
                        project = %project,
                        label = %build.label,
                        status = %build.status,
                        errors = build.errors.len(),
                        "Build published"
                    );
                }
                ProjectEvent::PollFailed { project, message } => {
                    warn!(project = %project, error = %message, "Source control check failed");
                }
                ProjectEvent::BuildStarted { .. } | ProjectEvent::StateChanged { .. } => {}
            }
        }
    });

    info!(
        root = %config.builds_root.display(),
        poll_interval = ?config.poll_interval,
        "Cinder server running, press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    handle.shutdown().await;
    notifier.await.context("Event task failed")?;
    Ok(())
}
