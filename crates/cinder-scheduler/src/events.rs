//! Events emitted while projects are polled and built.
//!
//! Notifiers and UIs subscribe to these through the channel given to the
//! [`Scheduler`](crate::Scheduler).

use cinder_core::{Build, BuildLabel, ProjectState, Revision};

#[derive(Debug, Clone)]
pub enum ProjectEvent {
    StateChanged {
        project: String,
        state: ProjectState,
    },
    BuildStarted {
        project: String,
        label: BuildLabel,
        revision: Revision,
    },
    BuildFinished {
        project: String,
        build: Box<Build>,
    },
    /// A poll cycle was aborted before any build was created.
    PollFailed { project: String, message: String },
}

impl ProjectEvent {
    pub fn project(&self) -> &str {
        match self {
            ProjectEvent::StateChanged { project, .. }
            | ProjectEvent::BuildStarted { project, .. }
            | ProjectEvent::BuildFinished { project, .. }
            | ProjectEvent::PollFailed { project, .. } => project,
        }
    }
}
