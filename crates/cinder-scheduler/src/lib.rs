//! Project scheduling for the Cinder build server.
//!
//! A [`Project`] polls its source control and builds new revisions, a
//! [`ProjectRegistry`] owns every project under a builds root, and the
//! [`Scheduler`] runs one polling loop per project.

pub mod error;
pub mod events;
pub mod history;
pub mod project;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use error::{ProjectError, Result};
pub use events::ProjectEvent;
pub use history::BuildHistory;
pub use project::Project;
pub use registry::ProjectRegistry;
pub use scheduler::{Scheduler, SchedulerHandle};
